//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Domain Monitor
//! database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Every URL string ever seen, canonical where possible
CREATE TABLE IF NOT EXISTS urls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE
);

-- Registrable second-level domains; last_contacted drives the cooldown
CREATE TABLE IF NOT EXISTS domains (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain_name TEXT NOT NULL UNIQUE,
    last_contacted TEXT
);

CREATE INDEX IF NOT EXISTS idx_domains_last_contacted ON domains(last_contacted);

-- URLs the scheduler may pick
CREATE TABLE IF NOT EXISTS crawlable_urls (
    url_id INTEGER PRIMARY KEY REFERENCES urls(id),
    domain_id INTEGER NOT NULL REFERENCES domains(id)
);

CREATE INDEX IF NOT EXISTS idx_crawlable_urls_domain ON crawlable_urls(domain_id);

-- URLs permanently excluded from crawling
CREATE TABLE IF NOT EXISTS disaster_urls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url_id INTEGER NOT NULL UNIQUE REFERENCES urls(id),
    reason TEXT NOT NULL
);

-- One row per crawl attempt, written before any network I/O
CREATE TABLE IF NOT EXISTS results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url_id INTEGER NOT NULL REFERENCES urls(id),
    crawl_begin TEXT NOT NULL,
    crawl_end TEXT
);

CREATE INDEX IF NOT EXISTS idx_results_url ON results(url_id, crawl_begin);
CREATE INDEX IF NOT EXISTS idx_results_crawl_end ON results(crawl_end);

-- A response was received (of any status)
CREATE TABLE IF NOT EXISTS result_successes (
    result_id INTEGER PRIMARY KEY REFERENCES results(id) ON DELETE CASCADE,
    status_code INTEGER NOT NULL,
    headers BLOB NOT NULL,
    headers_orig_size INTEGER NOT NULL,
    content BLOB,
    content_orig_size INTEGER NOT NULL,
    next_url_id INTEGER REFERENCES urls(id) ON DELETE SET NULL,
    next_request_id INTEGER REFERENCES results(id) ON DELETE SET NULL
);

-- The transfer failed, or the attempt ended without an outcome
CREATE TABLE IF NOT EXISTS result_errors (
    result_id INTEGER PRIMARY KEY REFERENCES results(id) ON DELETE CASCADE,
    is_internal_error INTEGER NOT NULL,
    description_json TEXT NOT NULL
);

-- A result carries a success or an error, never both
CREATE TRIGGER IF NOT EXISTS result_successes_exclusive
BEFORE INSERT ON result_successes
WHEN EXISTS (SELECT 1 FROM result_errors WHERE result_id = NEW.result_id)
BEGIN
    SELECT RAISE(ABORT, 'result already has an error outcome');
END;

CREATE TRIGGER IF NOT EXISTS result_errors_exclusive
BEFORE INSERT ON result_errors
WHEN EXISTS (SELECT 1 FROM result_successes WHERE result_id = NEW.result_id)
BEGIN
    SELECT RAISE(ABORT, 'result already has a success outcome');
END;
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::{params, Connection};

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        initialize_schema(&conn).unwrap();
        conn.execute("INSERT INTO urls (url) VALUES ('https://foo.com/')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO results (url_id, crawl_begin) VALUES (1, '2024-01-01T00:00:00.000000Z')",
            [],
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = setup();
        let tables = [
            "urls",
            "domains",
            "crawlable_urls",
            "disaster_urls",
            "results",
            "result_successes",
            "result_errors",
        ];

        for table in tables {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    params![table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_error_after_success_is_rejected() {
        let conn = setup();
        conn.execute(
            "INSERT INTO result_successes (result_id, status_code, headers, headers_orig_size, content_orig_size)
             VALUES (1, 200, x'3b', 0, 0)",
            [],
        )
        .unwrap();

        let err = conn
            .execute(
                "INSERT INTO result_errors (result_id, is_internal_error, description_json) VALUES (1, 0, '{}')",
                [],
            )
            .unwrap_err();
        assert!(err.to_string().contains("already has a success outcome"));
    }

    #[test]
    fn test_success_after_error_is_rejected() {
        let conn = setup();
        conn.execute(
            "INSERT INTO result_errors (result_id, is_internal_error, description_json) VALUES (1, 1, '{}')",
            [],
        )
        .unwrap();

        let err = conn
            .execute(
                "INSERT INTO result_successes (result_id, status_code, headers, headers_orig_size, content_orig_size)
                 VALUES (1, 200, x'3b', 0, 0)",
                [],
            )
            .unwrap_err();
        assert!(err.to_string().contains("already has an error outcome"));
    }

    #[test]
    fn test_crawlable_url_is_unique_per_url() {
        let conn = setup();
        conn.execute("INSERT INTO domains (domain_name) VALUES ('foo.com')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO crawlable_urls (url_id, domain_id) VALUES (1, 1)",
            [],
        )
        .unwrap();
        assert!(conn
            .execute(
                "INSERT INTO crawlable_urls (url_id, domain_id) VALUES (1, 1)",
                [],
            )
            .is_err());
    }
}
