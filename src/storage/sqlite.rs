//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.
//! `BEGIN IMMEDIATE` takes the database-wide write lock up front, which is
//! what makes the reservation read-check-bump sequence exclusive across
//! worker processes.

use crate::state::{crawl_cutoff, DomainState};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    format_timestamp, parse_timestamp, CrawlTarget, DomainRecord, DomainReservation, ErrorRecord, NewSuccess,
    ResultHandle, ResultRecord, SuccessRecord,
};
use crate::MonitorError;
use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

/// How long a writer waits for another worker's lock before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const DOMAIN_COLUMNS: &str = "id, domain_name, last_contacted";
const TARGET_COLUMNS: &str = "c.url_id, u.url, d.id, d.domain_name";
const RESULT_COLUMNS: &str = "id, url_id, crawl_begin, crawl_end";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(MonitorError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, MonitorError> {
        let conn = Connection::open(path)?;

        // Every commit must survive a crash: a bumped domain stays bumped
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA foreign_keys = ON;
        ",
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database, for tests and dry runs
    pub fn new_in_memory() -> Result<Self, MonitorError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// Reads an RFC 3339 text column
fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_timestamp(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => timestamp_at(row, idx).map(Some),
        None => Ok(None),
    }
}

fn domain_from_row(row: &Row<'_>) -> rusqlite::Result<DomainRecord> {
    Ok(DomainRecord {
        id: row.get(0)?,
        domain_name: row.get(1)?,
        last_contacted: optional_timestamp_at(row, 2)?,
    })
}

fn target_from_row(row: &Row<'_>) -> rusqlite::Result<CrawlTarget> {
    Ok(CrawlTarget {
        url_id: row.get(0)?,
        url: row.get(1)?,
        domain_id: row.get(2)?,
        domain_name: row.get(3)?,
    })
}

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<ResultRecord> {
    Ok(ResultRecord {
        id: row.get(0)?,
        url_id: row.get(1)?,
        crawl_begin: timestamp_at(row, 2)?,
        crawl_end: optional_timestamp_at(row, 3)?,
    })
}

/// Stored timestamps carry microseconds; truncate so that what we return
/// equals what a later read returns
fn stored_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Re-checks a locked domain and bumps it if it is eligible
///
/// Must run inside a transaction that already holds the write lock.
fn bump_locked_domain(
    conn: &Connection,
    domain: DomainRecord,
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
) -> StorageResult<DomainReservation> {
    if !DomainState::classify(domain.last_contacted, cutoff).is_eligible() {
        return Ok(DomainReservation::TooSoon(domain));
    }

    conn.execute(
        "UPDATE domains SET last_contacted = ?1 WHERE id = ?2",
        params![format_timestamp(now), domain.id],
    )?;

    Ok(DomainReservation::Bumped(DomainRecord {
        last_contacted: Some(now),
        ..domain
    }))
}

impl SqliteStorage {
    /// Closes an open result, failing if it is unknown or already closed
    fn close_result(conn: &Connection, handle: &ResultHandle) -> StorageResult<()> {
        let changed = conn.execute(
            "UPDATE results SET crawl_end = ?1 WHERE id = ?2 AND crawl_end IS NULL",
            params![format_timestamp(stored_now()), handle.id],
        )?;
        if changed == 1 {
            return Ok(());
        }

        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM results WHERE id = ?1",
                params![handle.id],
                |row| row.get(0),
            )
            .optional()?;
        match exists {
            Some(_) => Err(StorageError::AlreadyFinalized(handle.id)),
            None => Err(StorageError::NotFound(format!("Result ID {}", handle.id))),
        }
    }
}

impl Storage for SqliteStorage {
    // ===== Discovery =====

    fn upsert_url(&mut self, url: &str) -> StorageResult<i64> {
        self.conn
            .execute("INSERT OR IGNORE INTO urls (url) VALUES (?1)", params![url])?;
        let id = self
            .conn
            .query_row("SELECT id FROM urls WHERE url = ?1", params![url], |row| {
                row.get(0)
            })?;
        Ok(id)
    }

    fn upsert_domain(&mut self, domain_name: &str) -> StorageResult<DomainRecord> {
        self.conn.execute(
            "INSERT OR IGNORE INTO domains (domain_name) VALUES (?1)",
            params![domain_name],
        )?;
        self.get_domain(domain_name)?
            .ok_or_else(|| StorageError::NotFound(format!("Domain {}", domain_name)))
    }

    fn mark_crawlable(&mut self, url_id: i64, domain_id: i64) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO crawlable_urls (url_id, domain_id) VALUES (?1, ?2)",
            params![url_id, domain_id],
        )?;
        Ok(())
    }

    fn record_disaster(&mut self, url_id: i64, reason: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO disaster_urls (url_id, reason) VALUES (?1, ?2)
             ON CONFLICT(url_id) DO UPDATE SET reason = excluded.reason",
            params![url_id, reason],
        )?;
        Ok(())
    }

    // ===== Lookups =====

    fn get_url_id(&self, url: &str) -> StorageResult<Option<i64>> {
        let id = self
            .conn
            .query_row("SELECT id FROM urls WHERE url = ?1", params![url], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(id)
    }

    fn get_domain(&self, domain_name: &str) -> StorageResult<Option<DomainRecord>> {
        let domain = self
            .conn
            .query_row(
                &format!("SELECT {} FROM domains WHERE domain_name = ?1", DOMAIN_COLUMNS),
                params![domain_name],
                domain_from_row,
            )
            .optional()?;
        Ok(domain)
    }

    fn get_domain_by_id(&self, domain_id: i64) -> StorageResult<Option<DomainRecord>> {
        let domain = self
            .conn
            .query_row(
                &format!("SELECT {} FROM domains WHERE id = ?1", DOMAIN_COLUMNS),
                params![domain_id],
                domain_from_row,
            )
            .optional()?;
        Ok(domain)
    }

    fn get_crawl_target(&self, url: &str) -> StorageResult<Option<CrawlTarget>> {
        let target = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM crawlable_urls c
                     JOIN urls u ON u.id = c.url_id
                     JOIN domains d ON d.id = c.domain_id
                     WHERE u.url = ?1",
                    TARGET_COLUMNS
                ),
                params![url],
                target_from_row,
            )
            .optional()?;
        Ok(target)
    }

    fn get_disaster_reason(&self, url_id: i64) -> StorageResult<Option<String>> {
        let reason = self
            .conn
            .query_row(
                "SELECT reason FROM disaster_urls WHERE url_id = ?1",
                params![url_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(reason)
    }

    // ===== Reservation =====

    fn reserve_next_domain_target(
        &mut self,
        cooldown: chrono::Duration,
    ) -> StorageResult<DomainReservation> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = stored_now();

        let candidate = tx
            .query_row(
                &format!(
                    "SELECT {} FROM domains d
                     WHERE EXISTS (SELECT 1 FROM crawlable_urls c WHERE c.domain_id = d.id)
                     ORDER BY d.last_contacted ASC NULLS FIRST, d.id ASC
                     LIMIT 1",
                    DOMAIN_COLUMNS
                ),
                [],
                domain_from_row,
            )
            .optional()?;

        let Some(domain) = candidate else {
            return Ok(DomainReservation::Empty);
        };

        let reservation = bump_locked_domain(&tx, domain, crawl_cutoff(now, cooldown), now)?;
        tx.commit()?;
        Ok(reservation)
    }

    fn lock_then_bump_domain(
        &mut self,
        domain_id: i64,
        cooldown: chrono::Duration,
    ) -> StorageResult<DomainReservation> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = stored_now();

        let domain = tx
            .query_row(
                &format!("SELECT {} FROM domains WHERE id = ?1", DOMAIN_COLUMNS),
                params![domain_id],
                domain_from_row,
            )
            .optional()?
            .ok_or_else(|| StorageError::NotFound(format!("Domain ID {}", domain_id)))?;

        let reservation = bump_locked_domain(&tx, domain, crawl_cutoff(now, cooldown), now)?;
        tx.commit()?;
        Ok(reservation)
    }

    fn pick_stalest_crawlable_url(&self, domain_id: i64) -> StorageResult<Option<CrawlTarget>> {
        let target = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM crawlable_urls c
                     JOIN urls u ON u.id = c.url_id
                     JOIN domains d ON d.id = c.domain_id
                     LEFT JOIN results r ON r.url_id = c.url_id
                     WHERE c.domain_id = ?1
                     GROUP BY c.url_id
                     ORDER BY MAX(r.crawl_begin) ASC NULLS FIRST, c.url_id ASC
                     LIMIT 1",
                    TARGET_COLUMNS
                ),
                params![domain_id],
                target_from_row,
            )
            .optional()?;
        Ok(target)
    }

    // ===== Results =====

    fn create_result(&mut self, url_id: i64) -> StorageResult<ResultHandle> {
        self.conn.execute(
            "INSERT INTO results (url_id, crawl_begin) VALUES (?1, ?2)",
            params![url_id, format_timestamp(stored_now())],
        )?;
        Ok(ResultHandle {
            id: self.conn.last_insert_rowid(),
            url_id,
        })
    }

    fn link_next_request(
        &mut self,
        previous_result_id: i64,
        next_result_id: i64,
    ) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE result_successes SET next_request_id = ?1 WHERE result_id = ?2",
            params![next_result_id, previous_result_id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!(
                "Success for result ID {}",
                previous_result_id
            )));
        }
        Ok(())
    }

    fn commit_success(
        &mut self,
        handle: &ResultHandle,
        success: &NewSuccess<'_>,
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        Self::close_result(&tx, handle)?;
        tx.execute(
            "INSERT INTO result_successes
             (result_id, status_code, headers, headers_orig_size, content, content_orig_size, next_url_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                handle.id,
                success.status_code,
                success.headers,
                success.headers_orig_size,
                success.content,
                success.content_orig_size,
                success.next_url_id,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn commit_error(
        &mut self,
        handle: &ResultHandle,
        is_internal_error: bool,
        description_json: &str,
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        Self::close_result(&tx, handle)?;
        tx.execute(
            "INSERT INTO result_errors (result_id, is_internal_error, description_json)
             VALUES (?1, ?2, ?3)",
            params![handle.id, is_internal_error, description_json],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_result(&self, result_id: i64) -> StorageResult<Option<ResultRecord>> {
        let result = self
            .conn
            .query_row(
                &format!("SELECT {} FROM results WHERE id = ?1", RESULT_COLUMNS),
                params![result_id],
                result_from_row,
            )
            .optional()?;
        Ok(result)
    }

    fn get_success(&self, result_id: i64) -> StorageResult<Option<SuccessRecord>> {
        let success = self
            .conn
            .query_row(
                "SELECT result_id, status_code, headers, headers_orig_size, content,
                 content_orig_size, next_url_id, next_request_id
                 FROM result_successes WHERE result_id = ?1",
                params![result_id],
                |row| {
                    Ok(SuccessRecord {
                        result_id: row.get(0)?,
                        status_code: row.get(1)?,
                        headers: row.get(2)?,
                        headers_orig_size: row.get(3)?,
                        content: row.get(4)?,
                        content_orig_size: row.get(5)?,
                        next_url_id: row.get(6)?,
                        next_request_id: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(success)
    }

    fn get_error(&self, result_id: i64) -> StorageResult<Option<ErrorRecord>> {
        let error = self
            .conn
            .query_row(
                "SELECT result_id, is_internal_error, description_json
                 FROM result_errors WHERE result_id = ?1",
                params![result_id],
                |row| {
                    Ok(ErrorRecord {
                        result_id: row.get(0)?,
                        is_internal_error: row.get(1)?,
                        description_json: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(error)
    }

    fn get_results_for_url(&self, url_id: i64) -> StorageResult<Vec<ResultRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM results WHERE url_id = ?1 ORDER BY crawl_begin ASC, id ASC",
            RESULT_COLUMNS
        ))?;

        let results = stmt
            .query_map(params![url_id], result_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(results)
    }

    // ===== Statistics =====

    fn count_crawlable_urls(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM crawlable_urls", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_unfinished_results(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM results WHERE crawl_end IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
