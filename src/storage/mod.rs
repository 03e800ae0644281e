//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - URL, domain, crawlable and disaster bookkeeping
//! - Domain reservation under an exclusive write lock
//! - Crawl attempts and their single terminal outcome

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::MonitorError;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
pub fn open_storage(path: &Path) -> Result<SqliteStorage, MonitorError> {
    SqliteStorage::new(path)
}

/// Formats a timestamp for storage
///
/// The fixed-width form makes lexical order equal chronological order,
/// which the scheduling queries rely on.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a timestamp written by [`format_timestamp`]
pub fn parse_timestamp(text: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|e| StorageError::Timestamp(format!("{}: {}", text, e)))
}

/// A crawlable URL together with its domain, ready to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTarget {
    pub url_id: i64,
    pub url: String,
    pub domain_id: i64,
    pub domain_name: String,
}

/// Represents a domain in the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRecord {
    pub id: i64,
    pub domain_name: String,
    pub last_contacted: Option<DateTime<Utc>>,
}

/// Outcome of trying to lock and bump a domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainReservation {
    /// No domain has a crawlable URL
    Empty,
    /// The candidate is still cooling down; nothing was written
    TooSoon(DomainRecord),
    /// `last_contacted` was durably set to now; the record holds the new value
    Bumped(DomainRecord),
}

/// A crawl attempt that has been durably registered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultHandle {
    pub id: i64,
    pub url_id: i64,
}

/// Represents a crawl attempt in the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub id: i64,
    pub url_id: i64,
    pub crawl_begin: DateTime<Utc>,
    pub crawl_end: Option<DateTime<Utc>>,
}

/// A response to be stored; sizes follow the sentinel convention
#[derive(Debug, Clone, Copy)]
pub struct NewSuccess<'a> {
    pub status_code: u16,
    pub headers: &'a [u8],
    pub headers_orig_size: i64,
    pub content: Option<&'a [u8]>,
    pub content_orig_size: i64,
    pub next_url_id: Option<i64>,
}

/// Represents a stored response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessRecord {
    pub result_id: i64,
    pub status_code: u16,
    /// Brotli-compressed header bytes
    pub headers: Vec<u8>,
    pub headers_orig_size: i64,
    /// Brotli-compressed body, absent when not worth keeping
    pub content: Option<Vec<u8>>,
    pub content_orig_size: i64,
    pub next_url_id: Option<i64>,
    pub next_request_id: Option<i64>,
}

/// Represents a stored failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub result_id: i64,
    pub is_internal_error: bool,
    pub description_json: String,
}
