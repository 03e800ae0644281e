//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{
    CrawlTarget, DomainRecord, DomainReservation, ErrorRecord, NewSuccess, ResultHandle,
    ResultRecord, SuccessRecord,
};
use chrono::Duration;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Result {0} already has an outcome")]
    AlreadyFinalized(i64),

    #[error("Invalid stored timestamp {0}")]
    Timestamp(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every write is its own durable transaction. The reservation methods are
/// the only cross-worker critical sections: they hold the database write
/// lock while re-checking and bumping a domain, and commit before returning.
pub trait Storage {
    // ===== Discovery =====

    /// Inserts a URL string or gets the existing ID
    fn upsert_url(&mut self, url: &str) -> StorageResult<i64>;

    /// Inserts a domain or gets the existing row
    fn upsert_domain(&mut self, domain_name: &str) -> StorageResult<DomainRecord>;

    /// Marks a URL as crawlable under the given domain; existing marks are kept
    fn mark_crawlable(&mut self, url_id: i64, domain_id: i64) -> StorageResult<()>;

    /// Records why a URL is excluded, replacing any earlier reason
    fn record_disaster(&mut self, url_id: i64, reason: &str) -> StorageResult<()>;

    // ===== Lookups =====

    fn get_url_id(&self, url: &str) -> StorageResult<Option<i64>>;

    fn get_domain(&self, domain_name: &str) -> StorageResult<Option<DomainRecord>>;

    fn get_domain_by_id(&self, domain_id: i64) -> StorageResult<Option<DomainRecord>>;

    /// Gets the crawlable entry for an exact URL string, if it is crawlable
    fn get_crawl_target(&self, url: &str) -> StorageResult<Option<CrawlTarget>>;

    fn get_disaster_reason(&self, url_id: i64) -> StorageResult<Option<String>>;

    // ===== Reservation =====

    /// Locks the most overdue domain that has a crawlable URL, re-checks
    /// it against `cooldown` and bumps it
    ///
    /// Domains never contacted come first, ties break by insertion order.
    /// The clock is read only once the write lock is held, so time spent
    /// waiting on another worker never shortens the cooldown.
    fn reserve_next_domain_target(&mut self, cooldown: Duration) -> StorageResult<DomainReservation>;

    /// Locks one domain, re-checks it against `cooldown` and bumps it
    ///
    /// Never returns [`DomainReservation::Empty`]; an unknown ID is
    /// [`StorageError::NotFound`].
    fn lock_then_bump_domain(
        &mut self,
        domain_id: i64,
        cooldown: Duration,
    ) -> StorageResult<DomainReservation>;

    /// Picks the crawlable URL of a domain whose latest attempt is oldest;
    /// never-attempted URLs come first
    fn pick_stalest_crawlable_url(&self, domain_id: i64) -> StorageResult<Option<CrawlTarget>>;

    // ===== Results =====

    /// Durably registers a crawl attempt before any network I/O
    fn create_result(&mut self, url_id: i64) -> StorageResult<ResultHandle>;

    /// Points a stored response at the attempt that followed its redirect
    fn link_next_request(&mut self, previous_result_id: i64, next_result_id: i64)
        -> StorageResult<()>;

    /// Stores a response and closes the attempt
    fn commit_success(
        &mut self,
        handle: &ResultHandle,
        success: &NewSuccess<'_>,
    ) -> StorageResult<()>;

    /// Stores a failure and closes the attempt
    fn commit_error(
        &mut self,
        handle: &ResultHandle,
        is_internal_error: bool,
        description_json: &str,
    ) -> StorageResult<()>;

    fn get_result(&self, result_id: i64) -> StorageResult<Option<ResultRecord>>;

    fn get_success(&self, result_id: i64) -> StorageResult<Option<SuccessRecord>>;

    fn get_error(&self, result_id: i64) -> StorageResult<Option<ErrorRecord>>;

    /// Gets all attempts for a URL, oldest first
    fn get_results_for_url(&self, url_id: i64) -> StorageResult<Vec<ResultRecord>>;

    // ===== Statistics =====

    fn count_crawlable_urls(&self) -> StorageResult<u64>;

    fn count_unfinished_results(&self) -> StorageResult<u64>;
}
