//! Domain Monitor: a polite liveness crawler for second-level domains
//!
//! This crate turns dirty URL strings into canonical crawlable URLs, schedules
//! at most one request per registrable domain per cooldown window, and records
//! exactly one durable outcome for every crawl attempt.

pub mod compress;
pub mod config;
pub mod crawler;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Domain Monitor operations
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Failed to load trust roots from {path}: {message}")]
    TrustRoots { path: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Receive buffer failure: {0}")]
    Sink(String),

    #[error("Crawl attempt for {url} ended without a submitted outcome")]
    MissingSubmit { url: String },

    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    #[error("URL is not marked as crawlable: {0}")]
    NotCrawlable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for Domain Monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use state::{DomainState, HopState};
pub use url::{classify_url, repair_url, CanonicalUrl, RejectionReason};
