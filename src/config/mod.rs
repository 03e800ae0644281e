//! Configuration module for Domain Monitor
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use domain_monitor::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("monitor.toml")).unwrap();
//! println!("Domains cool down for {} days", config.crawler.cooldown_days);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    default_ignored_hostnames, Config, CrawlerConfig, FetcherConfig, FilterConfig, LimitsConfig,
    OutputConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
