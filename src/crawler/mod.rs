//! Crawler module
//!
//! This module contains the crawl machinery, leaves first:
//! - Size-bounded receive buffers and the HTTP fetcher
//! - URL discovery into storage
//! - The crawl attempt that guarantees one outcome per Result
//! - Domain scheduling, the redirect chain driver and the coordinator

mod attempt;
mod coordinator;
mod discovery;
mod driver;
mod fetcher;
mod scheduler;
mod sink;

pub use attempt::{keeps_content, CrawlAttempt, ErrorDescription, IGNORED_STATUS_CODES};
pub use coordinator::{Coordinator, CrawlMode, CrawlStep, RunExit};
pub use discovery::{discover_raw_value, discover_url, DiscoverOptions, Discovery};
pub use driver::{ChainReport, HopRecord, RedirectDriver};
pub use fetcher::{
    build_http_client, load_trust_roots, split_pem_bundle, Fetch, FetchErrorInfo, FetchErrorKind,
    FetchLimits, FetchOutcome, FetchSuccess, Fetcher,
};
pub use scheduler::{Reservation, Scheduler};
pub use sink::{BoundedSink, ReceivedBytes, SinkControl};
