//! URL discovery
//!
//! Registers a URL string in storage according to what the URL pipeline
//! thinks of it:
//!
//! | outcome              | Url | DisasterUrl      | Domain | CrawlableUrl        |
//! |----------------------|-----|------------------|--------|---------------------|
//! | rejected             | yes | if recording     | no     | no                  |
//! | valid, uninteresting | yes | no               | no     | no                  |
//! | valid, interesting   | yes | no               | yes    | if `mark_crawlable` |

use crate::storage::{CrawlTarget, Storage, StorageResult};
use crate::url::{assess_url, prepare_raw_value, InterestFilter, RejectionReason, UrlAssessment};

/// What to write besides the Url row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverOptions {
    pub mark_crawlable: bool,
    pub record_disaster: bool,
}

impl DiscoverOptions {
    /// Bulk import of raw values: record everything
    pub fn import(mark_crawlable: bool) -> Self {
        Self {
            mark_crawlable,
            record_disaster: true,
        }
    }

    /// Redirect targets: never scheduled on their own, never recorded as disasters
    pub fn redirect() -> Self {
        Self {
            mark_crawlable: false,
            record_disaster: false,
        }
    }
}

/// Result of registering one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub url_id: i64,
    /// The stored URL string
    pub url: String,
    pub rejection: Option<RejectionReason>,
    /// Set when the URL is worth crawling; its domain row exists
    pub target: Option<CrawlTarget>,
}

impl Discovery {
    pub fn is_crawlable(&self) -> bool {
        self.target.is_some()
    }
}

/// Registers a single URL
///
/// No repairs are applied; redirect targets should already be valid URLs.
pub fn discover_url<S: Storage>(
    storage: &mut S,
    url: &str,
    options: DiscoverOptions,
    filter: &InterestFilter,
) -> StorageResult<Discovery> {
    let assessment = assess_url(url, filter);
    // Stored under the canonical string, so equivalent redirects deduplicate
    let url_id = storage.upsert_url(assessment.url())?;

    match assessment {
        UrlAssessment::Rejected { url, reason } => {
            tracing::debug!("Rejected {}: {}", url, reason);
            if options.record_disaster {
                storage.record_disaster(url_id, &reason.to_string())?;
            }
            Ok(Discovery {
                url_id,
                url,
                rejection: Some(reason),
                target: None,
            })
        }
        UrlAssessment::Uninteresting { url, .. } => {
            tracing::debug!("Not interested in {}", url);
            Ok(Discovery {
                url_id,
                url: url.into_string(),
                rejection: None,
                target: None,
            })
        }
        UrlAssessment::Crawlable { url, domain } => {
            let domain = storage.upsert_domain(&domain)?;
            if options.mark_crawlable {
                storage.mark_crawlable(url_id, domain.id)?;
            }
            Ok(Discovery {
                url_id,
                url: url.as_str().to_string(),
                rejection: None,
                target: Some(CrawlTarget {
                    url_id,
                    url: url.into_string(),
                    domain_id: domain.id,
                    domain_name: domain.domain_name,
                }),
            })
        }
    }
}

/// Splits and repairs a raw tag value, then registers every URL in it
pub fn discover_raw_value<S: Storage>(
    storage: &mut S,
    raw: &str,
    options: DiscoverOptions,
    filter: &InterestFilter,
) -> StorageResult<Vec<Discovery>> {
    prepare_raw_value(raw)
        .iter()
        .map(|url| discover_url(storage, url, options, filter))
        .collect()
}
