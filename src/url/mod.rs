//! URL handling module for Domain Monitor
//!
//! Raw values go through two stages: syntactic repair ([`repair_url`]) and
//! semantic validation ([`classify_url`]). A URL that survives both is then
//! mapped to its registrable domain and checked against the interest filter.

mod domain;
mod normalize;
mod repair;
mod split;

use std::fmt;

// Re-export main functions
pub use domain::{registrable_domain, InterestFilter};
pub use normalize::{classify_url, CanonicalUrl};
pub use repair::{prepare_raw_value, repair_url, split_multi_value};

/// Why a URL is permanently excluded from crawling
///
/// The `Display` form is the stable text stored with a disaster URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RejectionReason {
    /// Contains a backslash, a space, or an invisible look-alike character
    WeirdCharacter(char),
    /// Scheme other than http or https (possibly empty)
    UnusualScheme(String),
    /// Authority carries a user and/or password
    ContainsLogin,
    /// Port is not an integer in 0..=65535
    InvalidPort,
    /// Explicit port other than the scheme's default
    ForcedPort { port: u16 },
    /// Authority is not exactly hostname plus (default) port
    DisagreeingAuthority {
        authority: String,
        hostname: Option<String>,
    },
    DoubleDotInHostname,
    /// Usually a nested URL, e.g. `https://https://example.de/`
    SuspiciousHttpInHostname,
    /// Hostname was nothing but dots
    EmptyHostname,
    BareIp(String),
    /// No registrable domain under the public suffix list
    NoPublicSuffix,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WeirdCharacter(ch) => write!(f, "weird character {:?}", ch),
            Self::UnusualScheme(scheme) => write!(f, "unusual scheme {}", scheme),
            Self::ContainsLogin => f.write_str("contains login information, not crawling"),
            Self::InvalidPort => f.write_str("port is not a valid integer"),
            Self::ForcedPort { port } => write!(f, "refusing to use forced port {}", port),
            Self::DisagreeingAuthority {
                authority,
                hostname: Some(hostname),
            } => write!(
                f,
                "disagreeing authority '{}' and hostname '{}'",
                authority, hostname
            ),
            Self::DisagreeingAuthority {
                authority,
                hostname: None,
            } => write!(f, "disagreeing authority '{}' and no hostname", authority),
            Self::DoubleDotInHostname => f.write_str("double-dot in hostname"),
            Self::SuspiciousHttpInHostname => f.write_str("suspicious 'http' in hostname"),
            Self::EmptyHostname => f.write_str("hostname consists only of dots"),
            Self::BareIp(hostname) => write!(f, "hostname '{}' looks like a bare IP", hostname),
            Self::NoPublicSuffix => f.write_str("has no public suffix"),
        }
    }
}

/// Everything the crawler needs to know about one URL string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlAssessment {
    /// Permanently excluded; `url` is the string as given
    Rejected {
        url: String,
        reason: RejectionReason,
    },
    /// Valid, but its hostname is on the denylist
    Uninteresting { url: CanonicalUrl, domain: String },
    /// Valid and worth crawling
    Crawlable { url: CanonicalUrl, domain: String },
}

impl UrlAssessment {
    /// The string under which the URL is stored
    pub fn url(&self) -> &str {
        match self {
            Self::Rejected { url, .. } => url,
            Self::Uninteresting { url, .. } | Self::Crawlable { url, .. } => url.as_str(),
        }
    }

    pub fn is_crawlable(&self) -> bool {
        matches!(self, Self::Crawlable { .. })
    }
}

/// Validates a URL, resolves its registrable domain and applies the interest
/// filter
///
/// No repairs are applied; callers that hold raw tag values run
/// [`prepare_raw_value`] first.
///
/// # Examples
///
/// ```
/// use domain_monitor::url::{assess_url, InterestFilter, UrlAssessment};
///
/// let filter = InterestFilter::default();
/// let assessment = assess_url("https://Blog.Example.co.uk/post", &filter);
/// assert!(assessment.is_crawlable());
/// assert_eq!(assessment.url(), "https://blog.example.co.uk/post");
///
/// assert!(matches!(
///     assess_url("https://de.wikipedia.org/wiki/Rust", &filter),
///     UrlAssessment::Uninteresting { .. }
/// ));
/// ```
pub fn assess_url(url: &str, filter: &InterestFilter) -> UrlAssessment {
    let canonical = match classify_url(url) {
        Ok(canonical) => canonical,
        Err(reason) => {
            return UrlAssessment::Rejected {
                url: url.to_string(),
                reason,
            }
        }
    };

    let Some(domain) = registrable_domain(canonical.hostname()) else {
        return UrlAssessment::Rejected {
            url: canonical.into_string(),
            reason: RejectionReason::NoPublicSuffix,
        };
    };

    if filter.is_interesting(canonical.hostname()) {
        UrlAssessment::Crawlable {
            url: canonical,
            domain,
        }
    } else {
        UrlAssessment::Uninteresting {
            url: canonical,
            domain,
        }
    }
}
