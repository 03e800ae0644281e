use crate::config::FilterConfig;
use std::collections::HashSet;

/// Extracts the registrable second-level domain of a hostname
///
/// The lookup is strict: a hostname whose top-level suffix is not on the
/// public suffix list, a single label, or a bare public suffix has no
/// registrable domain.
///
/// # Examples
///
/// ```
/// use domain_monitor::url::registrable_domain;
///
/// assert_eq!(registrable_domain("foo.bar.example.co.uk"), Some("example.co.uk".to_string()));
/// assert_eq!(registrable_domain("something.local"), None);
/// assert_eq!(registrable_domain("localhost"), None);
/// ```
pub fn registrable_domain(hostname: &str) -> Option<String> {
    let domain = psl::domain(hostname.as_bytes())?;
    if !domain.suffix().is_known() {
        return None;
    }
    std::str::from_utf8(domain.as_bytes())
        .ok()
        .map(str::to_string)
}

/// Denylist of hostnames that are not worth crawling
///
/// The check is on the full hostname, not the registrable domain:
/// `www.wuppertal.de` can be ignored while `www.jobcenter.wuppertal.de`
/// is still crawled.
#[derive(Debug, Clone)]
pub struct InterestFilter {
    ignored: HashSet<String>,
}

impl InterestFilter {
    pub fn new<I, S>(ignored: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored: ignored.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.ignored_hostnames.iter().cloned())
    }

    /// Returns true unless the hostname is on the denylist
    pub fn is_interesting(&self, hostname: &str) -> bool {
        !self.ignored.contains(hostname)
    }
}

impl Default for InterestFilter {
    fn default() -> Self {
        Self::from_config(&FilterConfig::default())
    }
}
