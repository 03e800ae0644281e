use crate::url::split::{parse_port, split_url};
use crate::url::RejectionReason;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

/// Characters that never appear in a URL worth contacting, checked in order
const WEIRD_CHARACTERS: &[char] = &[
    '\\', ' ', '\u{a0}', '\u{ba}', '\u{308}', '\u{200b}', '\u{200e}', '\u{2010}',
];

lazy_static! {
    static ref BARE_IP: Regex = Regex::new(r"^[0-9.:]+$").expect("bare IP pattern is valid");
}

/// A URL in canonical form: scheme, hostname, path and query only
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalUrl {
    url: String,
    hostname: String,
}

impl CanonicalUrl {
    /// The canonical URL string
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// The lower-cased hostname, without port or surrounding dots
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn into_string(self) -> String {
        self.url
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Validates a (repaired) URL and brings it into canonical form
///
/// # Validation Steps
///
/// 1. Reject backslashes, spaces and a few invisible or look-alike characters
/// 2. Split into scheme/authority/path/query/fragment; only http and https
/// 3. Reject embedded credentials
/// 4. Reject ports that are not integers in 0..=65535
/// 5. Accept only the scheme's default port (80/443), anything else is forced
/// 6. Lower-case hostname and authority, drop one trailing `:` from the
///    authority, and reject if the authority is not exactly hostname+port
/// 7. Reject hostnames containing `..` or `http`
/// 8. Strip surrounding dots; reject empty and bare IP hostnames
/// 9. Empty path becomes `/`, the query is kept verbatim, the fragment dropped
///
/// The canonical form classifies as itself.
///
/// # Examples
///
/// ```
/// use domain_monitor::url::{classify_url, RejectionReason};
///
/// let url = classify_url("https://Foo.com:443?q=1#quux").unwrap();
/// assert_eq!(url.as_str(), "https://foo.com/?q=1");
///
/// assert_eq!(
///     classify_url("https://foo.com:8475/"),
///     Err(RejectionReason::ForcedPort { port: 8475 })
/// );
/// ```
pub fn classify_url(url: &str) -> Result<CanonicalUrl, RejectionReason> {
    if let Some(&ch) = WEIRD_CHARACTERS.iter().find(|ch| url.contains(**ch)) {
        return Err(RejectionReason::WeirdCharacter(ch));
    }

    let parts = split_url(url);
    let default_port = match parts.scheme.as_str() {
        "http" => 80,
        "https" => 443,
        other => return Err(RejectionReason::UnusualScheme(other.to_string())),
    };

    if parts.has_userinfo() {
        return Err(RejectionReason::ContainsLogin);
    }

    let host_info = parts.host_info();
    let port = match host_info.port {
        Some(text) => Some(parse_port(text).ok_or(RejectionReason::InvalidPort)?),
        None => None,
    };
    // Plenty of servers redirect to an explicit default port, so that one is tolerated
    let port_suffix = match port {
        None => String::new(),
        Some(port) if port == default_port => format!(":{}", port),
        Some(port) => return Err(RejectionReason::ForcedPort { port }),
    };

    let mut authority = parts.authority.to_lowercase();
    if authority.ends_with(':') {
        authority.pop();
    }
    let hostname = match host_info.hostname {
        Some(hostname) if authority == format!("{}{}", hostname, port_suffix) => hostname,
        hostname => {
            return Err(RejectionReason::DisagreeingAuthority {
                authority,
                hostname,
            })
        }
    };

    if hostname.contains("..") {
        return Err(RejectionReason::DoubleDotInHostname);
    }
    if hostname.contains("http") {
        return Err(RejectionReason::SuspiciousHttpInHostname);
    }

    let hostname = hostname.trim_matches('.');
    if hostname.is_empty() {
        return Err(RejectionReason::EmptyHostname);
    }
    if BARE_IP.is_match(hostname) {
        return Err(RejectionReason::BareIp(hostname.to_string()));
    }

    let path = if parts.path.is_empty() { "/" } else { parts.path };
    let mut canonical = format!("{}://{}{}", parts.scheme, hostname, path);
    if !parts.query.is_empty() {
        canonical.push('?');
        canonical.push_str(parts.query);
    }

    Ok(CanonicalUrl {
        url: canonical,
        hostname: hostname.to_string(),
    })
}
