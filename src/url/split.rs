//! Generic URI splitting
//!
//! Unlike a WHATWG parser nothing is rewritten here; the validator compares
//! what was written against what a client would actually connect to.

/// The five top-level components of a URI reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SplitUrl<'a> {
    /// Lower-cased scheme, empty when there is none
    pub scheme: String,
    /// Everything between `//` and the next `/`, `?` or `#`
    pub authority: &'a str,
    pub path: &'a str,
    pub query: &'a str,
    pub fragment: &'a str,
}

/// Host and port as found in the authority
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HostInfo<'a> {
    /// Lower-cased host, `None` when empty
    pub hostname: Option<String>,
    /// Raw port text, `None` when absent or empty
    pub port: Option<&'a str>,
}

/// Splits a URI into scheme, authority, path, query and fragment
pub(crate) fn split_url(url: &str) -> SplitUrl<'_> {
    let (scheme, rest) = split_scheme(url);

    let (authority, rest) = match rest.strip_prefix("//") {
        Some(after) => {
            let end = after.find(&['/', '?', '#'][..]).unwrap_or(after.len());
            (&after[..end], &after[end..])
        }
        None => ("", rest),
    };

    let (rest, fragment) = rest.split_once('#').unwrap_or((rest, ""));
    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));

    SplitUrl {
        scheme,
        authority,
        path,
        query,
        fragment,
    }
}

fn split_scheme(url: &str) -> (String, &str) {
    if let Some((candidate, rest)) = url.split_once(':') {
        let starts_alpha = candidate
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_alphabetic());
        let valid = candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if starts_alpha && valid {
            return (candidate.to_ascii_lowercase(), rest);
        }
    }
    (String::new(), url)
}

impl<'a> SplitUrl<'a> {
    /// True if the authority carries a userinfo part (user, password, or both)
    pub fn has_userinfo(&self) -> bool {
        self.authority.contains('@')
    }

    /// Extracts hostname and port, ignoring any userinfo
    pub fn host_info(&self) -> HostInfo<'a> {
        let hostinfo = match self.authority.rsplit_once('@') {
            Some((_, host)) => host,
            None => self.authority,
        };

        let (host, port) = match hostinfo.split_once('[') {
            Some((_, bracketed)) => {
                let (host, after) = bracketed.split_once(']').unwrap_or((bracketed, ""));
                let port = after.split_once(':').map_or("", |(_, port)| port);
                (host, port)
            }
            None => hostinfo.split_once(':').unwrap_or((hostinfo, "")),
        };

        HostInfo {
            hostname: (!host.is_empty()).then(|| host.to_lowercase()),
            port: (!port.is_empty()).then_some(port),
        }
    }
}

/// Parses a port the way a strict URI library would: ASCII digits only,
/// within 0..=65535
pub(crate) fn parse_port(port: &str) -> Option<u16> {
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    port.parse::<u16>().ok()
}
