use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Ordered repairs for mangled scheme separators and dangling `#`/`?`.
    ///
    /// Each separator rule refuses to fire when the next character is already
    /// a slash or backslash; that character (or end of input) is captured and
    /// written back unchanged.
    static ref EASY_REPAIRS: Vec<(Regex, &'static str)> = [
        (r"^http(s?):///([^\\/]|$)", "http${1}://${2}"),
        (r"^http(s?):/([^\\/]|$)", "http${1}://${2}"),
        (r"^http(s?):\\\\?([^\\/]|$)", "http${1}://${2}"),
        (r"^http(s?):([^\\/]|$)", "http${1}://${2}"),
        (r"^http(s?)://\\\\([^\\/]|$)", "http${1}://${2}"),
        (r"^http(s?)//:([^\\/:]|$)", "http${1}://${2}"),
        (r"^http(s?)[.;]?//([^\\/]|$)", "http${1}://${2}"),
        // Trailing hash first, then the "trailing" question mark
        (r"^([^#]+)#$", "${1}"),
        (r"^([^#?]+)\?(#[^#?]+)?$", "${1}${2}"),
        (r"^http://https://([^\\/]|$)", "https://${1}"),
    ]
    .iter()
    .map(|(pattern, replacement)| {
        (
            Regex::new(pattern).expect("repair patterns are valid"),
            *replacement,
        )
    })
    .collect();

    /// A separator between two URLs packed into one raw value
    static ref MULTI_VALUE_SEPARATOR: Regex =
        Regex::new(r"[,;] ?http").expect("separator pattern is valid");
}

/// Applies the syntactic repairs to a single URL string
///
/// Every rule runs exactly once, in order. Correct URLs pass through
/// unchanged, and so does the output of a previous repair.
///
/// # Examples
///
/// ```
/// use domain_monitor::url::repair_url;
///
/// assert_eq!(repair_url(r"https:\\example.com/"), "https://example.com/");
/// assert_eq!(repair_url("http://https://example.de"), "https://example.de");
/// assert_eq!(repair_url("https://example.com/?#foo"), "https://example.com/#foo");
/// ```
pub fn repair_url(raw: &str) -> String {
    let mut url = raw.to_string();
    for (regex, replacement) in EASY_REPAIRS.iter() {
        if let std::borrow::Cow::Owned(repaired) = regex.replace(&url, *replacement) {
            url = repaired;
        }
    }
    url
}

/// Splits a raw value that packs several URLs together
///
/// Values are separated by `,` or `;`, optionally followed by one space, and
/// only where the next piece starts with `http`. The separator is dropped,
/// the `http` stays with the following piece.
pub fn split_multi_value(raw: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for separator in MULTI_VALUE_SEPARATOR.find_iter(raw) {
        pieces.push(&raw[start..separator.start()]);
        start = separator.end() - "http".len();
    }
    pieces.push(&raw[start..]);
    pieces
}

/// Splits a raw value and repairs each of its URLs
pub fn prepare_raw_value(raw: &str) -> Vec<String> {
    split_multi_value(raw)
        .into_iter()
        .map(repair_url)
        .collect()
}
