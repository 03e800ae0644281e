use serde::Deserialize;

/// Main configuration structure for Domain Monitor
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub filter: FilterConfig,
}

/// Scheduling and redirect-chain behavior
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Minimum number of days between two contacts to the same domain
    #[serde(rename = "cooldown-days", default = "default_cooldown_days")]
    pub cooldown_days: u32,

    /// Maximum number of hops followed in one redirect chain
    #[serde(rename = "max-redirect-depth", default = "default_max_redirect_depth")]
    pub max_redirect_depth: u32,

    /// Delay between two hops of a redirect chain (milliseconds)
    #[serde(rename = "redirect-delay-ms", default = "default_redirect_delay_ms")]
    pub redirect_delay_ms: u64,

    /// Sleep when the scheduler has nothing to hand out (seconds)
    #[serde(rename = "idle-backoff-secs", default = "default_idle_backoff_secs")]
    pub idle_backoff_secs: u64,

    /// The continuous loop exits as soon as this file exists
    #[serde(rename = "stop-file", default)]
    pub stop_file: Option<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            cooldown_days: default_cooldown_days(),
            max_redirect_depth: default_max_redirect_depth(),
            redirect_delay_ms: default_redirect_delay_ms(),
            idle_backoff_secs: default_idle_backoff_secs(),
            stop_file: None,
        }
    }
}

/// HTTP transfer settings
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Total per-request timeout (milliseconds)
    #[serde(rename = "timeout-ms", default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Receive speed guideline (bytes per second)
    #[serde(rename = "max-recv-speed-bps", default = "default_max_recv_speed_bps")]
    pub max_recv_speed_bps: u64,

    /// PEM bundle that replaces the built-in trust roots
    #[serde(rename = "ca-bundle-path", default)]
    pub ca_bundle_path: Option<String>,

    /// How often the bundle is re-read (hours)
    #[serde(
        rename = "ca-bundle-refresh-hours",
        default = "default_ca_bundle_refresh_hours"
    )]
    pub ca_bundle_refresh_hours: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_recv_speed_bps: default_max_recv_speed_bps(),
            ca_bundle_path: None,
            ca_bundle_refresh_hours: default_ca_bundle_refresh_hours(),
        }
    }
}

/// Storage budgets for compressed headers and bodies
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(rename = "headers-max-length", default = "default_headers_max_length")]
    pub headers_max_length: usize,

    #[serde(rename = "content-max-length", default = "default_content_max_length")]
    pub content_max_length: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            headers_max_length: default_headers_max_length(),
            content_max_length: default_content_max_length(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header value
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (contact: {})",
            self.crawler_name, self.crawler_version, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Interest filter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    /// Hostnames that are never worth crawling
    #[serde(rename = "ignored-hostnames", default = "default_ignored_hostnames")]
    pub ignored_hostnames: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            ignored_hostnames: default_ignored_hostnames(),
        }
    }
}

fn default_cooldown_days() -> u32 {
    25
}

fn default_max_redirect_depth() -> u32 {
    10
}

fn default_redirect_delay_ms() -> u64 {
    2000
}

fn default_idle_backoff_secs() -> u64 {
    3600
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_recv_speed_bps() -> u64 {
    1_048_576
}

fn default_ca_bundle_refresh_hours() -> u64 {
    8
}

fn default_headers_max_length() -> usize {
    1024
}

fn default_content_max_length() -> usize {
    4096
}

/// High-volume hosts whose pages all behave alike; checking thousands of them
/// says nothing about dead domains.
pub fn default_ignored_hostnames() -> Vec<String> {
    [
        "qr.bvg.de",
        "fahrinfo.vbb.de",
        "ns.gis-bldam-brandenburg.de",
        "www.wuppertal.de",
        "wuppertal.de",
        "gisdata.krzn.de",
        "www.denkmalpflege.bremen.de",
        "denkmalpflege.bremen.de",
        "www.stadtwerke-muenster.de",
        "stadtwerke-muenster.de",
        "www.stolpersteine-berlin.de",
        "stolpersteine-berlin.de",
        "www.suehnekreuz.de",
        "suehnekreuz.de",
        "www.dortmund.de",
        "dortmund.de",
        "kulturdb.de",
        "www.rewe.de",
        "rewe.de",
        "www.edeka.de",
        "edeka.de",
        "denkmaldatenbank.berlin.de",
        "rips-dienste.lubw.baden-wuerttemberg.de",
        "www.museenkoeln.de",
        "museenkoeln.de",
        "db-sandsteinklettern.gipfelbuch.de",
        "www.facebook.com",
        "www.facebook.de",
        "de-de.facebook.com",
        "m.facebook.com",
        "facebook.com",
        "www.spessartprojekt.de",
        "spessartprojekt.de",
        "nsg.naturschutzinformationen.nrw.de",
        "gdi.essen.de",
        "de.wikipedia.org",
        "de.m.wikipedia.org",
        "vertretung.allianz.de",
        "www.nlwkn.niedersachsen.de",
        "nlwkn.niedersachsen.de",
        "www.denkmalprojekt.org",
        "denkmalprojekt.org",
        "www.aldi-nord.de",
        "aldi-nord.de",
        "www.aldi-sued.de",
        "aldi-sued.de",
        "aldi.de",
        "www.magdeburg.de",
        "magdeburg.de",
        "www.berlin.de",
        "berlin.de",
        "youtu.be",
        "www.youtube.com",
        "youtube.com",
        "wuerzburgwiki.de",
        "www.outdoor-karte.de",
        "outdoor-karte.de",
        "www.lidl.de",
        "lidl.de",
        "polska-org.pl",
        "www.netto-online.de",
        "netto-online.de",
    ]
    .iter()
    .map(|host| host.to_string())
    .collect()
}
