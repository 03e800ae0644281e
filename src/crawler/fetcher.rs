//! HTTP fetch executor
//!
//! This module performs exactly one HTTP(S) request per call:
//! - Identifying user agent with an operator contact address
//! - Optional private trust-root bundle, re-read on a fixed interval
//! - No automatic redirects; the Location is resolved and handed back
//! - Receive speed guideline and a total timeout
//! - Size-bounded header and body buffers

use crate::config::{Config, FetcherConfig, LimitsConfig};
use crate::crawler::sink::{BoundedSink, ReceivedBytes, SinkControl};
use crate::{MonitorError, Result};
use reqwest::header::LOCATION;
use reqwest::{redirect::Policy, Certificate, Client, Response};
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, Instant};

const PEM_END_MARKER: &str = "-----END CERTIFICATE-----";

/// Receive thresholds for headers and body
///
/// Compression is expected to gain a factor of 10 at best, so ten times the
/// storage budget is kept; beyond a hundred times the transfer is aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    pub header_save: usize,
    pub header_stop: u64,
    pub body_save: usize,
    pub body_stop: u64,
}

impl FetchLimits {
    pub fn from_config(limits: &LimitsConfig) -> Self {
        Self {
            header_save: limits.headers_max_length * 10,
            header_stop: limits.headers_max_length as u64 * 100,
            body_save: limits.content_max_length * 10,
            body_stop: limits.content_max_length as u64 * 100,
        }
    }
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self::from_config(&LimitsConfig::default())
    }
}

/// A response was exchanged
///
/// Any status counts, including 404 and 500. If the header was truncated,
/// no body was read at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSuccess {
    pub status_code: u16,
    /// Absolute redirect target of a 3xx response
    pub location: Option<String>,
    pub headers: ReceivedBytes,
    pub body: ReceivedBytes,
}

/// Failure classes with stable numeric codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Builder,
    Request,
    Connect,
    Timeout,
    Redirect,
    Body,
    Decode,
    Other,
}

impl FetchErrorKind {
    pub fn code(&self) -> u16 {
        match self {
            Self::Builder => 1,
            Self::Request => 2,
            Self::Connect => 3,
            Self::Timeout => 4,
            Self::Redirect => 5,
            Self::Body => 6,
            Self::Decode => 7,
            Self::Other => 99,
        }
    }

    pub fn classify(error: &reqwest::Error) -> Self {
        // Timeouts also report as connect or body errors, so check them first
        if error.is_builder() {
            Self::Builder
        } else if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::Connect
        } else if error.is_redirect() {
            Self::Redirect
        } else if error.is_body() {
            Self::Body
        } else if error.is_decode() {
            Self::Decode
        } else if error.is_request() {
            Self::Request
        } else {
            Self::Other
        }
    }
}

/// A transfer failed; everything known about it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchErrorInfo {
    pub errcode: u16,
    pub kind: FetchErrorKind,
    pub errstr: String,
    /// HTTP status if one was received, 0 otherwise
    pub response_code: u16,
    pub header_size_recv: u64,
    pub body_size_recv: u64,
}

impl FetchErrorInfo {
    fn from_reqwest(
        error: &reqwest::Error,
        response_code: u16,
        header_sink: &BoundedSink,
        body_sink: &BoundedSink,
    ) -> Self {
        let kind = FetchErrorKind::classify(error);
        Self {
            errcode: kind.code(),
            kind,
            errstr: error_chain(error),
            response_code,
            header_size_recv: header_sink.size(),
            body_size_recv: body_sink.size(),
        }
    }
}

/// Exactly one of these comes back from a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(FetchSuccess),
    Error(FetchErrorInfo),
}

/// The seam between the redirect driver and the network
#[allow(async_fn_in_trait)]
pub trait Fetch {
    /// Performs one request
    ///
    /// Network and protocol failures are an `Ok(FetchOutcome::Error)`; an
    /// `Err` means something went wrong on our side.
    async fn fetch(&mut self, url: &str) -> Result<FetchOutcome>;
}

/// Flattens an error and its sources into one line
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Splits a PEM bundle into single certificates
pub fn split_pem_bundle(bundle: &str) -> Vec<&str> {
    let mut certificates = Vec::new();
    let mut rest = bundle;
    while let Some(end) = rest.find(PEM_END_MARKER) {
        let end = end + PEM_END_MARKER.len();
        let block = rest[..end].trim();
        if block.contains("-----BEGIN CERTIFICATE-----") {
            certificates.push(block);
        }
        rest = &rest[end..];
    }
    certificates
}

/// Loads every certificate of a PEM bundle
pub fn load_trust_roots(path: &Path) -> Result<Vec<Certificate>> {
    let trust_roots_error = |message: String| MonitorError::TrustRoots {
        path: path.display().to_string(),
        message,
    };

    let bundle = std::fs::read_to_string(path).map_err(|e| trust_roots_error(e.to_string()))?;
    let certificates = split_pem_bundle(&bundle)
        .into_iter()
        .map(|pem| Certificate::from_pem(pem.as_bytes()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| trust_roots_error(e.to_string()))?;

    if certificates.is_empty() {
        return Err(trust_roots_error("no certificates found".to_string()));
    }
    Ok(certificates)
}

/// Builds an HTTP client with proper configuration
///
/// Peer verification always stays on. With a bundle configured, the built-in
/// roots are disabled so that a broken bundle fails fast. Transparent
/// decompression is off: it would strip `Content-Encoding` and
/// `Content-Length` from the stored head, and the stored body is
/// recompressed anyway.
///
/// # Example
///
/// ```no_run
/// use domain_monitor::config::FetcherConfig;
/// use domain_monitor::crawler::build_http_client;
///
/// let client = build_http_client(
///     &FetcherConfig::default(),
///     "domain-monitor/0.1.0 (contact: ops@example.com)",
/// )
/// .unwrap();
/// ```
pub fn build_http_client(config: &FetcherConfig, user_agent: &str) -> Result<Client> {
    let mut builder = Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_millis(config.timeout_ms))
        .redirect(Policy::none()) // The driver decides about redirects
        .gzip(false)
        .brotli(false);

    if let Some(path) = &config.ca_bundle_path {
        builder = builder.tls_built_in_root_certs(false);
        for certificate in load_trust_roots(Path::new(path))? {
            builder = builder.add_root_certificate(certificate);
        }
    }

    Ok(builder.build()?)
}

/// Serializes the status line and headers the way they came over the wire
fn serialize_head(response: &Response) -> Vec<u8> {
    let mut head = format!("{:?} {}\r\n", response.version(), response.status()).into_bytes();
    for (name, value) in response.headers() {
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");
    head
}

/// Absolute redirect target, if the response is a redirect with a usable Location
fn redirect_target(response: &Response) -> Option<String> {
    if !response.status().is_redirection() {
        return None;
    }
    let location = response.headers().get(LOCATION)?.to_str().ok()?;
    response
        .url()
        .join(location)
        .ok()
        .map(|url| url.to_string())
}

/// The production fetch executor
pub struct Fetcher {
    client: Client,
    config: FetcherConfig,
    user_agent: String,
    limits: FetchLimits,
    last_bundle_read: Instant,
}

impl Fetcher {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_parts(
            config.fetcher.clone(),
            config.user_agent.header_value(),
            FetchLimits::from_config(&config.limits),
        )
    }

    pub fn with_parts(config: FetcherConfig, user_agent: String, limits: FetchLimits) -> Result<Self> {
        let client = build_http_client(&config, &user_agent)?;
        tracing::debug!(
            "Fetcher ready: user agent {:?}, limits {:?}, trust roots {:?}",
            user_agent,
            limits,
            config.ca_bundle_path
        );
        Ok(Self {
            client,
            config,
            user_agent,
            limits,
            last_bundle_read: Instant::now(),
        })
    }

    pub fn limits(&self) -> FetchLimits {
        self.limits
    }

    /// Rebuilds the client once the trust-root bundle is due for a re-read
    ///
    /// A bundle that fails to load keeps the previous client in service.
    fn refresh_trust_roots(&mut self) {
        if self.config.ca_bundle_path.is_none() {
            return;
        }
        let interval = Duration::from_secs(self.config.ca_bundle_refresh_hours * 3600);
        if self.last_bundle_read.elapsed() < interval {
            return;
        }

        tracing::info!("Re-reading trust-root bundle");
        match build_http_client(&self.config, &self.user_agent) {
            Ok(client) => self.client = client,
            Err(e) => tracing::warn!("Keeping previous trust roots: {}", e),
        }
        self.last_bundle_read = Instant::now();
    }

    /// Sleeps as long as needed to stay at or below the speed guideline
    async fn throttle(&self, received: u64, started: Instant) {
        let bps = self.config.max_recv_speed_bps.max(1);
        let earliest = Duration::from_secs_f64(received as f64 / bps as f64);
        let elapsed = started.elapsed();
        if earliest > elapsed {
            tokio::time::sleep(earliest - elapsed).await;
        }
    }

    /// Performs one request and classifies the result
    ///
    /// # Returns
    ///
    /// * `Ok(FetchOutcome::Success)` - A response was exchanged (maybe truncated)
    /// * `Ok(FetchOutcome::Error)` - The transfer failed
    /// * `Err(MonitorError::Sink)` - A receive buffer failed internally
    pub async fn fetch_url(&mut self, url: &str) -> Result<FetchOutcome> {
        self.refresh_trust_roots();

        let mut header_sink = BoundedSink::new(self.limits.header_save, self.limits.header_stop);
        let mut body_sink = BoundedSink::new(self.limits.body_save, self.limits.body_stop);
        let started = Instant::now();

        let mut response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                return Ok(FetchOutcome::Error(FetchErrorInfo::from_reqwest(
                    &e,
                    0,
                    &header_sink,
                    &body_sink,
                )))
            }
        };

        let status_code = response.status().as_u16();
        let location = redirect_target(&response);
        let header_control = header_sink.receive(&serialize_head(&response));

        let mut body_error = None;
        if header_control == SinkControl::Continue {
            loop {
                match response.chunk().await {
                    Ok(Some(chunk)) => {
                        if body_sink.receive(&chunk) == SinkControl::Abort {
                            break;
                        }
                        self.throttle(body_sink.size(), started).await;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        body_error = Some(e);
                        break;
                    }
                }
            }
        }
        drop(response);

        // Only now that the transfer is gone may buffer failures surface
        header_sink.check()?;
        body_sink.check()?;

        if let Some(e) = body_error {
            return Ok(FetchOutcome::Error(FetchErrorInfo::from_reqwest(
                &e,
                status_code,
                &header_sink,
                &body_sink,
            )));
        }

        Ok(FetchOutcome::Success(FetchSuccess {
            status_code,
            location,
            headers: header_sink.into_received(),
            body: body_sink.into_received(),
        }))
    }
}

impl Fetch for Fetcher {
    async fn fetch(&mut self, url: &str) -> Result<FetchOutcome> {
        self.fetch_url(url).await
    }
}
