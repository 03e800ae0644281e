//! Crawl attempt lifecycle
//!
//! A [`CrawlAttempt`] owns one Result row from before the first network byte
//! until its single outcome is written. Whatever way the attempt ends
//! (submit, error, panic, cancelled future) exactly one outcome is stored.

use crate::compress::compress_with_sentinel;
use crate::config::LimitsConfig;
use crate::crawler::discovery::Discovery;
use crate::crawler::fetcher::{FetchErrorInfo, FetchSuccess};
use crate::state::HopState;
use crate::storage::{NewSuccess, ResultHandle, Storage};
use crate::{MonitorError, Result};
use serde::Serialize;

/// Responses whose bodies are not worth keeping: redirects and the usual errors
pub const IGNORED_STATUS_CODES: [u16; 13] = [
    301, 302, 304, 307, 308, 400, 401, 402, 403, 404, 410, 500, 502,
];

/// Structured payload of a ResultError row
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorDescription<'a> {
    /// The transfer itself failed
    FetchError(&'a FetchErrorInfo),
    /// Something on our side failed during the attempt
    InternalError { error: String, debug: String },
    /// The attempt completed without recording an outcome
    MissingSubmit,
    /// The attempt was dropped mid-way
    Abandoned { panicking: bool },
}

impl ErrorDescription<'_> {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"unserializable","error":{:?}}}"#, e.to_string())
        })
    }
}

/// Whether a response body is stored at all
pub fn keeps_content(status_code: u16, body: &crate::crawler::sink::ReceivedBytes) -> bool {
    let empty = body.bytes.is_empty() && body.size == 0 && !body.truncated;
    !empty && !IGNORED_STATUS_CODES.contains(&status_code)
}

/// Scoped owner of one Result row
pub struct CrawlAttempt<'s, S: Storage> {
    storage: &'s mut S,
    handle: ResultHandle,
    url: String,
    headers_max_length: usize,
    content_max_length: usize,
    state: HopState,
    submitted: bool,
}

impl<'s, S: Storage> CrawlAttempt<'s, S> {
    /// Durably registers the attempt
    pub fn begin(storage: &'s mut S, url_id: i64, url: &str, limits: &LimitsConfig) -> Result<Self> {
        let handle = storage.create_result(url_id)?;
        tracing::debug!("Result {} registered for {}", handle.id, url);
        Ok(Self {
            storage,
            handle,
            url: url.to_string(),
            headers_max_length: limits.headers_max_length,
            content_max_length: limits.content_max_length,
            state: HopState::Fetching,
            submitted: false,
        })
    }

    pub fn handle(&self) -> ResultHandle {
        self.handle
    }

    pub fn state(&self) -> HopState {
        self.state
    }

    pub fn storage(&mut self) -> &mut S {
        &mut *self.storage
    }

    /// Stores a received response
    ///
    /// `redirect` is the discovery of the response's Location, if any; the
    /// hop continues when that target is crawlable.
    pub fn submit_success(
        &mut self,
        response: &FetchSuccess,
        redirect: Option<&Discovery>,
    ) -> Result<()> {
        debug_assert!(!self.submitted, "outcome submitted twice");

        let (headers, headers_orig_size) = compress_with_sentinel(
            &response.headers.bytes,
            response.headers.size,
            response.headers.truncated,
            self.headers_max_length,
        )?;
        let (content, content_orig_size) = compress_with_sentinel(
            &response.body.bytes,
            response.body.size,
            response.body.truncated,
            self.content_max_length,
        )?;
        let content = keeps_content(response.status_code, &response.body).then_some(content);

        self.storage.commit_success(
            &self.handle,
            &NewSuccess {
                status_code: response.status_code,
                headers: &headers,
                headers_orig_size,
                content: content.as_deref(),
                content_orig_size,
                next_url_id: redirect.map(|d| d.url_id),
            },
        )?;

        self.submitted = true;
        self.state = match redirect {
            Some(discovery) if discovery.is_crawlable() => HopState::SuccessContinue,
            _ => HopState::SuccessTerminal,
        };
        tracing::info!(
            "    HTTP {} for {}, content {}",
            response.status_code,
            self.url,
            if content.is_some() { "saved" } else { "skipped" }
        );
        Ok(())
    }

    /// Stores a failed transfer
    pub fn submit_error(&mut self, error: &FetchErrorInfo) -> Result<()> {
        debug_assert!(!self.submitted, "outcome submitted twice");

        let description = ErrorDescription::FetchError(error).to_json();
        self.storage
            .commit_error(&self.handle, false, &description)?;

        self.submitted = true;
        self.state = HopState::ErrorTerminal;
        tracing::info!("    fetch error for {}: {}", self.url, error.errstr);
        Ok(())
    }

    fn record_internal(&mut self, description: ErrorDescription<'_>) -> Result<()> {
        // Set first: whatever happens next, Drop must not try again
        self.submitted = true;
        self.state = HopState::ErrorTerminal;
        tracing::warn!(
            "Recording internal error for result {} ({})",
            self.handle.id,
            self.url
        );
        self.storage
            .commit_error(&self.handle, true, &description.to_json())?;
        Ok(())
    }

    /// Ends the attempt with the outcome of the work done inside it
    ///
    /// If nothing was submitted, an internal error is stored: the error
    /// itself, or "missing submit" for an `Ok`. The original error always
    /// propagates.
    pub fn close<T>(mut self, outcome: Result<T>) -> Result<T> {
        if self.submitted {
            return outcome;
        }

        match outcome {
            Ok(_) => {
                self.record_internal(ErrorDescription::MissingSubmit)?;
                Err(MonitorError::MissingSubmit {
                    url: self.url.clone(),
                })
            }
            Err(e) => {
                let description = ErrorDescription::InternalError {
                    error: e.to_string(),
                    debug: format!("{:?}", e),
                };
                if let Err(record_error) = self.record_internal(description) {
                    tracing::error!(
                        "Could not record internal error for {}: {}",
                        self.url,
                        record_error
                    );
                }
                Err(e)
            }
        }
    }
}

impl<S: Storage> Drop for CrawlAttempt<'_, S> {
    fn drop(&mut self) {
        if self.submitted {
            return;
        }
        let description = ErrorDescription::Abandoned {
            panicking: std::thread::panicking(),
        };
        if let Err(e) = self.record_internal(description) {
            tracing::error!("Could not record abandoned attempt for {}: {}", self.url, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::fetcher::FetchErrorKind;
    use crate::crawler::sink::ReceivedBytes;
    use crate::storage::{ErrorRecord, SqliteStorage};
    use std::io::Read;

    fn decompress(data: &[u8]) -> Vec<u8> {
        let mut output = Vec::new();
        brotli::Decompressor::new(data, 4096)
            .read_to_end(&mut output)
            .unwrap();
        output
    }

    fn setup() -> (SqliteStorage, i64) {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let url_id = storage.upsert_url("https://foo.com/").unwrap();
        (storage, url_id)
    }

    fn response(status_code: u16, body: &[u8], size: u64, truncated: bool) -> FetchSuccess {
        FetchSuccess {
            status_code,
            location: None,
            headers: ReceivedBytes {
                bytes: b"HTTP/1.1 200 OK\r\n\r\n".to_vec(),
                size: 19,
                truncated: false,
            },
            body: ReceivedBytes {
                bytes: body.to_vec(),
                size,
                truncated,
            },
        }
    }

    fn stored_error(storage: &SqliteStorage, result_id: i64) -> (ErrorRecord, serde_json::Value) {
        let error = storage.get_error(result_id).unwrap().unwrap();
        let json = serde_json::from_str(&error.description_json).unwrap();
        (error, json)
    }

    #[test]
    fn test_keeps_content() {
        let empty = ReceivedBytes::default();
        let body = ReceivedBytes {
            bytes: b"x".to_vec(),
            size: 1,
            truncated: false,
        };
        assert!(!keeps_content(200, &empty));
        assert!(keeps_content(200, &body));
        assert!(!keeps_content(404, &body));
        assert!(!keeps_content(301, &body));
        assert!(keeps_content(503, &body));

        // Truncated before anything arrived still counts as something
        let cut = ReceivedBytes {
            bytes: Vec::new(),
            size: 0,
            truncated: true,
        };
        assert!(keeps_content(200, &cut));
    }

    #[test]
    fn test_success_with_exact_size() {
        let (mut storage, url_id) = setup();
        let body = vec![b'x'; 32];
        let limits = LimitsConfig::default();

        let mut attempt = CrawlAttempt::begin(&mut storage, url_id, "https://foo.com/", &limits).unwrap();
        let result_id = attempt.handle().id;
        attempt
            .submit_success(&response(200, &body, 32, false), None)
            .unwrap();
        assert_eq!(attempt.state(), HopState::SuccessTerminal);
        attempt.close(Ok(())).unwrap();

        let success = storage.get_success(result_id).unwrap().unwrap();
        assert_eq!(success.content_orig_size, 32);
        assert_eq!(decompress(&success.content.unwrap()), body);
        assert_eq!(success.headers_orig_size, 19);
        assert!(storage.get_error(result_id).unwrap().is_none());
        assert!(storage.get_result(result_id).unwrap().unwrap().crawl_end.is_some());
    }

    #[test]
    fn test_success_with_truncated_body() {
        let (mut storage, url_id) = setup();
        let limits = LimitsConfig::default();

        let mut attempt = CrawlAttempt::begin(&mut storage, url_id, "https://foo.com/", &limits).unwrap();
        let result_id = attempt.handle().id;
        attempt
            .submit_success(&response(200, &[b'y'; 500], 999, true), None)
            .unwrap();
        attempt.close(Ok(())).unwrap();

        let success = storage.get_success(result_id).unwrap().unwrap();
        assert_eq!(success.content_orig_size, -999);
        assert!(success.content.is_some());
    }

    #[test]
    fn test_ignored_status_drops_content() {
        let (mut storage, url_id) = setup();
        let limits = LimitsConfig::default();

        let mut attempt = CrawlAttempt::begin(&mut storage, url_id, "https://foo.com/", &limits).unwrap();
        let result_id = attempt.handle().id;
        attempt
            .submit_success(&response(404, b"not found", 9, false), None)
            .unwrap();
        attempt.close(Ok(())).unwrap();

        let success = storage.get_success(result_id).unwrap().unwrap();
        assert_eq!(success.status_code, 404);
        assert_eq!(success.content, None);
        assert_eq!(success.content_orig_size, 9);
    }

    #[test]
    fn test_fetch_error_is_not_internal() {
        let (mut storage, url_id) = setup();
        let limits = LimitsConfig::default();
        let info = FetchErrorInfo {
            errcode: FetchErrorKind::Connect.code(),
            kind: FetchErrorKind::Connect,
            errstr: "connection refused".to_string(),
            response_code: 0,
            header_size_recv: 0,
            body_size_recv: 0,
        };

        let mut attempt = CrawlAttempt::begin(&mut storage, url_id, "https://foo.com/", &limits).unwrap();
        let result_id = attempt.handle().id;
        attempt.submit_error(&info).unwrap();
        assert_eq!(attempt.state(), HopState::ErrorTerminal);
        attempt.close(Ok(())).unwrap();

        let (error, json) = stored_error(&storage, result_id);
        assert!(!error.is_internal_error);
        assert_eq!(json["type"], "fetch_error");
        assert_eq!(json["kind"], "connect");
        assert_eq!(json["errstr"], "connection refused");
    }

    #[test]
    fn test_missing_submit_is_recorded() {
        let (mut storage, url_id) = setup();
        let limits = LimitsConfig::default();

        let attempt = CrawlAttempt::begin(&mut storage, url_id, "https://foo.com/", &limits).unwrap();
        let result_id = attempt.handle().id;
        let outcome = attempt.close(Ok(42));
        assert!(matches!(outcome, Err(MonitorError::MissingSubmit { .. })));

        let (error, json) = stored_error(&storage, result_id);
        assert!(error.is_internal_error);
        assert_eq!(json["type"], "missing_submit");
        assert!(storage.get_result(result_id).unwrap().unwrap().crawl_end.is_some());
    }

    #[test]
    fn test_error_is_recorded_and_propagated() {
        let (mut storage, url_id) = setup();
        let limits = LimitsConfig::default();

        let attempt = CrawlAttempt::begin(&mut storage, url_id, "https://foo.com/", &limits).unwrap();
        let result_id = attempt.handle().id;
        let outcome: Result<()> = attempt.close(Err(MonitorError::Sink("boom".to_string())));
        assert!(matches!(outcome, Err(MonitorError::Sink(_))));

        let (error, json) = stored_error(&storage, result_id);
        assert!(error.is_internal_error);
        assert_eq!(json["type"], "internal_error");
        assert!(json["error"].as_str().unwrap().contains("boom"));
    }

    #[test]
    fn test_error_after_submit_is_only_propagated() {
        let (mut storage, url_id) = setup();
        let limits = LimitsConfig::default();

        let mut attempt = CrawlAttempt::begin(&mut storage, url_id, "https://foo.com/", &limits).unwrap();
        let result_id = attempt.handle().id;
        attempt
            .submit_success(&response(200, b"ok", 2, false), None)
            .unwrap();
        let outcome: Result<()> = attempt.close(Err(MonitorError::Sink("late".to_string())));
        assert!(outcome.is_err());

        assert!(storage.get_success(result_id).unwrap().is_some());
        assert!(storage.get_error(result_id).unwrap().is_none());
    }

    #[test]
    fn test_dropped_attempt_is_recorded() {
        let (mut storage, url_id) = setup();
        let limits = LimitsConfig::default();

        let result_id = {
            let attempt = CrawlAttempt::begin(&mut storage, url_id, "https://foo.com/", &limits).unwrap();
            attempt.handle().id
        };

        let (error, json) = stored_error(&storage, result_id);
        assert!(error.is_internal_error);
        assert_eq!(json["type"], "abandoned");
        assert_eq!(json["panicking"], false);
        assert_eq!(storage.count_unfinished_results().unwrap(), 0);
    }

    #[test]
    fn test_panic_inside_attempt_is_recorded() {
        let (mut storage, url_id) = setup();
        let limits = LimitsConfig::default();

        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _attempt =
                CrawlAttempt::begin(&mut storage, url_id, "https://foo.com/", &limits).unwrap();
            panic!("exploded mid-crawl");
        }));
        assert!(caught.is_err());

        let results = storage.get_results_for_url(url_id).unwrap();
        assert_eq!(results.len(), 1);
        let (error, json) = stored_error(&storage, results[0].id);
        assert!(error.is_internal_error);
        assert_eq!(json["panicking"], true);
        assert!(results[0].crawl_end.is_some());
    }
}
