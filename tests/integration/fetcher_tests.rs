//! Integration tests for the fetch executor
//!
//! These run the real HTTP client against a local mock server.

use domain_monitor::config::FetcherConfig;
use domain_monitor::crawler::{FetchErrorKind, FetchLimits, FetchOutcome, FetchSuccess, Fetcher};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER_AGENT: &str = "TestMonitor/1.0 (contact: test@example.com)";

fn create_fetcher(limits: FetchLimits) -> Fetcher {
    Fetcher::with_parts(FetcherConfig::default(), USER_AGENT.to_string(), limits)
        .expect("Failed to build fetcher")
}

fn expect_success(outcome: FetchOutcome) -> FetchSuccess {
    match outcome {
        FetchOutcome::Success(success) => success,
        FetchOutcome::Error(error) => panic!("Expected success, got {:?}", error),
    }
}

#[tokio::test]
async fn test_fetch_plain_page() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("user-agent", USER_AGENT))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>alive</body></html>")
                .insert_header("content-type", "text/html"),
        )
        .mount(&mock_server)
        .await;

    let mut fetcher = create_fetcher(FetchLimits::default());
    let response = expect_success(
        fetcher
            .fetch_url(&format!("{}/", mock_server.uri()))
            .await
            .expect("Fetch failed"),
    );

    assert_eq!(response.status_code, 200);
    assert_eq!(response.location, None);
    assert_eq!(response.body.bytes, b"<html><body>alive</body></html>".to_vec());
    assert_eq!(response.body.size, 31);
    assert!(!response.body.truncated);

    let head = String::from_utf8(response.headers.bytes.clone()).unwrap();
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "head was {:?}", head);
    assert!(head.contains("content-type: text/html\r\n"));
    assert!(head.ends_with("\r\n\r\n"));
    assert_eq!(response.headers.size, head.len() as u64);
}

#[tokio::test]
async fn test_encoded_body_is_kept_as_sent() {
    let mock_server = MockServer::start().await;
    // gzip magic followed by bytes that do not inflate
    let encoded: Vec<u8> = vec![0x1f, 0x8b, 0x08, 0x00, 0xde, 0xad, 0xbe, 0xef];

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-encoding", "gzip")
                .set_body_bytes(encoded.clone()),
        )
        .mount(&mock_server)
        .await;

    let mut fetcher = create_fetcher(FetchLimits::default());
    let response = expect_success(fetcher.fetch_url(&mock_server.uri()).await.unwrap());

    let head = String::from_utf8(response.headers.bytes.clone()).unwrap();
    assert!(head.contains("content-encoding: gzip\r\n"), "head was {:?}", head);
    assert!(head.contains("content-length: 8\r\n"), "head was {:?}", head);
    assert_eq!(response.body.bytes, encoded);
    assert_eq!(response.body.size, 8);
}

#[tokio::test]
async fn test_error_status_is_still_a_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410).set_body_string("gone"))
        .mount(&mock_server)
        .await;

    let mut fetcher = create_fetcher(FetchLimits::default());
    let response = expect_success(
        fetcher
            .fetch_url(&format!("{}/gone", mock_server.uri()))
            .await
            .expect("Fetch failed"),
    );

    assert_eq!(response.status_code, 410);
    assert_eq!(response.body.bytes, b"gone".to_vec());
}

#[tokio::test]
async fn test_relative_location_is_resolved_and_not_followed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/old/page"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "../new?x=1"))
        .expect(1)
        .mount(&mock_server)
        .await;

    // Must never be requested
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut fetcher = create_fetcher(FetchLimits::default());
    let response = expect_success(
        fetcher
            .fetch_url(&format!("{}/old/page", mock_server.uri()))
            .await
            .expect("Fetch failed"),
    );

    assert_eq!(response.status_code, 302);
    assert_eq!(
        response.location,
        Some(format!("{}/new?x=1", mock_server.uri()))
    );
}

#[tokio::test]
async fn test_location_ignored_without_redirect_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).insert_header("location", "/elsewhere"))
        .mount(&mock_server)
        .await;

    let mut fetcher = create_fetcher(FetchLimits::default());
    let response = expect_success(fetcher.fetch_url(&mock_server.uri()).await.unwrap());

    assert_eq!(response.location, None);
}

#[tokio::test]
async fn test_oversized_body_is_truncated() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 10_000]))
        .mount(&mock_server)
        .await;

    let limits = FetchLimits {
        header_save: 1024,
        header_stop: 100_000,
        body_save: 16,
        body_stop: 100,
    };
    let mut fetcher = create_fetcher(limits);
    let response = expect_success(fetcher.fetch_url(&mock_server.uri()).await.unwrap());

    assert_eq!(response.status_code, 200);
    assert!(response.body.truncated);
    assert!(response.body.size > 100);
    assert!(response.body.size <= 10_000);
    assert!(response.body.bytes.len() >= 16);
    assert!(!response.headers.truncated);
}

#[tokio::test]
async fn test_oversized_header_skips_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-padding", "p".repeat(200).as_str())
                .set_body_string("body"),
        )
        .mount(&mock_server)
        .await;

    let limits = FetchLimits {
        header_save: 16,
        header_stop: 64,
        body_save: 1024,
        body_stop: 100_000,
    };
    let mut fetcher = create_fetcher(limits);
    let response = expect_success(fetcher.fetch_url(&mock_server.uri()).await.unwrap());

    assert!(response.headers.truncated);
    assert!(response.headers.size > 64);
    assert_eq!(response.body.size, 0);
    assert!(response.body.bytes.is_empty());
}

#[tokio::test]
async fn test_connection_refused_is_an_error_outcome() {
    // Bind and drop to get a port nobody listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut fetcher = create_fetcher(FetchLimits::default());
    let outcome = fetcher
        .fetch_url(&format!("http://127.0.0.1:{}/", port))
        .await
        .expect("Network failures must not be internal errors");

    match outcome {
        FetchOutcome::Error(error) => {
            assert_eq!(error.kind, FetchErrorKind::Connect);
            assert_eq!(error.errcode, FetchErrorKind::Connect.code());
            assert_eq!(error.response_code, 0);
            assert_eq!(error.header_size_recv, 0);
            assert!(!error.errstr.is_empty());
        }
        FetchOutcome::Success(success) => panic!("Expected an error, got {:?}", success),
    }
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let config = FetcherConfig {
        timeout_ms: 200,
        ..FetcherConfig::default()
    };
    let mut fetcher = Fetcher::with_parts(config, USER_AGENT.to_string(), FetchLimits::default())
        .expect("Failed to build fetcher");
    let outcome = fetcher.fetch_url(&mock_server.uri()).await.unwrap();

    match outcome {
        FetchOutcome::Error(error) => assert_eq!(error.kind, FetchErrorKind::Timeout),
        FetchOutcome::Success(success) => panic!("Expected a timeout, got {:?}", success),
    }
}
