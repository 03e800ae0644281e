//! End-to-end crawl tests
//!
//! Canonical URLs never carry an IP address or a custom port, so requests
//! are routed to the mock server by host name: `https://foo.com/a` is served
//! from `<mock>/foo.com/a`. Everything else is the production path.

use domain_monitor::config::{
    Config, CrawlerConfig, FetcherConfig, FilterConfig, LimitsConfig, OutputConfig,
    UserAgentConfig,
};
use domain_monitor::crawler::{
    discover_url, ChainReport, Coordinator, CrawlMode, CrawlStep, DiscoverOptions, Fetch,
    FetchLimits, FetchOutcome, Fetcher, Reservation, Scheduler,
};
use domain_monitor::storage::{SqliteStorage, Storage};
use domain_monitor::url::InterestFilter;
use domain_monitor::HopState;
use std::io::Read;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Routes every request to the mock server, keyed by host name
struct MockBackedFetcher {
    inner: Fetcher,
    base: String,
}

impl Fetch for MockBackedFetcher {
    async fn fetch(&mut self, url: &str) -> domain_monitor::Result<FetchOutcome> {
        let parsed = url::Url::parse(url).expect("Driver handed out an invalid URL");
        let mut routed = format!(
            "{}/{}{}",
            self.base,
            parsed.host_str().expect("URL without host"),
            parsed.path()
        );
        if let Some(query) = parsed.query() {
            routed.push('?');
            routed.push_str(query);
        }
        self.inner.fetch_url(&routed).await
    }
}

/// Creates a test configuration backed by a database in `dir`
fn create_test_config(dir: &TempDir, limits: LimitsConfig) -> Config {
    Config {
        crawler: CrawlerConfig {
            redirect_delay_ms: 0,
            idle_backoff_secs: 0,
            ..CrawlerConfig::default()
        },
        fetcher: FetcherConfig {
            timeout_ms: 5_000,
            ..FetcherConfig::default()
        },
        limits,
        user_agent: UserAgentConfig {
            crawler_name: "TestMonitor".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            database_path: dir.path().join("monitor.db").to_string_lossy().into_owned(),
        },
        filter: FilterConfig::default(),
    }
}

fn create_coordinator(
    config: &Config,
    base: String,
    seeds: &[&str],
) -> Coordinator<SqliteStorage, MockBackedFetcher> {
    let mut storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .expect("Failed to open DB");
    let filter = InterestFilter::from_config(&config.filter);
    for seed in seeds {
        let discovery = discover_url(&mut storage, seed, DiscoverOptions::import(true), &filter)
            .expect("Failed to seed");
        assert!(discovery.is_crawlable(), "{} should be crawlable", seed);
    }

    let fetcher = MockBackedFetcher {
        inner: Fetcher::with_parts(
            config.fetcher.clone(),
            config.user_agent.header_value(),
            FetchLimits::from_config(&config.limits),
        )
        .expect("Failed to build fetcher"),
        base,
    };
    Coordinator::new(config, storage, fetcher)
}

fn expect_crawled(step: CrawlStep) -> ChainReport {
    match step {
        CrawlStep::Crawled(report) => report,
        CrawlStep::Idle => panic!("Expected a crawl"),
    }
}

fn decompress(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::new();
    brotli::Decompressor::new(data, 4096)
        .read_to_end(&mut output)
        .expect("Stored data is not valid brotli");
    output
}

#[tokio::test]
async fn test_redirect_chain_end_to_end() {
    let mock_server = MockServer::start().await;
    let body = "0123456789abcdefghijklmnopqrstuv";
    assert_eq!(body.len(), 32);

    Mock::given(method("GET"))
        .and(path("/foo.com/"))
        .respond_with(
            ResponseTemplate::new(301)
                .insert_header("location", "https://www.foo.com/landing")
                .set_body_string("moved"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/www.foo.com/landing"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, LimitsConfig::default());
    let mut coordinator = create_coordinator(&config, mock_server.uri(), &["https://foo.com"]);

    let report = expect_crawled(coordinator.crawl_once(&CrawlMode::Random).await.unwrap());
    let states: Vec<HopState> = report.hops.iter().map(|h| h.state).collect();
    assert_eq!(states, vec![HopState::SuccessContinue, HopState::SuccessTerminal]);
    assert!(!report.chain_too_long);

    // Read back through an independent connection
    let storage = SqliteStorage::new(Path::new(&config.output.database_path)).unwrap();
    assert_eq!(storage.count_unfinished_results().unwrap(), 0);

    let first = storage.get_success(report.hops[0].result_id).unwrap().unwrap();
    assert_eq!(first.status_code, 301);
    assert_eq!(first.content, None);
    assert_eq!(first.content_orig_size, 5);
    assert_eq!(first.next_request_id, Some(report.hops[1].result_id));
    assert_eq!(
        first.next_url_id,
        storage.get_url_id("https://www.foo.com/landing").unwrap()
    );

    let second = storage.get_success(report.hops[1].result_id).unwrap().unwrap();
    assert_eq!(second.status_code, 200);
    assert_eq!(second.content_orig_size, 32);
    assert_eq!(decompress(&second.content.unwrap()), body.as_bytes());
    assert!(second.headers_orig_size > 0);
    assert!(String::from_utf8(decompress(&second.headers))
        .unwrap()
        .starts_with("HTTP/1.1 200 OK\r\n"));

    let domain = storage.get_domain("foo.com").unwrap().unwrap();
    assert!(domain.last_contacted.is_some());
}

#[tokio::test]
async fn test_truncated_body_is_stored_with_negative_size() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/big.example.org/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'z'; 50_000]))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let limits = LimitsConfig {
        headers_max_length: 1024,
        content_max_length: 64,
    };
    let config = create_test_config(&dir, limits);
    let mut coordinator = create_coordinator(&config, mock_server.uri(), &["https://big.example.org/"]);

    let report = expect_crawled(coordinator.crawl_once(&CrawlMode::Random).await.unwrap());
    assert_eq!(report.last_state(), Some(HopState::SuccessTerminal));

    let success = coordinator
        .storage()
        .get_success(report.hops[0].result_id)
        .unwrap()
        .unwrap();
    // Stopped after more than 100 times the budget
    assert!(success.content_orig_size < -6400);
    assert!(success.content_orig_size >= -50_000);
    let content = success.content.unwrap();
    assert!(content.len() <= 64);
    let prefix = decompress(&content);
    assert!(!prefix.is_empty());
    assert!(prefix.iter().all(|b| *b == b'z'));
}

#[tokio::test]
async fn test_unreachable_server_records_fetch_error() {
    // Bind and drop to get a port nobody listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, LimitsConfig::default());
    let mut coordinator = create_coordinator(
        &config,
        format!("http://127.0.0.1:{}", port),
        &["https://down.example.net/"],
    );

    let report = expect_crawled(coordinator.crawl_once(&CrawlMode::Random).await.unwrap());
    assert_eq!(report.last_state(), Some(HopState::ErrorTerminal));

    let error = coordinator
        .storage()
        .get_error(report.hops[0].result_id)
        .unwrap()
        .unwrap();
    assert!(!error.is_internal_error);
    let description: serde_json::Value = serde_json::from_str(&error.description_json).unwrap();
    assert_eq!(description["type"], "fetch_error");
    assert_eq!(description["kind"], "connect");
}

#[tokio::test]
async fn test_every_domain_once_per_cooldown() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("fine"))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, LimitsConfig::default());
    let mut coordinator = create_coordinator(
        &config,
        mock_server.uri(),
        &[
            "https://a.example.com/1",
            "https://b.example.com/2",
            "https://other.org/",
        ],
    );

    // example.com has two URLs but only gets one contact
    let mut crawled = Vec::new();
    for _ in 0..3 {
        if let CrawlStep::Crawled(report) = coordinator.crawl_once(&CrawlMode::Random).await.unwrap() {
            crawled.push(report.hops[0].url.clone());
        }
    }

    assert_eq!(crawled.len(), 2);
    assert!(crawled.contains(&"https://other.org/".to_string()));
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 2);
}

#[test]
fn test_reservation_is_exclusive_across_connections() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("shared.db");

    let mut worker_a = SqliteStorage::new(&db_path).unwrap();
    let mut worker_b = SqliteStorage::new(&db_path).unwrap();
    discover_url(
        &mut worker_a,
        "https://shared.com/",
        DiscoverOptions::import(true),
        &InterestFilter::default(),
    )
    .unwrap();

    let scheduler = Scheduler::from_config(&CrawlerConfig::default());
    assert!(matches!(
        scheduler.reserve_next(&mut worker_a).unwrap(),
        Reservation::Target(_)
    ));
    assert!(matches!(
        scheduler.reserve_next(&mut worker_b).unwrap(),
        Reservation::TooSoon(_)
    ));
    assert!(matches!(
        scheduler.reserve_url(&mut worker_b, "https://shared.com/").unwrap(),
        Reservation::TooSoon(_)
    ));
}
