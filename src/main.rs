//! Domain Monitor main entry point
//!
//! This is the command-line interface for the domain liveness crawler.

use anyhow::Context;
use clap::{ArgGroup, Parser};
use domain_monitor::compress::compress_with_sentinel;
use domain_monitor::config::{load_config_with_hash, Config};
use domain_monitor::crawler::{
    discover_raw_value, keeps_content, Coordinator, CrawlMode, DiscoverOptions, FetchOutcome,
    Fetcher, RunExit,
};
use domain_monitor::storage::open_storage;
use domain_monitor::url::{assess_url, InterestFilter, UrlAssessment};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Domain Monitor: a polite liveness crawler
///
/// Contacts every known second-level domain at most once per cooldown
/// window and records exactly one outcome for every request it makes.
#[derive(Parser, Debug)]
#[command(name = "domain-monitor")]
#[command(version)]
#[command(about = "A polite domain liveness crawler", long_about = None)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["random_url", "domain", "url", "discover", "probe"]),
))]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Crawl the most overdue domain
    #[arg(long)]
    random_url: bool,

    /// Crawl the stalest URL of one registrable domain
    #[arg(long, value_name = "NAME")]
    domain: Option<String>,

    /// Crawl one URL that is already marked crawlable
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    /// Register raw values (possibly several URLs each) and exit
    #[arg(long, value_name = "RAW", num_args = 1..)]
    discover: Vec<String>,

    /// Mark discovered URLs as crawlable
    #[arg(long, requires = "discover")]
    crawlable: bool,

    /// Fetch one URL without touching the database and show what would be stored
    #[arg(long, value_name = "URL")]
    probe: Option<String>,

    /// Keep crawling forever, sleeping this long between attempts
    #[arg(
        long,
        value_name = "SECONDS",
        conflicts_with_all = ["url", "discover", "probe"]
    )]
    next_delay_seconds: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    tracing::debug!("Configuration hash: {}", hash);

    if let Some(url) = &cli.probe {
        return handle_probe(&config, url).await;
    }
    if !cli.discover.is_empty() {
        return handle_discover(&config, &cli.discover, cli.crawlable);
    }

    let mode = if let Some(domain) = cli.domain {
        CrawlMode::Domain(domain)
    } else if let Some(url) = cli.url {
        CrawlMode::Url(url)
    } else {
        CrawlMode::Random
    };
    let next_delay = cli.next_delay_seconds.map(Duration::from_secs);

    match handle_crawl(&config, mode, next_delay).await? {
        RunExit::Finished => Ok(()),
        RunExit::Stopped => std::process::exit(2),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG` wins over the command-line flags when set.
fn setup_logging(verbose: u8, quiet: bool) {
    let fallback = if quiet {
        "error"
    } else {
        match verbose {
            0 => "domain_monitor=info,warn",
            1 => "domain_monitor=debug,info",
            2 => "domain_monitor=trace,debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the crawl modes
async fn handle_crawl(
    config: &Config,
    mode: CrawlMode,
    next_delay: Option<Duration>,
) -> anyhow::Result<RunExit> {
    let storage = open_storage(Path::new(&config.output.database_path))
        .with_context(|| format!("opening {}", config.output.database_path))?;
    let fetcher = Fetcher::new(config).context("building HTTP client")?;

    tracing::info!(
        "Cooldown {} days, at most {} hops per chain",
        config.crawler.cooldown_days,
        config.crawler.max_redirect_depth
    );

    let mut coordinator = Coordinator::new(config, storage, fetcher);
    match coordinator.run(mode, next_delay).await {
        Ok(exit) => Ok(exit),
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

/// Handles --discover: registers every URL found in the raw values
fn handle_discover(config: &Config, raw_values: &[String], crawlable: bool) -> anyhow::Result<()> {
    let mut storage = open_storage(Path::new(&config.output.database_path))
        .with_context(|| format!("opening {}", config.output.database_path))?;
    let filter = InterestFilter::from_config(&config.filter);

    for raw in raw_values {
        let discoveries =
            discover_raw_value(&mut storage, raw, DiscoverOptions::import(crawlable), &filter)?;
        if discoveries.is_empty() {
            println!("{:?}: no URLs", raw);
        }
        for discovery in discoveries {
            match (&discovery.rejection, &discovery.target) {
                (Some(reason), _) => println!("{} rejected: {}", discovery.url, reason),
                (None, Some(target)) if crawlable => {
                    println!("{} crawlable (domain {})", discovery.url, target.domain_name)
                }
                (None, Some(target)) => {
                    println!("{} valid (domain {})", discovery.url, target.domain_name)
                }
                (None, None) => println!("{} uninteresting", discovery.url),
            }
        }
    }

    Ok(())
}

/// Handles --probe: one request, nothing written
async fn handle_probe(config: &Config, url: &str) -> anyhow::Result<()> {
    let filter = InterestFilter::from_config(&config.filter);
    let url = match assess_url(url, &filter) {
        UrlAssessment::Rejected { url, reason } => {
            anyhow::bail!("{} is rejected: {}", url, reason)
        }
        UrlAssessment::Uninteresting { url, .. } => {
            println!("Note: {} would never be scheduled", url);
            url.into_string()
        }
        UrlAssessment::Crawlable { url, .. } => url.into_string(),
    };

    let mut fetcher = Fetcher::new(config).context("building HTTP client")?;
    println!("Fetching {}", url);

    match fetcher.fetch_url(&url).await? {
        FetchOutcome::Success(response) => {
            let limits = &config.limits;
            let (headers, headers_orig_size) = compress_with_sentinel(
                &response.headers.bytes,
                response.headers.size,
                response.headers.truncated,
                limits.headers_max_length,
            )?;
            let (content, content_orig_size) = compress_with_sentinel(
                &response.body.bytes,
                response.body.size,
                response.body.truncated,
                limits.content_max_length,
            )?;

            println!("Status: {}", response.status_code);
            if let Some(location) = &response.location {
                let follow = assess_url(location, &filter).is_crawlable();
                println!(
                    "Location: {} ({})",
                    location,
                    if follow { "would follow" } else { "would stop" }
                );
            }
            println!(
                "Headers: {} bytes kept as {} compressed, orig size {}",
                response.headers.bytes.len(),
                headers.len(),
                headers_orig_size
            );
            if keeps_content(response.status_code, &response.body) {
                println!(
                    "Content: {} bytes kept as {} compressed, orig size {}",
                    response.body.bytes.len(),
                    content.len(),
                    content_orig_size
                );
            } else {
                println!("Content: not stored, orig size {}", content_orig_size);
            }
            println!();
            println!("{}", String::from_utf8_lossy(&response.headers.bytes));
        }
        FetchOutcome::Error(error) => {
            println!("Error {} ({:?}): {}", error.errcode, error.kind, error.errstr);
            println!(
                "Received {} header and {} body bytes, last status {}",
                error.header_size_recv, error.body_size_recv, error.response_code
            );
        }
    }

    Ok(())
}
