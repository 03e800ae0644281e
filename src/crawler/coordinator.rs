//! Crawl coordinator
//!
//! Ties the scheduler, the redirect driver and a fetcher together for the
//! command-line modes: crawl one random target, one domain, one URL, or keep
//! going forever with a delay in between.

use crate::config::Config;
use crate::crawler::driver::{ChainReport, RedirectDriver};
use crate::crawler::fetcher::Fetch;
use crate::crawler::scheduler::{Reservation, Scheduler};
use crate::storage::Storage;
use crate::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Which target a crawl starts from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlMode {
    /// The most overdue domain
    Random,
    /// A named registrable domain
    Domain(String),
    /// One exact crawlable URL
    Url(String),
}

/// Result of a single crawl step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlStep {
    Crawled(ChainReport),
    /// Nothing eligible; the idle backoff was already slept where it applies
    Idle,
}

/// Why [`Coordinator::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    Finished,
    /// The stop file showed up
    Stopped,
}

pub struct Coordinator<S: Storage, F: Fetch> {
    storage: S,
    fetcher: F,
    scheduler: Scheduler,
    driver: RedirectDriver,
    idle_backoff: Duration,
    stop_file: Option<PathBuf>,
}

impl<S: Storage, F: Fetch> Coordinator<S, F> {
    pub fn new(config: &Config, storage: S, fetcher: F) -> Self {
        Self {
            storage,
            fetcher,
            scheduler: Scheduler::from_config(&config.crawler),
            driver: RedirectDriver::from_config(config),
            idle_backoff: Duration::from_secs(config.crawler.idle_backoff_secs),
            stop_file: config.crawler.stop_file.as_ref().map(PathBuf::from),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Reserves one target for `mode` and drives its redirect chain
    ///
    /// In random and domain mode an empty or cooling-down reservation sleeps
    /// the idle backoff. A single URL that is not due yet returns at once.
    pub async fn crawl_once(&mut self, mode: &CrawlMode) -> Result<CrawlStep> {
        let reservation = match mode {
            CrawlMode::Random => self.scheduler.reserve_next(&mut self.storage)?,
            CrawlMode::Domain(name) => self.scheduler.reserve_domain(&mut self.storage, name)?,
            CrawlMode::Url(url) => self.scheduler.reserve_url(&mut self.storage, url)?,
        };

        let target = match reservation {
            Reservation::Target(target) => target,
            Reservation::TooSoon(domain) if matches!(mode, CrawlMode::Url(_)) => {
                tracing::info!("Not crawling, {} was contacted too recently", domain.domain_name);
                return Ok(CrawlStep::Idle);
            }
            Reservation::Empty | Reservation::TooSoon(_) => {
                tracing::info!(
                    "Nothing to crawl, sleeping {}s",
                    self.idle_backoff.as_secs()
                );
                tokio::time::sleep(self.idle_backoff).await;
                return Ok(CrawlStep::Idle);
            }
        };

        tracing::info!("Crawling domain {}", target.domain_name);
        let report = self
            .driver
            .drive(&mut self.storage, &mut self.fetcher, &self.scheduler, target)
            .await?;
        Ok(CrawlStep::Crawled(report))
    }

    /// Crawls once, or forever when `next_delay` is set
    ///
    /// The stop file is checked before every step of the continuous loop.
    /// Internal failures end the loop.
    pub async fn run(&mut self, mode: CrawlMode, next_delay: Option<Duration>) -> Result<RunExit> {
        let Some(delay) = next_delay else {
            self.crawl_once(&mode).await?;
            return Ok(RunExit::Finished);
        };

        if matches!(mode, CrawlMode::Domain(_)) {
            tracing::warn!("Repeating a single domain only makes progress once per cooldown");
        }

        let mut steps: u64 = 0;
        loop {
            if self.stop_requested() {
                tracing::info!("Stop file found after {} steps, exiting", steps);
                return Ok(RunExit::Stopped);
            }

            self.crawl_once(&mode).await?;
            steps += 1;

            tracing::debug!("Sleeping {}s before the next crawl", delay.as_secs());
            tokio::time::sleep(delay).await;
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop_file
            .as_deref()
            .is_some_and(|path| path.exists())
    }
}
