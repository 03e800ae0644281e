//! Redirect chain driver
//!
//! Follows one crawl target through at most `max_depth` hops. Every hop is a
//! [`CrawlAttempt`]: its Result row exists before the request goes out and
//! it ends with exactly one outcome.

use crate::config::{Config, LimitsConfig};
use crate::crawler::attempt::CrawlAttempt;
use crate::crawler::discovery::{discover_url, DiscoverOptions, Discovery};
use crate::crawler::fetcher::{Fetch, FetchOutcome};
use crate::crawler::scheduler::Scheduler;
use crate::state::HopState;
use crate::storage::{CrawlTarget, Storage};
use crate::url::InterestFilter;
use crate::Result;
use std::time::Duration;

/// One fetched hop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopRecord {
    pub result_id: i64,
    pub url: String,
    pub state: HopState,
}

/// Everything a chain produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainReport {
    pub hops: Vec<HopRecord>,
    /// The hop limit was hit while a redirect was still pending
    pub chain_too_long: bool,
}

impl ChainReport {
    pub fn last_state(&self) -> Option<HopState> {
        self.hops.last().map(|hop| hop.state)
    }
}

pub struct RedirectDriver {
    max_depth: u32,
    redirect_delay: Duration,
    limits: LimitsConfig,
    filter: InterestFilter,
}

impl RedirectDriver {
    pub fn new(
        max_depth: u32,
        redirect_delay: Duration,
        limits: LimitsConfig,
        filter: InterestFilter,
    ) -> Self {
        Self {
            max_depth,
            redirect_delay,
            limits,
            filter,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.crawler.max_redirect_depth,
            Duration::from_millis(config.crawler.redirect_delay_ms),
            config.limits.clone(),
            InterestFilter::from_config(&config.filter),
        )
    }

    /// Crawls `start` and whatever crawlable redirects follow it
    ///
    /// `start` must already be reserved. Crossing into another domain
    /// bumps that domain before it is contacted. Internal failures are
    /// recorded on the hop they happened in and then returned.
    pub async fn drive<S, F>(
        &self,
        storage: &mut S,
        fetcher: &mut F,
        scheduler: &Scheduler,
        start: CrawlTarget,
    ) -> Result<ChainReport>
    where
        S: Storage,
        F: Fetch,
    {
        let mut report = ChainReport::default();
        let mut current = start;
        let mut previous_result: Option<i64> = None;

        for depth in 0..self.max_depth {
            tracing::info!("Crawling {} (hop {})", current.url, depth + 1);

            let mut attempt =
                CrawlAttempt::begin(storage, current.url_id, &current.url, &self.limits)?;
            let result_id = attempt.handle().id;
            let outcome = self.run_hop(&mut attempt, fetcher, &current.url, previous_result).await;
            let state = attempt.state();
            let redirect = attempt.close(outcome)?;

            report.hops.push(HopRecord {
                result_id,
                url: current.url.clone(),
                state,
            });

            let next = match (state, redirect) {
                (HopState::SuccessContinue, Some(Discovery { target: Some(next), .. })) => next,
                _ => return Ok(report),
            };

            if depth + 1 == self.max_depth {
                break;
            }

            if next.domain_id != current.domain_id {
                tracing::info!(
                    "    redirect leaves {} for {}",
                    current.domain_name,
                    next.domain_name
                );
                scheduler.bump_for_redirect(storage, &next)?;
                tokio::time::sleep(self.redirect_delay).await;
            }
            tokio::time::sleep(self.redirect_delay).await;

            previous_result = Some(result_id);
            current = next;
        }

        tracing::warn!(
            "Redirect chain is too long, stopped after {} hops at {}",
            report.hops.len(),
            current.url
        );
        report.chain_too_long = true;
        Ok(report)
    }

    /// Fetches one URL and submits the outcome; returns the discovered
    /// redirect, if any
    async fn run_hop<S, F>(
        &self,
        attempt: &mut CrawlAttempt<'_, S>,
        fetcher: &mut F,
        url: &str,
        previous_result: Option<i64>,
    ) -> Result<Option<Discovery>>
    where
        S: Storage,
        F: Fetch,
    {
        if let Some(previous) = previous_result {
            let next = attempt.handle().id;
            attempt.storage().link_next_request(previous, next)?;
        }

        match fetcher.fetch(url).await? {
            FetchOutcome::Success(response) => {
                let redirect = match response.location.as_deref() {
                    Some(location) => {
                        let discovery = discover_url(
                            attempt.storage(),
                            location,
                            DiscoverOptions::redirect(),
                            &self.filter,
                        )?;
                        tracing::info!(
                            "    redirects to {}{}",
                            discovery.url,
                            if discovery.is_crawlable() { "" } else { " (not following)" }
                        );
                        Some(discovery)
                    }
                    None => None,
                };
                attempt.submit_success(&response, redirect.as_ref())?;
                Ok(redirect)
            }
            FetchOutcome::Error(error) => {
                attempt.submit_error(&error)?;
                Ok(None)
            }
        }
    }
}
