//! Domain scheduler
//!
//! Fairness is per registrable domain: the domain whose last contact is
//! oldest goes next, and within it the URL whose last attempt is oldest.
//! The durable `last_contacted` bump is the only thing keeping two workers
//! off the same domain, so it is always written before any network I/O.

use crate::config::CrawlerConfig;
use crate::storage::{CrawlTarget, DomainRecord, DomainReservation, Storage};
use crate::{MonitorError, Result};
use chrono::Duration;

/// What the scheduler handed out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// The domain was bumped; crawl this URL now
    Target(CrawlTarget),
    /// Nothing to crawl at all
    Empty,
    /// The domain is still cooling down; nothing was written
    TooSoon(DomainRecord),
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    cooldown: Duration,
}

impl Scheduler {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(Duration::days(i64::from(config.cooldown_days)))
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Reserves the most overdue domain and its stalest URL
    pub fn reserve_next<S: Storage>(&self, storage: &mut S) -> Result<Reservation> {
        match storage.reserve_next_domain_target(self.cooldown)? {
            DomainReservation::Empty => {
                tracing::info!("No crawlable domains at all");
                Ok(Reservation::Empty)
            }
            DomainReservation::TooSoon(domain) => {
                tracing::info!(
                    "Most overdue domain {} is still cooling down",
                    domain.domain_name
                );
                Ok(Reservation::TooSoon(domain))
            }
            DomainReservation::Bumped(domain) => self.pick_in_domain(storage, &domain),
        }
    }

    /// Reserves one specific domain by name
    pub fn reserve_domain<S: Storage>(&self, storage: &mut S, domain_name: &str) -> Result<Reservation> {
        let domain = storage
            .get_domain(domain_name)?
            .ok_or_else(|| MonitorError::UnknownDomain(domain_name.to_string()))?;

        match self.lock_then_bump(storage, domain.id)? {
            DomainReservation::Bumped(domain) => self.pick_in_domain(storage, &domain),
            DomainReservation::TooSoon(domain) => {
                tracing::warn!(
                    "Domain {} was last contacted {}, too recently",
                    domain.domain_name,
                    format_last_contacted(&domain)
                );
                Ok(Reservation::TooSoon(domain))
            }
            DomainReservation::Empty => Ok(Reservation::Empty),
        }
    }

    /// Reserves one specific crawlable URL
    ///
    /// The URL's domain is locked and bumped like any other reservation, so
    /// crawling a single URL still honors the cooldown.
    pub fn reserve_url<S: Storage>(&self, storage: &mut S, url: &str) -> Result<Reservation> {
        let target = storage
            .get_crawl_target(url)?
            .ok_or_else(|| MonitorError::NotCrawlable(url.to_string()))?;

        match self.lock_then_bump(storage, target.domain_id)? {
            DomainReservation::Bumped(_) => Ok(Reservation::Target(target)),
            DomainReservation::TooSoon(domain) => {
                tracing::warn!(
                    "Domain {} of {} was last contacted {}, too recently",
                    domain.domain_name,
                    url,
                    format_last_contacted(&domain)
                );
                Ok(Reservation::TooSoon(domain))
            }
            DomainReservation::Empty => Ok(Reservation::Empty),
        }
    }

    /// Bumps the domain a redirect chain just crossed into
    ///
    /// Returns whether the bump happened. A domain that is still cooling down
    /// is contacted anyway; the chain only gets logged.
    pub fn bump_for_redirect<S: Storage>(&self, storage: &mut S, target: &CrawlTarget) -> Result<bool> {
        match self.lock_then_bump(storage, target.domain_id)? {
            DomainReservation::Bumped(_) => {
                tracing::debug!("Bumped {} for redirect to {}", target.domain_name, target.url);
                Ok(true)
            }
            DomainReservation::TooSoon(domain) => {
                tracing::warn!(
                    "Redirect crosses into {} which was last contacted {}, crawling anyway",
                    domain.domain_name,
                    format_last_contacted(&domain)
                );
                Ok(false)
            }
            DomainReservation::Empty => Ok(false),
        }
    }

    fn lock_then_bump<S: Storage>(&self, storage: &mut S, domain_id: i64) -> Result<DomainReservation> {
        Ok(storage.lock_then_bump_domain(domain_id, self.cooldown)?)
    }

    fn pick_in_domain<S: Storage>(&self, storage: &mut S, domain: &DomainRecord) -> Result<Reservation> {
        match storage.pick_stalest_crawlable_url(domain.id)? {
            Some(target) => {
                tracing::debug!("Reserved {} in {}", target.url, domain.domain_name);
                Ok(Reservation::Target(target))
            }
            None => {
                // Only reachable for explicitly named domains
                tracing::warn!("Domain {} has no crawlable URLs", domain.domain_name);
                Ok(Reservation::Empty)
            }
        }
    }
}

fn format_last_contacted(domain: &DomainRecord) -> String {
    domain
        .last_contacted
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string())
}
