use chrono::{DateTime, Duration, Utc};

/// Where a domain stands in its contact cycle
///
/// `Unvisited -> CoolingDown -> Eligible -> CoolingDown -> ...`
///
/// The state is derived from the stored `last_contacted` timestamp and the
/// cooldown cutoff; it is never stored itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainState {
    /// Never contacted
    Unvisited,

    /// Contacted at or after the cutoff; must not be contacted again yet
    CoolingDown { last_contacted: DateTime<Utc> },

    /// Contacted before the cutoff
    Eligible { last_contacted: DateTime<Utc> },
}

impl DomainState {
    /// Classifies a domain given its last contact and the current cutoff
    ///
    /// # Arguments
    ///
    /// * `last_contacted` - When the domain was last reserved, if ever
    /// * `cutoff` - `now - cooldown`, see [`crawl_cutoff`]
    pub fn classify(last_contacted: Option<DateTime<Utc>>, cutoff: DateTime<Utc>) -> Self {
        match last_contacted {
            None => Self::Unvisited,
            Some(last_contacted) if last_contacted >= cutoff => {
                Self::CoolingDown { last_contacted }
            }
            Some(last_contacted) => Self::Eligible { last_contacted },
        }
    }

    /// Returns true if the domain may be contacted now
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Unvisited | Self::Eligible { .. })
    }
}

/// Domains contacted before this instant are eligible again
pub fn crawl_cutoff(now: DateTime<Utc>, cooldown: Duration) -> DateTime<Utc> {
    now - cooldown
}
