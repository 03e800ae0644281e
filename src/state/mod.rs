//! State module for domains and redirect hops
//!
//! # Components
//!
//! - `DomainState`: where a domain stands in its cooldown cycle
//! - `HopState`: the outcome of one hop of a redirect chain

mod domain_state;
mod hop_state;

// Re-export main types
pub use domain_state::{crawl_cutoff, DomainState};
pub use hop_state::HopState;
