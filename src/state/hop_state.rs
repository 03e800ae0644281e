/// Hop state definitions for a redirect chain
use std::fmt;

/// The state of one hop of a crawl attempt
///
/// `Fetching` is the only active state; a chain continues only from
/// `SuccessContinue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HopState {
    /// Result row exists, request in flight
    Fetching,

    /// Response received and it redirects somewhere worth following
    SuccessContinue,

    /// Response received, nothing further to follow
    SuccessTerminal,

    /// The transfer failed; the failure is recorded
    ErrorTerminal,
}

impl HopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::SuccessContinue => "success_continue",
            Self::SuccessTerminal => "success_terminal",
            Self::ErrorTerminal => "error_terminal",
        }
    }
}

impl fmt::Display for HopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(HopState::Fetching.to_string(), "fetching");
        assert_eq!(HopState::SuccessContinue.to_string(), "success_continue");
        assert_eq!(HopState::SuccessTerminal.to_string(), "success_terminal");
        assert_eq!(HopState::ErrorTerminal.to_string(), "error_terminal");
    }
}
