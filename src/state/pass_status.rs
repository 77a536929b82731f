/// Terminal status definitions for crawl passes
use std::fmt;

/// Represents how a crawl pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassStatus {
    // ===== Session-completing states =====
    /// The listing returned an empty page
    Exhausted,

    /// The session's repository limit was reached
    LimitReached,

    /// The platform refused or garbled a listing page (e.g. past a search
    /// result cap); retrying the same offset cannot succeed
    Rejected,

    // ===== Retryable states =====
    /// The platform quota ran out mid-pass
    QuotaExceeded,

    /// A transport failure ended the pass
    CommunicationError,

    /// The caller asked the engine to stop
    Interrupted,
}

impl PassStatus {
    /// Returns true if a pass ending this way completes its session
    pub fn completes_session(&self) -> bool {
        matches!(self, Self::Exhausted | Self::LimitReached | Self::Rejected)
    }

    /// Returns true if the pass ended because of an error
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::QuotaExceeded | Self::CommunicationError | Self::Rejected
        )
    }

    /// Converts the status to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Exhausted => "exhausted",
            Self::LimitReached => "limit_reached",
            Self::Rejected => "rejected",
            Self::QuotaExceeded => "quota_exceeded",
            Self::CommunicationError => "communication_error",
            Self::Interrupted => "interrupted",
        }
    }

    /// Parses a status from a database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "exhausted" => Some(Self::Exhausted),
            "limit_reached" => Some(Self::LimitReached),
            "rejected" => Some(Self::Rejected),
            "quota_exceeded" => Some(Self::QuotaExceeded),
            "communication_error" => Some(Self::CommunicationError),
            "interrupted" => Some(Self::Interrupted),
            _ => None,
        }
    }

    /// Returns all possible pass statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![
            Self::Exhausted,
            Self::LimitReached,
            Self::Rejected,
            Self::QuotaExceeded,
            Self::CommunicationError,
            Self::Interrupted,
        ]
    }
}

impl fmt::Display for PassStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
