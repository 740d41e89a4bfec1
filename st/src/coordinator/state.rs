//! Coordinator status types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where an instance stands in the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum State {
    /// Constructed, initial evaluation not yet run
    Claiming,
    /// This instance holds the slot
    Active,
    /// Another instance holds the slot
    Blocked,
    /// The shared store failed; exclusivity cannot be reasoned about
    Unavailable,
}

/// Why the instance is in its state; for user-facing messages only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reason {
    Active,
    Transferred,
    Blocked,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Transferred => write!(f, "transferred"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

/// Externally visible status pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    pub state: State,
    pub reason: Option<Reason>,
}

impl CoordinatorStatus {
    pub const CLAIMING: Self = Self {
        state: State::Claiming,
        reason: None,
    };

    pub const UNAVAILABLE: Self = Self {
        state: State::Unavailable,
        reason: None,
    };

    pub fn active(reason: Reason) -> Self {
        Self {
            state: State::Active,
            reason: Some(reason),
        }
    }

    pub fn blocked() -> Self {
        Self {
            state: State::Blocked,
            reason: Some(Reason::Blocked),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == State::Active
    }
}

impl fmt::Display for CoordinatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            Some(reason) => write!(f, "{:?} ({})", self.state, reason),
            None => write!(f, "{:?}", self.state),
        }
    }
}

/// What prompted a re-evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Native change notification from the store
    StoreChanged,
    /// Another instance broadcast a claim
    ClaimSignal,
    /// A notification source reported dropped events
    Missed,
    /// The instance came back to the foreground
    Visible,
}

/// Result of releasing the slot on teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The slot held our id and was cleared
    Released,
    /// Someone else (or nobody) held the slot; it was left alone
    NotOwner,
    /// Release already ran
    AlreadyReleased,
}
