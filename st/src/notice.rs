//! User-facing notices for non-default reasons

use crate::coordinator::{CoordinatorStatus, Reason};

pub const BLOCKED_MESSAGE: &str = "Your session is already active in another instance. Close it to continue here.";
pub const BLOCKED_ACTION: &str = "Use this instance";
pub const TRANSFERRED_MESSAGE: &str = "Your session was transferred to this instance.";

/// Text to show the user for a status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notice {
    pub reason: Reason,
    pub message: &'static str,
    /// Label for the override action, when one applies
    pub action: Option<&'static str>,
}

impl Notice {
    /// Notice for `status`, or None when nothing needs saying
    pub fn for_status(status: &CoordinatorStatus) -> Option<Self> {
        match status.reason? {
            Reason::Blocked => Some(Self {
                reason: Reason::Blocked,
                message: BLOCKED_MESSAGE,
                action: Some(BLOCKED_ACTION),
            }),
            Reason::Transferred => Some(Self {
                reason: Reason::Transferred,
                message: TRANSFERRED_MESSAGE,
                action: None,
            }),
            Reason::Active => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_notice_offers_override() {
        let notice = Notice::for_status(&CoordinatorStatus::blocked()).unwrap();
        assert_eq!(notice.message, BLOCKED_MESSAGE);
        assert_eq!(notice.action, Some("Use this instance"));
    }

    #[test]
    fn test_transferred_notice_is_informational() {
        let notice = Notice::for_status(&CoordinatorStatus::active(Reason::Transferred)).unwrap();
        assert_eq!(notice.message, TRANSFERRED_MESSAGE);
        assert_eq!(notice.action, None);
    }

    #[test]
    fn test_no_notice_for_plain_states() {
        assert!(Notice::for_status(&CoordinatorStatus::active(Reason::Active)).is_none());
        assert!(Notice::for_status(&CoordinatorStatus::CLAIMING).is_none());
        assert!(Notice::for_status(&CoordinatorStatus::UNAVAILABLE).is_none());
    }
}
