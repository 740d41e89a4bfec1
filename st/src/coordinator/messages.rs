//! Requests and errors for the coordinator actor

use slotstore::RegistryError;
use thiserror::Error;
use tokio::sync::oneshot;

use super::state::{CoordinatorStatus, ReleaseOutcome};

/// Errors surfaced to the application
///
/// Protocol races never show up here; they are ordinary transitions.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Shared store unavailable, cannot coordinate instances: {0}")]
    StorageUnavailable(#[from] RegistryError),

    #[error("Coordinator channel closed")]
    ChannelClosed,

    #[error("Instance has already released its claim")]
    Released,
}

/// Reply channel for a status-producing request
pub type StatusReply = oneshot::Sender<Result<CoordinatorStatus, CoordinatorError>>;

/// Control requests to an instance runtime
#[derive(Debug)]
pub enum CoordRequest {
    /// Take the slot unconditionally
    ForceActivate { reply_tx: StatusReply },

    /// The instance returned to the foreground
    Visible { reply_tx: StatusReply },

    /// Release the slot if owned and stop the runtime
    Shutdown {
        reply_tx: oneshot::Sender<Result<ReleaseOutcome, CoordinatorError>>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_message() {
        let err: CoordinatorError = RegistryError::Corrupt {
            location: "/tmp/x.slot".to_string(),
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("cannot coordinate"));
        assert!(msg.contains("/tmp/x.slot"));
    }
}
