//! Registry port and change notifications

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, warn};

/// Errors from slot operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Store unavailable at {location}: {source}")]
    Unavailable {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Slot value at {location} is not valid UTF-8")]
    Corrupt { location: String },
}

impl RegistryError {
    pub(crate) fn unavailable(location: impl Into<String>, source: std::io::Error) -> Self {
        Self::Unavailable {
            location: location.into(),
            source,
        }
    }
}

/// A single shared slot
///
/// Every operation is synchronous. `write` is last-writer-wins; the only
/// conditional operation is `clear_if_owned_by`, which must never remove a
/// value other than the one passed in.
pub trait Registry: Send + Sync {
    /// Key of the slot this handle is bound to
    fn key(&self) -> &str;

    /// Current value, or None when the slot is empty
    fn read(&self) -> Result<Option<String>, RegistryError>;

    /// Unconditionally set the value
    fn write(&self, value: &str) -> Result<(), RegistryError>;

    /// Delete the value only if it equals `value`
    ///
    /// Returns true if the slot was cleared. A mismatch is not an error.
    fn clear_if_owned_by(&self, value: &str) -> Result<bool, RegistryError>;

    /// Subscribe to changes made through other handles
    fn subscribe(&self) -> ChangeSubscription;
}

/// A value change observed on a slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotChange {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Item yielded by a [`ChangeSubscription`]
///
/// Neither variant is authoritative: receivers re-read the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotEvent {
    /// The slot changed
    Changed(SlotChange),
    /// The subscriber fell behind and this many notifications were dropped
    Missed(u64),
}

/// Change tagged with the handle that made it
#[derive(Debug, Clone)]
pub(crate) struct Envelope {
    pub origin: u64,
    pub change: SlotChange,
}

/// Receiving side of a slot's change notifications
///
/// Changes made through the subscribing handle itself are filtered out, as
/// are changes to other keys sharing the same channel.
pub struct ChangeSubscription {
    rx: broadcast::Receiver<Envelope>,
    key: String,
    origin: Option<u64>,
}

impl ChangeSubscription {
    pub(crate) fn new(rx: broadcast::Receiver<Envelope>, key: impl Into<String>, origin: Option<u64>) -> Self {
        Self {
            rx,
            key: key.into(),
            origin,
        }
    }

    fn accepts(&self, envelope: &Envelope) -> bool {
        envelope.change.key == self.key && Some(envelope.origin) != self.origin
    }

    /// Wait for the next change
    ///
    /// Returns None once every sender is gone.
    pub async fn recv(&mut self) -> Option<SlotEvent> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) => {
                    if self.accepts(&envelope) {
                        debug!(key = %self.key, "ChangeSubscription::recv: change");
                        return Some(SlotEvent::Changed(envelope.change));
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(key = %self.key, missed = n, "Change subscriber lagged, notifications dropped");
                    return Some(SlotEvent::Missed(n));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next pending change without waiting
    pub fn try_recv(&mut self) -> Option<SlotEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(envelope) => {
                    if self.accepts(&envelope) {
                        return Some(SlotEvent::Changed(envelope.change));
                    }
                }
                Err(TryRecvError::Lagged(n)) => return Some(SlotEvent::Missed(n)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}
