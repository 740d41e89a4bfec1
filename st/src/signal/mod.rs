//! Notification channel
//!
//! Best-effort, fire-and-forget broadcast between instances of one session.
//! A broadcast may arrive zero or more times, in any order relative to
//! registry writes, so receivers treat a signal only as a prompt to re-read
//! the registry.
//!
//! ```text
//! LocalSignalBus   instances sharing one process (tokio broadcast)
//! FileSignalLog    instances in separate processes ({dir}/signals.jsonl)
//! ```

mod bus;
mod log;
mod types;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

use crate::identity::InstanceId;

pub use bus::{DEFAULT_SIGNAL_CAPACITY, LocalSignalBus, create_signal_bus};
pub use log::{DEFAULT_MAX_LOG_BYTES, FileSignalLog, SIGNAL_LOG_FILE, SignalTail};
pub use types::{CLAIM_SIGNAL, Signal, SignalEvent};

/// A broadcast medium shared by all instances of a session
pub trait SignalChannel: Send + Sync {
    /// Send a signal to every other live instance; never fails
    fn broadcast(&self, signal: Signal);

    /// Receive signals named `name` sent by anyone but `origin`
    fn subscribe(&self, name: &str, origin: &InstanceId) -> SignalSubscription;
}

/// Receiving side of a [`SignalChannel`]
pub struct SignalSubscription {
    rx: broadcast::Receiver<Signal>,
    name: String,
    origin: InstanceId,
}

impl SignalSubscription {
    pub(crate) fn new(rx: broadcast::Receiver<Signal>, name: impl Into<String>, origin: InstanceId) -> Self {
        Self {
            rx,
            name: name.into(),
            origin,
        }
    }

    fn accepts(&self, signal: &Signal) -> bool {
        signal.name == self.name && signal.origin != self.origin
    }

    /// Wait for the next matching signal; None once the channel is gone
    pub async fn recv(&mut self) -> Option<SignalEvent> {
        loop {
            match self.rx.recv().await {
                Ok(signal) => {
                    if self.accepts(&signal) {
                        return Some(SignalEvent::Received(signal));
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(name = %self.name, missed = n, "Signal subscriber lagged, signals dropped");
                    return Some(SignalEvent::Missed(n));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next pending matching signal without waiting
    pub fn try_recv(&mut self) -> Option<SignalEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(signal) => {
                    if self.accepts(&signal) {
                        return Some(SignalEvent::Received(signal));
                    }
                }
                Err(TryRecvError::Lagged(n)) => return Some(SignalEvent::Missed(n)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}
