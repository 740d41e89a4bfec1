//! In-process signal bus
//!
//! Uses a tokio broadcast channel. Sending with no subscribers drops the
//! signal; a full channel drops the oldest signals for slow subscribers.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::types::Signal;
use super::{SignalChannel, SignalSubscription};
use crate::identity::InstanceId;

/// Default channel capacity (signals)
pub const DEFAULT_SIGNAL_CAPACITY: usize = 1024;

/// Signal channel for instances living in the same process
pub struct LocalSignalBus {
    tx: broadcast::Sender<Signal>,
}

impl LocalSignalBus {
    /// Create a new bus with the given capacity; 0 is raised to 1
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "LocalSignalBus::new: creating signal bus");
        if capacity == 0 {
            warn!("Signal bus capacity of 0 raised to 1");
        }
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Create a new bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_SIGNAL_CAPACITY)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for LocalSignalBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl SignalChannel for LocalSignalBus {
    fn broadcast(&self, signal: Signal) {
        debug!(name = %signal.name, origin = %signal.origin, "LocalSignalBus::broadcast");
        // Ignore send errors (no subscribers is OK)
        let _ = self.tx.send(signal);
    }

    fn subscribe(&self, name: &str, origin: &InstanceId) -> SignalSubscription {
        debug!(%name, %origin, "LocalSignalBus::subscribe: new subscriber");
        SignalSubscription::new(self.tx.subscribe(), name, origin.clone())
    }
}

/// Create a signal bus wrapped in an Arc for shared ownership
pub fn create_signal_bus() -> Arc<LocalSignalBus> {
    Arc::new(LocalSignalBus::with_default_capacity())
}
