//! Background poller that turns file changes into slot notifications

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::file::FileSlot;

/// Default interval between polls of a slot file
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Floor for poll intervals; a zero sleep would spin
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Polls a [`FileSlot`] so its subscribers hear about external writes
pub struct SlotWatcher {
    slot: Arc<FileSlot>,
    interval: Duration,
}

impl SlotWatcher {
    /// Create a watcher for the given slot, polling no faster than [`MIN_POLL_INTERVAL`]
    pub fn new(slot: Arc<FileSlot>, interval: Duration) -> Self {
        Self {
            slot,
            interval: interval.max(MIN_POLL_INTERVAL),
        }
    }

    /// Run a single poll (useful for testing)
    pub fn check_once(&self) -> bool {
        match self.slot.poll() {
            Ok(changed) => changed,
            Err(e) => {
                error!(error = %e, "Error polling slot");
                false
            }
        }
    }

    /// Poll forever
    pub async fn run(self) {
        info!(interval_ms = self.interval.as_millis() as u64, "SlotWatcher started");
        loop {
            if self.check_once() {
                debug!("SlotWatcher: change broadcast");
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Spawn onto the current runtime; the task stops when the guard drops
    pub fn spawn(self) -> WatcherGuard {
        WatcherGuard {
            handle: tokio::spawn(self.run()),
        }
    }
}

/// Aborts a background poller when dropped
pub struct WatcherGuard {
    handle: JoinHandle<()>,
}

impl WatcherGuard {
    /// Wrap an already spawned polling task
    pub fn new(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }

    /// Whether the task has stopped
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for WatcherGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
