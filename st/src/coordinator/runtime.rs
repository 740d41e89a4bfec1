//! Actor task driving a [`Coordinator`]
//!
//! Every trigger (store change, claim signal, lag, visibility, override) goes
//! through the same task, so evaluations never interleave.

use slotstore::{ChangeSubscription, SlotEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::core::Coordinator;
use super::handle::CoordinatorHandle;
use super::messages::CoordRequest;
use super::state::Trigger;
use crate::signal::{SignalEvent, SignalSubscription};

/// Runs one instance until shutdown
pub struct InstanceRuntime {
    coordinator: Coordinator,
    rx: mpsc::Receiver<CoordRequest>,
    changes: ChangeSubscription,
    signals: SignalSubscription,
}

impl InstanceRuntime {
    /// Wrap a coordinator, opening its subscriptions immediately
    pub fn new(coordinator: Coordinator) -> (Self, CoordinatorHandle) {
        debug!(id = %coordinator.identity(), "InstanceRuntime::new: called");
        let buffer = coordinator.config().channel_buffer;
        if buffer == 0 {
            warn!(id = %coordinator.identity(), "Request channel buffer of 0 raised to 1");
        }
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let handle = CoordinatorHandle::new(
            coordinator.identity().clone(),
            tx,
            coordinator.watch_status(),
            coordinator.watch_activations(),
        );
        let changes = coordinator.subscribe_changes();
        let signals = coordinator.subscribe_signals();
        let runtime = Self {
            coordinator,
            rx,
            changes,
            signals,
        };
        (runtime, handle)
    }

    /// Build and spawn onto the current tokio runtime
    pub fn spawn(coordinator: Coordinator) -> (CoordinatorHandle, JoinHandle<()>) {
        let (runtime, handle) = Self::new(coordinator);
        let task = tokio::spawn(runtime.run());
        (handle, task)
    }

    /// Start the coordinator and process triggers until shutdown
    pub async fn run(mut self) {
        let id = self.coordinator.identity().clone();
        info!(%id, "Instance runtime started");

        if let Err(e) = self.coordinator.start() {
            warn!(%id, error = %e, "Initial claim failed");
        }

        loop {
            tokio::select! {
                request = self.rx.recv() => match request {
                    Some(CoordRequest::ForceActivate { reply_tx }) => {
                        let _ = reply_tx.send(self.coordinator.force_activate());
                    }
                    Some(CoordRequest::Visible { reply_tx }) => {
                        let _ = reply_tx.send(self.coordinator.on_visible());
                    }
                    Some(CoordRequest::Shutdown { reply_tx }) => {
                        debug!(%id, "InstanceRuntime::run: shutdown requested");
                        let _ = reply_tx.send(self.coordinator.release());
                        break;
                    }
                    None => {
                        debug!(%id, "InstanceRuntime::run: all handles dropped");
                        break;
                    }
                },
                Some(event) = self.changes.recv() => {
                    let trigger = match event {
                        SlotEvent::Changed(change) => {
                            debug!(%id, new_value = ?change.new_value, "InstanceRuntime::run: slot changed");
                            Trigger::StoreChanged
                        }
                        SlotEvent::Missed(_) => Trigger::Missed,
                    };
                    self.reconcile(trigger);
                }
                Some(event) = self.signals.recv() => {
                    let trigger = match event {
                        SignalEvent::Received(signal) => {
                            debug!(%id, origin = %signal.origin, "InstanceRuntime::run: claim signal");
                            Trigger::ClaimSignal
                        }
                        SignalEvent::Missed(_) => Trigger::Missed,
                    };
                    self.reconcile(trigger);
                }
            }
        }

        match self.coordinator.release() {
            Ok(outcome) => debug!(%id, ?outcome, "InstanceRuntime::run: release on exit"),
            Err(e) => warn!(%id, error = %e, "Release on exit failed"),
        }
        info!(%id, "Instance runtime stopped");
    }

    fn reconcile(&mut self, trigger: Trigger) {
        if let Err(e) = self.coordinator.reconcile(trigger) {
            warn!(id = %self.coordinator.identity(), ?trigger, error = %e, "Reconcile failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{CoordinatorConfig, CoordinatorStatus, Reason, ReleaseOutcome, State};
    use crate::identity::InstanceId;
    use crate::signal::LocalSignalBus;
    use slotstore::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    const KEY: &str = "active_instance";

    fn spawn(store: &MemoryStore, bus: &Arc<LocalSignalBus>, name: &str) -> (CoordinatorHandle, JoinHandle<()>) {
        let coordinator = Coordinator::with_identity(
            InstanceId::from_raw(name),
            CoordinatorConfig::default(),
            Arc::new(store.slot(KEY)),
            bus.clone(),
        );
        InstanceRuntime::spawn(coordinator)
    }

    async fn wait_state(handle: &CoordinatorHandle, state: State) -> CoordinatorStatus {
        tokio::time::timeout(Duration::from_secs(2), handle.wait_for(|s| s.state == state))
            .await
            .expect("timed out waiting for state")
            .unwrap()
    }

    #[tokio::test]
    async fn test_runtime_hands_over_between_instances() {
        let store = MemoryStore::new();
        let bus = Arc::new(LocalSignalBus::with_default_capacity());

        let (a, _a_task) = spawn(&store, &bus, "a");
        wait_state(&a, State::Active).await;

        let (b, _b_task) = spawn(&store, &bus, "b");
        assert_eq!(wait_state(&b, State::Active).await.reason, Some(Reason::Transferred));
        wait_state(&a, State::Blocked).await;
        assert_eq!(store.peek(KEY).as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_shutdown_releases_and_blocked_instance_takes_over() {
        let store = MemoryStore::new();
        let bus = Arc::new(LocalSignalBus::with_default_capacity());

        let (a, _a_task) = spawn(&store, &bus, "a");
        wait_state(&a, State::Active).await;
        let (b, b_task) = spawn(&store, &bus, "b");
        wait_state(&a, State::Blocked).await;

        assert_eq!(b.shutdown().await.unwrap(), ReleaseOutcome::Released);
        b_task.await.unwrap();

        wait_state(&a, State::Active).await;
        assert_eq!(store.peek(KEY).as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_dropping_handles_releases_slot() {
        let store = MemoryStore::new();
        let bus = Arc::new(LocalSignalBus::with_default_capacity());

        let (a, task) = spawn(&store, &bus, "a");
        wait_state(&a, State::Active).await;
        drop(a);

        task.await.unwrap();
        assert_eq!(store.peek(KEY), None);
    }

    #[tokio::test]
    async fn test_zero_channel_buffer_still_serves_requests() {
        let store = MemoryStore::new();
        let bus = Arc::new(LocalSignalBus::with_default_capacity());
        let config = CoordinatorConfig {
            channel_buffer: 0,
            ..CoordinatorConfig::deferring()
        };
        let coordinator = Coordinator::with_identity(InstanceId::from_raw("a"), config, Arc::new(store.slot(KEY)), bus);

        let (a, task) = InstanceRuntime::spawn(coordinator);
        assert!(a.force_activate().await.unwrap().is_active());
        assert_eq!(a.shutdown().await.unwrap(), ReleaseOutcome::Released);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_errors_after_runtime_stops() {
        let store = MemoryStore::new();
        let bus = Arc::new(LocalSignalBus::with_default_capacity());

        let (a, task) = spawn(&store, &bus, "a");
        a.shutdown().await.unwrap();
        task.await.unwrap();

        assert!(a.force_activate().await.is_err());
    }
}
