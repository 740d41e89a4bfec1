//! Session hook
//!
//! Session work (realtime connections, presence, background sync) runs only
//! while the instance is Active. The driver watches a [`CoordinatorHandle`]
//! and calls the hook on each edge into and out of Active.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::coordinator::{CoordinatorHandle, CoordinatorStatus};

/// Side effects owned by the active instance
#[async_trait]
pub trait SessionHook: Send + Sync {
    /// Initialize the session; runs on every transition into Active
    async fn on_activated(&self, status: CoordinatorStatus) -> eyre::Result<()>;

    /// Tear the session down after leaving Active
    async fn on_deactivated(&self, _status: CoordinatorStatus) -> eyre::Result<()> {
        Ok(())
    }
}

/// Drive `hook` from the handle's status until the runtime stops
///
/// Status updates are coalesced, but the activation counter is not: if the
/// instance left Active and came back while a hook was still running, the
/// session is torn down and started again.
pub fn spawn_session_driver(handle: &CoordinatorHandle, hook: Arc<dyn SessionHook>) -> JoinHandle<()> {
    let mut status_rx = handle.watch_status();
    let mut activations_rx = handle.watch_activations();
    let id = handle.identity().clone();
    debug!(%id, "spawn_session_driver: called");

    tokio::spawn(async move {
        // Activation the running session was started for, if any
        let mut session: Option<u64> = None;
        loop {
            // Status first: the counter is bumped before status is published
            let status = *status_rx.borrow_and_update();
            let activation = *activations_rx.borrow_and_update();

            if let Some(started) = session
                && (!status.is_active() || started != activation)
            {
                session = None;
                info!(%id, %status, "Stopping session");
                if let Err(e) = hook.on_deactivated(status).await {
                    warn!(%id, error = %e, "Session hook failed on deactivation");
                }
            }
            if session.is_none() && status.is_active() {
                session = Some(activation);
                info!(%id, %status, activation, "Starting session");
                if let Err(e) = hook.on_activated(status).await {
                    warn!(%id, error = %e, "Session hook failed on activation");
                }
            }

            let closed = tokio::select! {
                changed = status_rx.changed() => changed.is_err(),
                changed = activations_rx.changed() => changed.is_err(),
            };
            if closed {
                debug!(%id, "spawn_session_driver: status channel closed");
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{Coordinator, CoordinatorConfig, InstanceRuntime, State};
    use crate::identity::InstanceId;
    use crate::signal::LocalSignalBus;
    use slotstore::{MemoryStore, Registry};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<&'static str>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionHook for Recorder {
        async fn on_activated(&self, _status: CoordinatorStatus) -> eyre::Result<()> {
            self.events.lock().unwrap().push("activated");
            Ok(())
        }

        async fn on_deactivated(&self, _status: CoordinatorStatus) -> eyre::Result<()> {
            self.events.lock().unwrap().push("deactivated");
            Ok(())
        }
    }

    /// Records like [`Recorder`] but holds each activation open for a while
    #[derive(Default)]
    struct Slow {
        inner: Recorder,
    }

    #[async_trait]
    impl SessionHook for Slow {
        async fn on_activated(&self, status: CoordinatorStatus) -> eyre::Result<()> {
            self.inner.on_activated(status).await?;
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(())
        }

        async fn on_deactivated(&self, status: CoordinatorStatus) -> eyre::Result<()> {
            self.inner.on_deactivated(status).await
        }
    }

    struct Failing;

    #[async_trait]
    impl SessionHook for Failing {
        async fn on_activated(&self, _status: CoordinatorStatus) -> eyre::Result<()> {
            Err(eyre::eyre!("connection refused"))
        }
    }

    fn spawn(store: &MemoryStore, bus: &Arc<LocalSignalBus>, name: &str) -> CoordinatorHandle {
        let coordinator = Coordinator::with_identity(
            InstanceId::from_raw(name),
            CoordinatorConfig::default(),
            Arc::new(store.slot("active_instance")),
            bus.clone(),
        );
        InstanceRuntime::spawn(coordinator).0
    }

    async fn until(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_hook_runs_on_every_entry_into_active() {
        let store = MemoryStore::new();
        let bus = Arc::new(LocalSignalBus::with_default_capacity());
        let recorder = Arc::new(Recorder::default());

        let a = spawn(&store, &bus, "a");
        let _driver = spawn_session_driver(&a, recorder.clone());
        until(|| recorder.events() == ["activated"]).await;

        let b = spawn(&store, &bus, "b");
        a.wait_for(|s| s.state == State::Blocked).await.unwrap();
        until(|| recorder.events() == ["activated", "deactivated"]).await;

        b.shutdown().await.unwrap();
        a.wait_for(|s| s.state == State::Active).await.unwrap();
        until(|| recorder.events() == ["activated", "deactivated", "activated"]).await;
    }

    #[tokio::test]
    async fn test_flap_during_slow_activation_restarts_session() {
        let store = MemoryStore::new();
        let bus = Arc::new(LocalSignalBus::with_default_capacity());
        let hook = Arc::new(Slow::default());

        let a = spawn(&store, &bus, "a");
        let _driver = spawn_session_driver(&a, hook.clone());
        until(|| hook.inner.events() == ["activated"]).await;

        // Out of Active and back while on_activated is still sleeping
        store.slot("active_instance").write("b").unwrap();
        a.wait_for(|s| s.state == State::Blocked).await.unwrap();
        assert!(a.force_activate().await.unwrap().is_active());
        assert_eq!(*a.watch_activations().borrow(), 2);

        until(|| hook.inner.events() == ["activated", "deactivated", "activated"]).await;
    }

    #[tokio::test]
    async fn test_driver_stops_with_runtime() {
        let store = MemoryStore::new();
        let bus = Arc::new(LocalSignalBus::with_default_capacity());
        let a = spawn(&store, &bus, "a");
        let driver = spawn_session_driver(&a, Arc::new(Failing));

        a.shutdown().await.unwrap();
        drop(a);

        tokio::time::timeout(Duration::from_secs(2), driver)
            .await
            .expect("driver did not stop")
            .unwrap();
    }
}
