//! Coordinator state machine
//!
//! All decisions re-read the registry; nothing carried by a notification or a
//! signal is trusted. The machine is synchronous so it can be driven by the
//! runtime actor or stepped directly in tests.

use std::sync::Arc;

use slotstore::{ChangeSubscription, Registry, RegistryError};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::config::CoordinatorConfig;
use super::messages::CoordinatorError;
use super::state::{CoordinatorStatus, Reason, ReleaseOutcome, State, Trigger};
use crate::identity::InstanceId;
use crate::signal::{Signal, SignalChannel, SignalSubscription};

/// One instance's side of the single-active-instance protocol
pub struct Coordinator {
    id: InstanceId,
    config: CoordinatorConfig,
    registry: Arc<dyn Registry>,
    signals: Arc<dyn SignalChannel>,
    status_tx: watch::Sender<CoordinatorStatus>,
    /// Entries into Active so far; moves even when status changes coalesce
    activations_tx: watch::Sender<u64>,
    released: bool,
}

impl Coordinator {
    /// Create a coordinator with a freshly minted identity
    pub fn new(config: CoordinatorConfig, registry: Arc<dyn Registry>, signals: Arc<dyn SignalChannel>) -> Self {
        Self::with_identity(InstanceId::generate(), config, registry, signals)
    }

    /// Create a coordinator for an already minted identity
    pub fn with_identity(
        id: InstanceId,
        config: CoordinatorConfig,
        registry: Arc<dyn Registry>,
        signals: Arc<dyn SignalChannel>,
    ) -> Self {
        debug!(%id, key = registry.key(), transfer = config.transfer, "Coordinator::with_identity: called");
        let (status_tx, _) = watch::channel(CoordinatorStatus::CLAIMING);
        let (activations_tx, _) = watch::channel(0);
        Self {
            id,
            config,
            registry,
            signals,
            status_tx,
            activations_tx,
            released: false,
        }
    }

    pub fn identity(&self) -> &InstanceId {
        &self.id
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Current status
    pub fn status(&self) -> CoordinatorStatus {
        *self.status_tx.borrow()
    }

    /// Receiver that sees every status change
    pub fn watch_status(&self) -> watch::Receiver<CoordinatorStatus> {
        self.status_tx.subscribe()
    }

    /// Number of times this instance has entered Active
    pub fn activations(&self) -> u64 {
        *self.activations_tx.borrow()
    }

    /// Receiver for the activation counter
    pub fn watch_activations(&self) -> watch::Receiver<u64> {
        self.activations_tx.subscribe()
    }

    /// Native change notifications for the slot, minus our own writes
    pub fn subscribe_changes(&self) -> ChangeSubscription {
        self.registry.subscribe()
    }

    /// Claim signals from other instances
    pub fn subscribe_signals(&self) -> SignalSubscription {
        self.signals.subscribe(&self.config.claim_event, &self.id)
    }

    /// Whether release has completed
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Run the initial evaluation
    ///
    /// Subscriptions must already be open, or a claim racing this call can be
    /// missed.
    pub fn start(&mut self) -> Result<CoordinatorStatus, CoordinatorError> {
        debug!(id = %self.id, "Coordinator::start: called");
        self.ensure_live()?;
        let current = self.read()?;
        let next = self.initial(current.as_deref())?;
        Ok(self.publish(next))
    }

    /// Re-read the registry and move to whatever state it implies
    pub fn reconcile(&mut self, trigger: Trigger) -> Result<CoordinatorStatus, CoordinatorError> {
        debug!(id = %self.id, ?trigger, "Coordinator::reconcile: called");
        self.ensure_live()?;
        let status = self.status();

        if matches!(status.state, State::Claiming | State::Unavailable) {
            let current = self.read()?;
            let next = self.initial(current.as_deref())?;
            return Ok(self.publish(next));
        }

        let current = self.read()?;
        let own = current.as_deref() == Some(self.id.as_str());
        let next = match (status.state, current.as_deref()) {
            (State::Active, _) if own => status,
            (State::Active, Some(holder)) => {
                info!(id = %self.id, holder, ?trigger, "Slot taken by another instance, yielding");
                CoordinatorStatus::blocked()
            }
            (State::Active, None) => {
                warn!(id = %self.id, ?trigger, "Slot cleared while active, reasserting claim");
                self.claim(false)?;
                status
            }
            (State::Blocked, _) if own => CoordinatorStatus::active(Reason::Active),
            (State::Blocked, Some(_)) => status,
            (State::Blocked, None) => {
                info!(id = %self.id, ?trigger, "Slot released, claiming it");
                self.claim(true)?;
                if self.config.transfer {
                    CoordinatorStatus::active(Reason::Transferred)
                } else {
                    CoordinatorStatus::active(Reason::Active)
                }
            }
            (State::Claiming | State::Unavailable, _) => status,
        };
        Ok(self.publish(next))
    }

    /// The instance came back to the foreground
    ///
    /// Reconciles only when `reclaim_on_visible` is set.
    pub fn on_visible(&mut self) -> Result<CoordinatorStatus, CoordinatorError> {
        if !self.config.reclaim_on_visible {
            debug!(id = %self.id, "Coordinator::on_visible: reclaim disabled");
            self.ensure_live()?;
            return Ok(self.status());
        }
        self.reconcile(Trigger::Visible)
    }

    /// Take the slot regardless of who holds it
    pub fn force_activate(&mut self) -> Result<CoordinatorStatus, CoordinatorError> {
        debug!(id = %self.id, "Coordinator::force_activate: called");
        self.ensure_live()?;
        self.claim(true)?;
        info!(id = %self.id, "Activated by override");
        Ok(self.publish(CoordinatorStatus::active(Reason::Transferred)))
    }

    /// Compare-and-delete our id from the slot
    ///
    /// Idempotent: later calls return [`ReleaseOutcome::AlreadyReleased`].
    pub fn release(&mut self) -> Result<ReleaseOutcome, CoordinatorError> {
        debug!(id = %self.id, "Coordinator::release: called");
        if self.released {
            return Ok(ReleaseOutcome::AlreadyReleased);
        }
        let cleared = self
            .registry
            .clear_if_owned_by(self.id.as_str())
            .map_err(|e| self.fail(e))?;
        self.released = true;
        let outcome = if cleared {
            info!(id = %self.id, "Released slot");
            ReleaseOutcome::Released
        } else {
            debug!(id = %self.id, "Coordinator::release: slot held by someone else, left alone");
            ReleaseOutcome::NotOwner
        };
        Ok(outcome)
    }

    /// Decision for an instance with no standing in the protocol yet
    fn initial(&self, current: Option<&str>) -> Result<CoordinatorStatus, CoordinatorError> {
        match current {
            None => {
                self.claim(false)?;
                info!(id = %self.id, "Claimed empty slot");
                Ok(CoordinatorStatus::active(Reason::Active))
            }
            Some(holder) if holder == self.id.as_str() => Ok(CoordinatorStatus::active(Reason::Active)),
            Some(holder) if self.config.transfer => {
                self.claim(true)?;
                info!(id = %self.id, holder, "Took over slot");
                Ok(CoordinatorStatus::active(Reason::Transferred))
            }
            Some(holder) => {
                info!(id = %self.id, holder, "Slot held by another instance, waiting");
                Ok(CoordinatorStatus::blocked())
            }
        }
    }

    fn ensure_live(&self) -> Result<(), CoordinatorError> {
        if self.released {
            return Err(CoordinatorError::Released);
        }
        Ok(())
    }

    fn read(&self) -> Result<Option<String>, CoordinatorError> {
        self.registry.read().map_err(|e| self.fail(e))
    }

    /// Write our id, then optionally announce it
    fn claim(&self, announce: bool) -> Result<(), CoordinatorError> {
        self.registry.write(self.id.as_str()).map_err(|e| self.fail(e))?;
        if announce {
            self.signals
                .broadcast(Signal::new(self.config.claim_event.clone(), self.id.clone()));
        }
        Ok(())
    }

    fn fail(&self, e: RegistryError) -> CoordinatorError {
        error!(id = %self.id, error = %e, "Shared store unavailable, cannot coordinate");
        self.publish(CoordinatorStatus::UNAVAILABLE);
        CoordinatorError::StorageUnavailable(e)
    }

    fn publish(&self, next: CoordinatorStatus) -> CoordinatorStatus {
        let previous = self.status();
        if previous == next {
            return next;
        }
        // Counter first, so a watcher woken by the status already sees it
        if next.is_active() && !previous.is_active() {
            self.activations_tx.send_modify(|count| *count += 1);
        }
        self.status_tx.send_replace(next);
        info!(id = %self.id, status = %next, activations = self.activations(), "Status changed");
        next
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.release() {
            Ok(outcome) => debug!(id = %self.id, ?outcome, "Coordinator::drop: released"),
            Err(e) => warn!(id = %self.id, error = %e, "Release on drop failed"),
        }
    }
}
