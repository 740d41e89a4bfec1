//! Application-side handle to a running instance

use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use super::messages::{CoordRequest, CoordinatorError};
use super::state::{CoordinatorStatus, ReleaseOutcome};
use crate::identity::InstanceId;

/// Cloneable handle to an [`InstanceRuntime`](super::InstanceRuntime)
///
/// The runtime releases the slot and stops once every handle is dropped.
#[derive(Clone)]
pub struct CoordinatorHandle {
    id: InstanceId,
    tx: mpsc::Sender<CoordRequest>,
    status_rx: watch::Receiver<CoordinatorStatus>,
    activations_rx: watch::Receiver<u64>,
}

impl CoordinatorHandle {
    pub(crate) fn new(
        id: InstanceId,
        tx: mpsc::Sender<CoordRequest>,
        status_rx: watch::Receiver<CoordinatorStatus>,
        activations_rx: watch::Receiver<u64>,
    ) -> Self {
        Self {
            id,
            tx,
            status_rx,
            activations_rx,
        }
    }

    pub fn identity(&self) -> &InstanceId {
        &self.id
    }

    /// Latest published status
    pub fn status(&self) -> CoordinatorStatus {
        *self.status_rx.borrow()
    }

    /// Receiver for status changes
    pub fn watch_status(&self) -> watch::Receiver<CoordinatorStatus> {
        self.status_rx.clone()
    }

    /// Receiver for the count of entries into Active
    pub fn watch_activations(&self) -> watch::Receiver<u64> {
        self.activations_rx.clone()
    }

    /// Wait until the status satisfies `predicate`
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&CoordinatorStatus) -> bool,
    ) -> Result<CoordinatorStatus, CoordinatorError> {
        let mut rx = self.status_rx.clone();
        let status = rx
            .wait_for(|status| predicate(status))
            .await
            .map_err(|_| CoordinatorError::ChannelClosed)?;
        Ok(*status)
    }

    /// Take the slot regardless of who holds it
    pub async fn force_activate(&self) -> Result<CoordinatorStatus, CoordinatorError> {
        debug!(id = %self.id, "CoordinatorHandle::force_activate: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordRequest::ForceActivate { reply_tx }).await?;
        reply_rx.await.map_err(|_| CoordinatorError::ChannelClosed)?
    }

    /// Report that the instance returned to the foreground
    pub async fn visible(&self) -> Result<CoordinatorStatus, CoordinatorError> {
        debug!(id = %self.id, "CoordinatorHandle::visible: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordRequest::Visible { reply_tx }).await?;
        reply_rx.await.map_err(|_| CoordinatorError::ChannelClosed)?
    }

    /// Release the slot and stop the runtime
    pub async fn shutdown(&self) -> Result<ReleaseOutcome, CoordinatorError> {
        debug!(id = %self.id, "CoordinatorHandle::shutdown: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordRequest::Shutdown { reply_tx }).await?;
        reply_rx.await.map_err(|_| CoordinatorError::ChannelClosed)?
    }

    async fn send(&self, request: CoordRequest) -> Result<(), CoordinatorError> {
        self.tx.send(request).await.map_err(|_| CoordinatorError::ChannelClosed)
    }
}
