//! Signal payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::InstanceId;

/// Name of the signal an instance broadcasts after taking the slot
pub const CLAIM_SIGNAL: &str = "active-instance-changed";

/// One broadcast notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Signal {
    /// Unique signal id
    pub id: String,
    /// Event name subscribers filter on
    pub name: String,
    /// Instance that sent it
    pub origin: InstanceId,
    pub sent_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(name: impl Into<String>, origin: InstanceId) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            name: name.into(),
            origin,
            sent_at: Utc::now(),
        }
    }
}

/// Item yielded by a signal subscription
#[derive(Debug, Clone, PartialEq)]
pub enum SignalEvent {
    Received(Signal),
    /// Subscriber fell behind; this many signals were dropped
    Missed(u64),
}
