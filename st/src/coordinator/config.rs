//! Coordinator configuration

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::signal::CLAIM_SIGNAL;

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Contest policy: take over an occupied slot on start instead of waiting
    #[serde(default = "default_transfer")]
    pub transfer: bool,

    /// Re-evaluate (and claim an empty slot) when the instance becomes visible
    #[serde(default = "default_reclaim_on_visible", rename = "reclaim-on-visible")]
    pub reclaim_on_visible: bool,

    /// Signal name broadcast after taking the slot
    #[serde(default = "default_claim_event", rename = "claim-event")]
    pub claim_event: String,

    /// Channel buffer size for control requests
    #[serde(default = "default_channel_buffer", rename = "channel-buffer")]
    pub channel_buffer: usize,
}

fn default_transfer() -> bool {
    debug!("default_transfer: called");
    true
}

fn default_reclaim_on_visible() -> bool {
    debug!("default_reclaim_on_visible: called");
    true
}

fn default_claim_event() -> String {
    debug!("default_claim_event: called");
    CLAIM_SIGNAL.to_string()
}

fn default_channel_buffer() -> usize {
    debug!("default_channel_buffer: called");
    32
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            transfer: default_transfer(),
            reclaim_on_visible: default_reclaim_on_visible(),
            claim_event: default_claim_event(),
            channel_buffer: default_channel_buffer(),
        }
    }
}

impl CoordinatorConfig {
    /// Config that waits for an occupied slot instead of taking it
    pub fn deferring() -> Self {
        Self {
            transfer: false,
            ..Default::default()
        }
    }
}
