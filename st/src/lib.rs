//! Solotab - single active instance per session
//!
//! Several instances of one logical session (tabs, windows, processes) share a
//! registry slot holding the id of the instance allowed to run session work.
//! There is no leader: each instance reads the slot, writes its own id to
//! claim it, and compare-and-deletes its id on the way out. Other instances
//! learn of a claim through the store's change notifications and, because a
//! writer never hears its own writes, through a best-effort signal broadcast.
//!
//! ```text
//! instance A                slot                  instance B
//!    │ start: empty → write A ─▶ A
//!    │                           │ ◀─ write B ── start: A held, transfer
//!    │ ◀──── change / signal ────┤
//!    │ re-read: B ≠ A → Blocked  │
//! ```
//!
//! Every notification is only a prompt to re-read the slot; the slot alone is
//! authoritative.

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod identity;
pub mod notice;
pub mod session;
pub mod signal;

pub use coordinator::{
    Coordinator, CoordinatorConfig, CoordinatorError, CoordinatorHandle, CoordinatorStatus, InstanceRuntime, Reason,
    ReleaseOutcome, State, Trigger,
};
pub use identity::{InstanceId, process_identity};
pub use notice::Notice;
pub use session::{SessionHook, spawn_session_driver};
