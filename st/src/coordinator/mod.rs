//! Single-active-instance coordinator
//!
//! Each instance owns one [`Coordinator`], a synchronous state machine over a
//! shared registry slot and a signal channel:
//! - **Claim:** write own id to the slot when it is empty, ours, or contested
//! - **Yield:** become Blocked on reading anyone else's id after a change
//! - **Release:** compare-and-delete own id on teardown
//! - **Override:** unconditionally take the slot on request
//!
//! [`InstanceRuntime`] drives a coordinator as an actor task, merging native
//! slot changes, signals and control requests into a single reconcile path.
//! [`CoordinatorHandle`] is the application's side of it.

mod config;
mod core;
mod handle;
mod messages;
mod runtime;
mod state;

pub use config::CoordinatorConfig;
pub use core::Coordinator;
pub use handle::CoordinatorHandle;
pub use messages::{CoordRequest, CoordinatorError};
pub use runtime::InstanceRuntime;
pub use state::{CoordinatorStatus, Reason, ReleaseOutcome, State, Trigger};
