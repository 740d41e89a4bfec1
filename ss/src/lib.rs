//! SlotStore - shared single-value slots
//!
//! A slot is one mutable cell under a well-known key, visible to every
//! participant that opens the same store. Slots support unconditional writes,
//! a compare-and-delete release, and change notifications that are delivered
//! to every *other* handle on the same slot.
//!
//! # Backends
//!
//! ```text
//! MemoryStore   one process, many views (one per participant)
//! FileStore     many processes on one machine
//!
//! {dir}/
//! ├── {key}.slot     # current value, absent when empty
//! └── {key}.lock     # advisory lock guarding writes and compare-and-delete
//! ```
//!
//! # Example
//!
//! ```ignore
//! use slotstore::{FileStore, Registry};
//!
//! let store = FileStore::open("/tmp/slots")?;
//! let slot = store.slot("active_instance");
//! slot.write("instance-a")?;
//! assert!(!slot.clear_if_owned_by("instance-b")?);
//! assert!(slot.clear_if_owned_by("instance-a")?);
//! ```

pub mod cli;
pub mod config;
mod file;
mod memory;
mod registry;
mod watch;

pub use file::{FileSlot, FileStore};
pub use memory::{MemorySlot, MemoryStore};
pub use registry::{ChangeSubscription, Registry, RegistryError, SlotChange, SlotEvent};
pub use watch::{DEFAULT_POLL_INTERVAL_MS, MIN_POLL_INTERVAL, SlotWatcher, WatcherGuard};

/// Well-known key of the active-instance slot
pub const DEFAULT_SLOT_KEY: &str = "active_instance";

/// Default capacity of a slot's change notification channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
