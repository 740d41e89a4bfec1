//! In-process slot store
//!
//! Every [`MemorySlot`] taken from a [`MemoryStore`] is an independent view
//! with its own origin tag. A write through one view notifies all other views
//! on the same key, never the writer itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::debug;

use crate::registry::{ChangeSubscription, Envelope, Registry, RegistryError, SlotChange};

const LOCATION: &str = "memory";

struct Inner {
    slots: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
    next_origin: AtomicU64,
    tx: broadcast::Sender<Envelope>,
}

/// Shared in-memory store, cheap to clone
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create an empty store with the default notification capacity
    pub fn new() -> Self {
        Self::with_capacity(crate::DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create an empty store whose notification channel holds `capacity` changes
    pub fn with_capacity(capacity: usize) -> Self {
        debug!(capacity, "MemoryStore::with_capacity: called");
        let (tx, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(HashMap::new()),
                unavailable: AtomicBool::new(false),
                next_origin: AtomicU64::new(1),
                tx,
            }),
        }
    }

    /// Open a new view on `key`
    pub fn slot(&self, key: impl Into<String>) -> MemorySlot {
        let origin = self.inner.next_origin.fetch_add(1, Ordering::Relaxed);
        let key = key.into();
        debug!(%key, origin, "MemoryStore::slot: new view");
        MemorySlot {
            inner: Arc::clone(&self.inner),
            key,
            origin,
        }
    }

    /// Make every subsequent operation fail as if the backing store were gone
    pub fn set_unavailable(&self, unavailable: bool) {
        debug!(unavailable, "MemoryStore::set_unavailable: called");
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Read a key directly, ignoring availability
    pub fn peek(&self, key: &str) -> Option<String> {
        self.inner
            .slots
            .lock()
            .ok()
            .and_then(|slots| slots.get(key).cloned())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// One participant's view of a slot in a [`MemoryStore`]
pub struct MemorySlot {
    inner: Arc<Inner>,
    key: String,
    origin: u64,
}

impl MemorySlot {
    fn slots(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, RegistryError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(RegistryError::unavailable(
                LOCATION,
                std::io::Error::other("store marked unavailable"),
            ));
        }
        self.inner
            .slots
            .lock()
            .map_err(|_| RegistryError::unavailable(LOCATION, std::io::Error::other("slot map poisoned")))
    }

    fn notify(&self, old_value: Option<String>, new_value: Option<String>) {
        if old_value == new_value {
            return;
        }
        // No receivers is fine
        let _ = self.inner.tx.send(Envelope {
            origin: self.origin,
            change: SlotChange {
                key: self.key.clone(),
                old_value,
                new_value,
            },
        });
    }
}

impl Registry for MemorySlot {
    fn key(&self) -> &str {
        &self.key
    }

    fn read(&self) -> Result<Option<String>, RegistryError> {
        Ok(self.slots()?.get(&self.key).cloned())
    }

    fn write(&self, value: &str) -> Result<(), RegistryError> {
        debug!(key = %self.key, origin = self.origin, %value, "MemorySlot::write: called");
        let old_value = {
            let mut slots = self.slots()?;
            slots.insert(self.key.clone(), value.to_string())
        };
        self.notify(old_value, Some(value.to_string()));
        Ok(())
    }

    fn clear_if_owned_by(&self, value: &str) -> Result<bool, RegistryError> {
        debug!(key = %self.key, origin = self.origin, %value, "MemorySlot::clear_if_owned_by: called");
        let removed = {
            let mut slots = self.slots()?;
            if slots.get(&self.key).map(String::as_str) == Some(value) {
                slots.remove(&self.key)
            } else {
                None
            }
        };
        match removed {
            Some(old) => {
                self.notify(Some(old), None);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn subscribe(&self) -> ChangeSubscription {
        ChangeSubscription::new(self.inner.tx.subscribe(), self.key.clone(), Some(self.origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SlotEvent;
    use proptest::prelude::*;

    #[test]
    fn test_read_write_clear() {
        let store = MemoryStore::new();
        let slot = store.slot("k");

        assert_eq!(slot.read().unwrap(), None);
        slot.write("a").unwrap();
        assert_eq!(slot.read().unwrap(), Some("a".to_string()));
        assert!(!slot.clear_if_owned_by("b").unwrap());
        assert_eq!(slot.read().unwrap(), Some("a".to_string()));
        assert!(slot.clear_if_owned_by("a").unwrap());
        assert_eq!(slot.read().unwrap(), None);
    }

    #[test]
    fn test_views_share_state() {
        let store = MemoryStore::new();
        let a = store.slot("k");
        let b = store.slot("k");

        a.write("a").unwrap();
        assert_eq!(b.read().unwrap(), Some("a".to_string()));
        assert_eq!(store.peek("k"), Some("a".to_string()));
    }

    #[test]
    fn test_writer_is_not_notified_of_own_write() {
        let store = MemoryStore::new();
        let a = store.slot("k");
        let b = store.slot("k");
        let mut a_sub = a.subscribe();
        let mut b_sub = b.subscribe();

        a.write("a").unwrap();

        assert!(a_sub.try_recv().is_none());
        match b_sub.try_recv() {
            Some(SlotEvent::Changed(change)) => {
                assert_eq!(change.old_value, None);
                assert_eq!(change.new_value.as_deref(), Some("a"));
            }
            other => panic!("Expected change, got {:?}", other),
        }
    }

    #[test]
    fn test_rewrite_of_same_value_is_silent() {
        let store = MemoryStore::new();
        let a = store.slot("k");
        let b = store.slot("k");
        let mut b_sub = b.subscribe();

        a.write("a").unwrap();
        a.write("a").unwrap();

        assert!(b_sub.try_recv().is_some());
        assert!(b_sub.try_recv().is_none());
    }

    #[test]
    fn test_failed_clear_does_not_notify() {
        let store = MemoryStore::new();
        let a = store.slot("k");
        let b = store.slot("k");
        a.write("a").unwrap();
        let mut a_sub = a.subscribe();

        assert!(!b.clear_if_owned_by("b").unwrap());
        assert!(a_sub.try_recv().is_none());
    }

    #[test]
    fn test_unavailable_store_errors() {
        let store = MemoryStore::new();
        let slot = store.slot("k");
        slot.write("a").unwrap();

        store.set_unavailable(true);
        assert!(matches!(slot.read(), Err(RegistryError::Unavailable { .. })));
        assert!(slot.write("b").is_err());
        assert!(slot.clear_if_owned_by("a").is_err());

        store.set_unavailable(false);
        assert_eq!(slot.read().unwrap(), Some("a".to_string()));
    }

    proptest! {
        #[test]
        fn prop_clear_only_removes_matching_value(current in "[a-c]", candidate in "[a-c]") {
            let store = MemoryStore::new();
            let slot = store.slot("k");
            slot.write(&current).unwrap();

            let cleared = slot.clear_if_owned_by(&candidate).unwrap();

            prop_assert_eq!(cleared, current == candidate);
            if cleared {
                prop_assert_eq!(slot.read().unwrap(), None);
            } else {
                prop_assert_eq!(slot.read().unwrap(), Some(current));
            }
        }
    }
}
