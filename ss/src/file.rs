//! File-backed slot store shared between processes
//!
//! Values live in `{dir}/{key}.slot`; an empty slot has no file. Writes and
//! compare-and-delete hold an exclusive advisory lock on `{dir}/{key}.lock`,
//! reads hold a shared one, so compare-and-delete is atomic across processes.
//!
//! Files do not notify on their own. [`FileSlot::poll`] compares the on-disk
//! value with the last one this handle saw and broadcasts the difference;
//! [`crate::SlotWatcher`] calls it on an interval.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use fs2::FileExt;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::registry::{ChangeSubscription, Envelope, Registry, RegistryError, SlotChange};

const SLOT_EXTENSION: &str = "slot";
const LOCK_EXTENSION: &str = "lock";

/// Origin tag for changes discovered by polling
const EXTERNAL_ORIGIN: u64 = 0;

/// A directory of slots
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open or create a store at the given directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| RegistryError::unavailable(dir.display().to_string(), e))?;
        debug!(?dir, "Opened slot store");
        Ok(Self { dir })
    }

    /// Directory backing this store
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Open a handle on `key`
    pub fn slot(&self, key: impl Into<String>) -> FileSlot {
        FileSlot::new(&self.dir, key.into())
    }

    /// Keys that currently hold a value
    pub fn keys(&self) -> Result<Vec<String>, RegistryError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| RegistryError::unavailable(self.location(), e))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RegistryError::unavailable(self.location(), e))?;
            let path = entry.path();
            if path.extension().is_some_and(|e| e == SLOT_EXTENSION)
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }
}

/// Handle on one slot of a [`FileStore`]
pub struct FileSlot {
    dir: PathBuf,
    key: String,
    value_path: PathBuf,
    lock_path: PathBuf,
    /// Last value this handle wrote or polled; guards own-write suppression
    last_seen: Mutex<Option<String>>,
    tx: broadcast::Sender<Envelope>,
}

/// Advisory lock held until drop
struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl FileSlot {
    fn new(dir: &Path, key: String) -> Self {
        let value_path = dir.join(format!("{}.{}", key, SLOT_EXTENSION));
        let lock_path = dir.join(format!("{}.{}", key, LOCK_EXTENSION));
        let initial = read_value(&value_path).ok().flatten();
        debug!(%key, ?value_path, ?initial, "FileSlot::new: called");
        let (tx, _) = broadcast::channel(crate::DEFAULT_CHANNEL_CAPACITY);
        Self {
            dir: dir.to_path_buf(),
            key,
            value_path,
            lock_path,
            last_seen: Mutex::new(initial),
            tx,
        }
    }

    /// Path of the value file
    pub fn value_path(&self) -> &Path {
        &self.value_path
    }

    fn location(&self) -> String {
        self.value_path.display().to_string()
    }

    fn open_lock(&self) -> Result<File, RegistryError> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| RegistryError::unavailable(self.lock_path.display().to_string(), e))
    }

    fn lock_shared(&self) -> Result<LockGuard, RegistryError> {
        let file = self.open_lock()?;
        FileExt::lock_shared(&file).map_err(|e| RegistryError::unavailable(self.lock_path.display().to_string(), e))?;
        Ok(LockGuard { file })
    }

    fn lock_exclusive(&self) -> Result<LockGuard, RegistryError> {
        let file = self.open_lock()?;
        FileExt::lock_exclusive(&file)
            .map_err(|e| RegistryError::unavailable(self.lock_path.display().to_string(), e))?;
        Ok(LockGuard { file })
    }

    fn last_seen(&self) -> Result<MutexGuard<'_, Option<String>>, RegistryError> {
        self.last_seen
            .lock()
            .map_err(|_| RegistryError::unavailable(self.location(), std::io::Error::other("slot state poisoned")))
    }

    /// Check the file for changes made by other handles
    ///
    /// Returns true and notifies subscribers if the value differs from the
    /// last one this handle wrote or polled.
    pub fn poll(&self) -> Result<bool, RegistryError> {
        let mut last_seen = self.last_seen()?;
        let current = {
            let _lock = self.lock_shared()?;
            read_value(&self.value_path)?
        };

        if *last_seen == current {
            return Ok(false);
        }

        debug!(key = %self.key, old = ?*last_seen, new = ?current, "FileSlot::poll: change detected");
        let old_value = std::mem::replace(&mut *last_seen, current.clone());
        let _ = self.tx.send(Envelope {
            origin: EXTERNAL_ORIGIN,
            change: SlotChange {
                key: self.key.clone(),
                old_value,
                new_value: current,
            },
        });
        Ok(true)
    }
}

impl Registry for FileSlot {
    fn key(&self) -> &str {
        &self.key
    }

    fn read(&self) -> Result<Option<String>, RegistryError> {
        let _lock = self.lock_shared()?;
        read_value(&self.value_path)
    }

    fn write(&self, value: &str) -> Result<(), RegistryError> {
        debug!(key = %self.key, %value, "FileSlot::write: called");
        let mut last_seen = self.last_seen()?;
        let _lock = self.lock_exclusive()?;

        let tmp_path = self.dir.join(format!(".{}.{}.tmp", self.key, Uuid::now_v7()));
        fs::write(&tmp_path, value).map_err(|e| RegistryError::unavailable(tmp_path.display().to_string(), e))?;
        if let Err(e) = fs::rename(&tmp_path, &self.value_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(RegistryError::unavailable(self.location(), e));
        }

        *last_seen = Some(value.to_string());
        Ok(())
    }

    fn clear_if_owned_by(&self, value: &str) -> Result<bool, RegistryError> {
        debug!(key = %self.key, %value, "FileSlot::clear_if_owned_by: called");
        let mut last_seen = self.last_seen()?;
        let _lock = self.lock_exclusive()?;

        let current = read_value(&self.value_path)?;
        if current.as_deref() != Some(value) {
            debug!(key = %self.key, ?current, "FileSlot::clear_if_owned_by: not owner, leaving slot");
            return Ok(false);
        }

        match fs::remove_file(&self.value_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(RegistryError::unavailable(self.location(), e)),
        }
        *last_seen = None;
        info!(key = %self.key, %value, "Slot cleared");
        Ok(true)
    }

    fn subscribe(&self) -> ChangeSubscription {
        ChangeSubscription::new(self.tx.subscribe(), self.key.clone(), None)
    }
}

fn read_value(path: &Path) -> Result<Option<String>, RegistryError> {
    match fs::read(path) {
        Ok(bytes) => String::from_utf8(bytes).map(Some).map_err(|_| RegistryError::Corrupt {
            location: path.display().to_string(),
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RegistryError::unavailable(path.display().to_string(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SlotEvent;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("nested").join("slots");
        let store = FileStore::open(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(store.dir(), dir.as_path());
    }

    #[test]
    fn test_write_read_clear() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).unwrap();
        let slot = store.slot("active");

        assert_eq!(slot.read().unwrap(), None);
        slot.write("instance-a").unwrap();
        assert_eq!(slot.read().unwrap(), Some("instance-a".to_string()));
        assert_eq!(fs::read_to_string(slot.value_path()).unwrap(), "instance-a");

        assert!(!slot.clear_if_owned_by("instance-b").unwrap());
        assert!(slot.value_path().exists());

        assert!(slot.clear_if_owned_by("instance-a").unwrap());
        assert!(!slot.value_path().exists());
        assert_eq!(slot.read().unwrap(), None);
    }

    #[test]
    fn test_handles_share_the_file() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).unwrap();
        let a = store.slot("active");
        let b = store.slot("active");

        a.write("a").unwrap();
        b.write("b").unwrap();

        assert!(!a.clear_if_owned_by("a").unwrap());
        assert_eq!(a.read().unwrap(), Some("b".to_string()));
    }

    #[test]
    fn test_poll_ignores_own_writes() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).unwrap();
        let slot = store.slot("active");
        let mut sub = slot.subscribe();

        slot.write("a").unwrap();
        assert!(!slot.poll().unwrap());
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_poll_reports_external_changes() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).unwrap();
        let watcher = store.slot("active");
        let writer = store.slot("active");
        let mut sub = watcher.subscribe();

        writer.write("b").unwrap();
        assert!(watcher.poll().unwrap());
        match sub.try_recv() {
            Some(SlotEvent::Changed(change)) => {
                assert_eq!(change.old_value, None);
                assert_eq!(change.new_value.as_deref(), Some("b"));
            }
            other => panic!("Expected change, got {:?}", other),
        }

        // Nothing new on the second poll
        assert!(!watcher.poll().unwrap());

        writer.clear_if_owned_by("b").unwrap();
        assert!(watcher.poll().unwrap());
        match sub.try_recv() {
            Some(SlotEvent::Changed(change)) => assert_eq!(change.new_value, None),
            other => panic!("Expected change, got {:?}", other),
        }
    }

    #[test]
    fn test_existing_value_is_not_reported_as_change() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).unwrap();
        store.slot("active").write("a").unwrap();

        let late = store.slot("active");
        assert!(!late.poll().unwrap());
    }

    #[test]
    fn test_keys_lists_occupied_slots() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).unwrap();
        store.slot("beta").write("1").unwrap();
        store.slot("alpha").write("2").unwrap();
        let empty = store.slot("gamma");
        empty.write("3").unwrap();
        empty.clear_if_owned_by("3").unwrap();

        assert_eq!(store.keys().unwrap(), vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn test_corrupt_value_is_reported() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).unwrap();
        let slot = store.slot("active");
        fs::write(slot.value_path(), [0xff, 0xfe, 0x00]).unwrap();

        assert!(matches!(slot.read(), Err(RegistryError::Corrupt { .. })));
    }
}
