use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::io::lock::{LockError, StoreLock};
use crate::io::recovery::{self, RecoveryCategory, RecoveryEntry};

/// Error type for slot reads and writes
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("could not access slot '{slot}': {source}")]
    Io {
        slot: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("could not encode slot contents: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("slot '{slot}' needs {needed} bytes but the store quota is {quota}")]
    QuotaExceeded {
        slot: String,
        needed: usize,
        quota: usize,
    },
    #[error("store unavailable for slot '{slot}'")]
    Unavailable { slot: String },
    /// The slot exists but its bytes are not UTF-8. `lossy` holds them with
    /// invalid sequences replaced, so they can still be preserved.
    #[error("slot '{slot}' is not valid UTF-8")]
    NotText { slot: String, lossy: String },
}

/// Durable key-value storage: one string value per named slot.
pub trait SlotStore {
    /// Read a slot. `Ok(None)` means the slot was never written.
    fn read_slot(&self, slot: &str) -> Result<Option<String>, StorageError>;

    /// Overwrite a slot with `value`.
    fn write_slot(&mut self, slot: &str, value: &str) -> Result<(), StorageError>;

    /// Keep a copy of slot contents that could not be parsed, before the
    /// caller falls back to a default. Contents equal to the copy most
    /// recently kept for the same slot are not kept again. Stores without a
    /// side channel drop it.
    fn preserve_unreadable(&self, _slot: &str, _raw: &str, _detail: &str) {}
}

impl<S: SlotStore + ?Sized> SlotStore for &mut S {
    fn read_slot(&self, slot: &str) -> Result<Option<String>, StorageError> {
        (**self).read_slot(slot)
    }

    fn write_slot(&mut self, slot: &str, value: &str) -> Result<(), StorageError> {
        (**self).write_slot(slot, value)
    }

    fn preserve_unreadable(&self, slot: &str, raw: &str, detail: &str) {
        (**self).preserve_unreadable(slot, raw, detail)
    }
}

// ---------------------------------------------------------------------------
// Directory-backed store
// ---------------------------------------------------------------------------

/// Each slot is a file named after the slot inside `dir`. Writes are atomic
/// and serialized across processes by [`StoreLock`].
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    /// Open (creating if needed) a store directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StorageError::Io {
            slot: dir.display().to_string(),
            source: e,
        })?;
        Ok(DirStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, slot: &str) -> PathBuf {
        self.dir.join(slot)
    }
}

impl SlotStore for DirStore {
    fn read_slot(&self, slot: &str) -> Result<Option<String>, StorageError> {
        let bytes = match fs::read(self.slot_path(slot)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::Io {
                    slot: slot.to_string(),
                    source: e,
                });
            }
        };
        String::from_utf8(bytes).map(Some).map_err(|e| StorageError::NotText {
            slot: slot.to_string(),
            lossy: String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    fn write_slot(&mut self, slot: &str, value: &str) -> Result<(), StorageError> {
        let _lock = StoreLock::acquire_default(&self.dir)?;
        if let Err(e) = recovery::atomic_write(&self.slot_path(slot), value.as_bytes()) {
            recovery::log_recovery(
                &self.dir,
                &RecoveryEntry::now(RecoveryCategory::Write, slot, e.to_string(), value),
            );
            return Err(StorageError::Io {
                slot: slot.to_string(),
                source: e,
            });
        }
        Ok(())
    }

    fn preserve_unreadable(&self, slot: &str, raw: &str, detail: &str) {
        let already_kept = recovery::read_recovery_entries(&self.dir, None)
            .into_iter()
            .find(|e| e.category == RecoveryCategory::Corrupt && e.slot == slot)
            .is_some_and(|e| e.body == raw);
        if already_kept {
            return;
        }
        recovery::log_recovery(
            &self.dir,
            &RecoveryEntry::now(RecoveryCategory::Corrupt, slot, detail, raw),
        );
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Process-local store. Supports a byte quota and forced write failures so
/// storage errors can be exercised without a real disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slots: IndexMap<String, String>,
    quota: Option<usize>,
    fail_writes: bool,
    writes: usize,
    unreadable: RefCell<Vec<(String, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the total size of all slot values, in bytes
    pub fn with_quota(quota: usize) -> Self {
        MemoryStore {
            quota: Some(quota),
            ..Self::default()
        }
    }

    /// Pre-populate a slot without counting it as a write
    pub fn with_slot(mut self, slot: &str, value: &str) -> Self {
        self.slots.insert(slot.to_string(), value.to_string());
        self
    }

    /// Make every subsequent write fail with `StorageError::Unavailable`
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn get(&self, slot: &str) -> Option<&str> {
        self.slots.get(slot).map(|s| s.as_str())
    }

    /// Slot names, in first-write order
    pub fn slot_names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(|s| s.as_str())
    }

    /// Number of successful writes so far
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Contents handed to [`SlotStore::preserve_unreadable`], as `(slot, raw)`
    pub fn unreadable(&self) -> Vec<(String, String)> {
        self.unreadable.borrow().clone()
    }
}

impl SlotStore for MemoryStore {
    fn read_slot(&self, slot: &str) -> Result<Option<String>, StorageError> {
        Ok(self.slots.get(slot).cloned())
    }

    fn write_slot(&mut self, slot: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Unavailable {
                slot: slot.to_string(),
            });
        }
        if let Some(quota) = self.quota {
            let others: usize = self
                .slots
                .iter()
                .filter(|(k, _)| k.as_str() != slot)
                .map(|(_, v)| v.len())
                .sum();
            let needed = others + value.len();
            if needed > quota {
                return Err(StorageError::QuotaExceeded {
                    slot: slot.to_string(),
                    needed,
                    quota,
                });
            }
        }
        self.slots.insert(slot.to_string(), value.to_string());
        self.writes += 1;
        Ok(())
    }

    fn preserve_unreadable(&self, slot: &str, raw: &str, _detail: &str) {
        let mut kept = self.unreadable.borrow_mut();
        let latest = kept.iter().rev().find(|(s, _)| s == slot);
        if latest.is_some_and(|(_, r)| r == raw) {
            return;
        }
        kept.push((slot.to_string(), raw.to_string()));
    }
}
