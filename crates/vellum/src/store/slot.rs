//! Durable key-value slots holding the serialized history.
//!
//! A slot is one named location holding text: read once at startup, written
//! on every history change. Slots may enforce a byte quota; exceeding it is
//! reported as [`SlotError::QuotaExceeded`] so the store can evict and retry.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::SlotError;

/// A single durable text slot.
pub trait KvSlot: Send {
    /// Read the slot. `Ok(None)` when nothing has been written yet.
    fn read(&self) -> Result<Option<String>, SlotError>;
    /// Replace the slot's content.
    fn write(&mut self, value: &str) -> Result<(), SlotError>;
}

fn check_quota(quota: Option<usize>, value: &str) -> Result<(), SlotError> {
    match quota {
        Some(quota) if value.len() > quota => Err(SlotError::QuotaExceeded {
            needed: value.len(),
            quota,
        }),
        _ => Ok(()),
    }
}

// ── FileSlot ───────────────────────────────────────────────────────

/// A slot backed by one file, written atomically (temp file + rename).
pub struct FileSlot {
    path: PathBuf,
    quota: Option<usize>,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>, quota: Option<usize>) -> Self {
        Self {
            path: path.into(),
            quota,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "slot".into());
        self.path.with_file_name(format!(".{name}.tmp"))
    }
}

impl KvSlot for FileSlot {
    fn read(&self) -> Result<Option<String>, SlotError> {
        if !self.path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(&self.path)?))
    }

    fn write(&mut self, value: &str) -> Result<(), SlotError> {
        check_quota(self.quota, value)?;
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = self.tmp_path();
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

// ── MemorySlot ─────────────────────────────────────────────────────

/// An in-memory slot. Clones share the same content, so a handle kept by the
/// caller observes what the store wrote.
#[derive(Clone, Default)]
pub struct MemorySlot {
    value: Arc<Mutex<Option<String>>>,
    quota: Option<usize>,
}

impl MemorySlot {
    pub fn new(quota: Option<usize>) -> Self {
        Self {
            value: Arc::default(),
            quota,
        }
    }

    /// A slot pre-filled with `value`, as if written by an earlier session.
    pub fn with_value(value: impl Into<String>, quota: Option<usize>) -> Self {
        Self {
            value: Arc::new(Mutex::new(Some(value.into()))),
            quota,
        }
    }

    pub fn contents(&self) -> Option<String> {
        self.value.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl KvSlot for MemorySlot {
    fn read(&self) -> Result<Option<String>, SlotError> {
        Ok(self.contents())
    }

    fn write(&mut self, value: &str) -> Result<(), SlotError> {
        check_quota(self.quota, value)?;
        *self.value.lock().unwrap_or_else(|e| e.into_inner()) = Some(value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_slot_roundtrip_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mut slot = FileSlot::new(dir.path().join("nested/history.json"), None);
        assert!(slot.read().unwrap().is_none());

        slot.write("[1,2,3]").unwrap();
        assert_eq!(slot.read().unwrap().as_deref(), Some("[1,2,3]"));
        assert!(!slot.tmp_path().exists());
    }

    #[test]
    fn file_slot_enforces_quota_without_touching_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut slot = FileSlot::new(dir.path().join("h.json"), Some(4));
        slot.write("abcd").unwrap();

        let err = slot.write("abcde").unwrap_err();
        assert!(matches!(
            err,
            SlotError::QuotaExceeded {
                needed: 5,
                quota: 4
            }
        ));
        assert_eq!(slot.read().unwrap().as_deref(), Some("abcd"));
    }

    #[test]
    fn memory_slot_clones_share_content() {
        let handle = MemorySlot::new(None);
        let mut writer = handle.clone();
        writer.write("x").unwrap();
        assert_eq!(handle.contents().as_deref(), Some("x"));
    }

    #[test]
    fn memory_slot_quota() {
        let mut slot = MemorySlot::new(Some(2));
        assert!(slot.write("ab").is_ok());
        assert!(slot.write("abc").is_err());
        assert_eq!(slot.contents().as_deref(), Some("ab"));
    }
}
