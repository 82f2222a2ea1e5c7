//! Key-value backends for the durable cookie store.
//!
//! The durable store only needs string keys and string values with
//! prefix enumeration. [`MemoryKv`] keeps everything in process (useful in
//! tests and as a stand-in when no data directory is available);
//! [`JsonFileKv`] mirrors the map to a single JSON file on every mutation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::persistence::write_atomic;

/// A synchronous string key-value store.
///
/// Every mutation must be durable when the call returns.
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Returns every key starting with `prefix`, in sorted order.
    fn keys_with_prefix(&self, prefix: &str) -> Vec<String>;
}

fn keys_with_prefix(map: &BTreeMap<String, String>, prefix: &str) -> Vec<String> {
    map.range(prefix.to_string()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, _)| k.clone())
        .collect()
}

// ============================================================================
// MemoryKv
// ============================================================================

/// In-process key-value store.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryKv {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        keys_with_prefix(
            &self.entries.lock().unwrap_or_else(PoisonError::into_inner),
            prefix,
        )
    }
}

// ============================================================================
// JsonFileKv
// ============================================================================

/// Key-value store persisted as one JSON object on disk.
///
/// The whole file is rewritten atomically on every mutation. A missing
/// file opens as an empty store; an unreadable one is an error.
#[derive(Debug)]
pub struct JsonFileKv {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileKv {
    /// Opens (or prepares to create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), entries = entries.len(), "Opened key-value file");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(entries)?;
        write_atomic(&self.path, &json).inspect_err(|e| {
            warn!(path = %self.path.display(), error = %e, "Failed to flush key-value file");
        })
    }
}

impl KeyValueStore for JsonFileKv {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.get(key).is_some_and(|v| v == value) {
            return Ok(());
        }
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.flush(&entries)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        keys_with_prefix(
            &self.entries.lock().unwrap_or_else(PoisonError::into_inner),
            prefix,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_kv_prefix_scan() {
        let kv = MemoryKv::new();
        kv.put("index:a.com", "x").unwrap();
        kv.put("index:b.com", "y").unwrap();
        kv.put("cookie:x", "1").unwrap();

        assert_eq!(kv.keys_with_prefix("index:"), vec!["index:a.com", "index:b.com"]);
        kv.remove("index:a.com").unwrap();
        kv.remove("missing").unwrap();
        assert_eq!(kv.len(), 2);
    }

    #[test]
    fn test_json_file_kv_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.json");

        let kv = JsonFileKv::open(&path).unwrap();
        assert!(kv.get("k").is_none());
        kv.put("k", "v").unwrap();
        kv.put("gone", "soon").unwrap();
        kv.remove("gone").unwrap();
        drop(kv);

        let reopened = JsonFileKv::open(&path).unwrap();
        assert_eq!(reopened.get("k").as_deref(), Some("v"));
        assert!(reopened.get("gone").is_none());
    }

    #[test]
    fn test_json_file_kv_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            JsonFileKv::open(&path),
            Err(StoreError::Serialization(_))
        ));
    }
}
