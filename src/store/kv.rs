//! Key-value storage boundary.
//!
//! The platform hands this crate a synchronous key -> string store with a
//! session-scoped capacity limit. `MemoryStore` is the provided
//! implementation; hosts with real persistent storage implement
//! [`KeyValueStore`] themselves.

use std::collections::HashMap;
use std::sync::Mutex;

/// Error types for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Write would exceed the session storage quota
    #[error("Storage quota exceeded ({limit_bytes} byte limit)")]
    QuotaExceeded { limit_bytes: usize },

    /// Value could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Synchronous key -> string storage.
///
/// All values are serialized structured data. A failed `set` must leave the
/// previously stored value intact.
pub trait KeyValueStore: Send + Sync {
    /// Read the stored value for a key.
    fn get(&self, key: &str) -> Option<String>;

    /// Store a value, replacing any prior value for the key.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Removing an absent key is a no-op.
    fn remove(&self, key: &str);
}

/// In-memory store with a byte quota, modeling page-session storage.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: usize,
}

impl MemoryStore {
    /// Create a store with the given byte quota.
    pub fn new(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota_bytes,
        }
    }

    /// Total bytes currently stored (keys + values).
    pub fn used_bytes(&self) -> usize {
        let entries = self.entries.lock().unwrap();
        entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        // 5 MiB, in line with common browser session storage quotas
        Self::new(5 * 1024 * 1024)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap();
        let replaced = entries.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
        let used: usize = entries.iter().map(|(k, v)| k.len() + v.len()).sum();
        if used - replaced + key.len() + value.len() > self.quota_bytes {
            return Err(StorageError::QuotaExceeded {
                limit_bytes: self.quota_bytes,
            });
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }
}
