//! Durable record cache.
//!
//! Namespaced full-snapshot storage for domain records (content, quizzes,
//! progress, scores, summaries). Every successful fetch replaces the whole
//! namespace; there is no partial-field merge. Reads never fail: a missing
//! or corrupt snapshot is an empty one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::kv::KeyValueStore;

/// Namespaced snapshot cache over a [`KeyValueStore`].
///
/// Keeps an in-memory mirror so that a failed backing write still leaves the
/// session reading its own data; the `is_degraded` flag tells the UI layer
/// that offline work may not survive a reload.
pub struct DurableCache {
    store: Arc<dyn KeyValueStore>,
    mirror: Mutex<HashMap<String, String>>,
    degraded: AtomicBool,
}

impl DurableCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            mirror: Mutex::new(HashMap::new()),
            degraded: AtomicBool::new(false),
        }
    }

    /// Replace the full snapshot for a namespace.
    pub fn put<T: Serialize>(&self, namespace: &str, records: &[T]) {
        let payload = match serde_json::to_string(records) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(namespace, error = %e, "Failed to serialize cache snapshot");
                return;
            }
        };

        self.mirror
            .lock()
            .unwrap()
            .insert(namespace.to_string(), payload.clone());

        if let Err(e) = self.store.set(&storage_key(namespace), &payload) {
            warn!(namespace, error = %e, "Cache write failed; data is session-only");
            self.degraded.store(true, Ordering::SeqCst);
        }
    }

    /// Replace the snapshot for a namespace, retaining only the most recent
    /// `max` records. Used for transient namespaces such as chat history.
    pub fn put_capped<T: Serialize>(&self, namespace: &str, records: &[T], max: usize) {
        let start = records.len().saturating_sub(max);
        self.put(namespace, &records[start..]);
    }

    /// Read the last snapshot for a namespace.
    ///
    /// Never errors: a missing namespace is empty, and an unparsable payload
    /// is logged, discarded from storage, and treated as empty.
    pub fn get<T: DeserializeOwned>(&self, namespace: &str) -> Vec<T> {
        let payload = {
            let mut mirror = self.mirror.lock().unwrap();
            match mirror.get(namespace) {
                Some(payload) => payload.clone(),
                None => match self.store.get(&storage_key(namespace)) {
                    Some(payload) => {
                        mirror.insert(namespace.to_string(), payload.clone());
                        payload
                    }
                    None => return Vec::new(),
                },
            }
        };

        match serde_json::from_str(&payload) {
            Ok(records) => records,
            Err(e) => {
                warn!(namespace, error = %e, "Discarding corrupt cache snapshot");
                self.mirror.lock().unwrap().remove(namespace);
                self.store.remove(&storage_key(namespace));
                Vec::new()
            }
        }
    }

    /// Drop a namespace entirely ("forget this entity").
    pub fn forget(&self, namespace: &str) {
        debug!(namespace, "Forgetting cached namespace");
        self.mirror.lock().unwrap().remove(namespace);
        self.store.remove(&storage_key(namespace));
    }

    /// Whether a backing write has failed this session.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }
}

fn storage_key(namespace: &str) -> String {
    format!("cache:{namespace}")
}
