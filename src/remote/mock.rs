//! Mock remote store for testing.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::traits::{RemoteError, RemoteStore};
use crate::store::queue::{OperationKind, PendingOperation};

/// Mock remote store with scripted failures and an upsert-keyed state map.
///
/// State is keyed by `{kind}/{entity id}` so duplicate delivery of the same
/// operation converges on one row, mirroring the real upsert contract.
#[derive(Default)]
pub struct MockRemoteStore {
    state: Mutex<HashMap<String, serde_json::Value>>,
    fail_kinds: Mutex<HashSet<OperationKind>>,
    reject_kinds: Mutex<HashSet<OperationKind>>,
    call_count: AtomicU32,
}

impl MockRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a transient network failure for a kind.
    pub fn with_network_failure(self, kind: OperationKind) -> Self {
        self.fail_kinds.lock().unwrap().insert(kind);
        self
    }

    /// Script a remote rejection for a kind.
    pub fn with_rejection(self, kind: OperationKind) -> Self {
        self.reject_kinds.lock().unwrap().insert(kind);
        self
    }

    /// Clear scripted failures, as when the remote recovers.
    pub fn heal(&self) {
        self.fail_kinds.lock().unwrap().clear();
        self.reject_kinds.lock().unwrap().clear();
    }

    /// Number of apply calls made.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Final remote state: one entry per upsert key.
    pub fn state(&self) -> HashMap<String, serde_json::Value> {
        self.state.lock().unwrap().clone()
    }

    fn upsert_key(op: &PendingOperation) -> String {
        let entity = op
            .payload
            .get("content_id")
            .or_else(|| op.payload.get("quiz_id"))
            .or_else(|| op.payload.get("id"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| op.id.to_string());
        format!("{}/{}", op.kind.as_str(), entity)
    }
}

#[async_trait]
impl RemoteStore for MockRemoteStore {
    async fn apply(&self, op: &PendingOperation) -> Result<(), RemoteError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if self.fail_kinds.lock().unwrap().contains(&op.kind) {
            return Err(RemoteError::Network("connection reset".to_string()));
        }
        if self.reject_kinds.lock().unwrap().contains(&op.kind) {
            return Err(RemoteError::Rejected {
                status: 400,
                message: "invalid payload".to_string(),
            });
        }

        self.state
            .lock()
            .unwrap()
            .insert(Self::upsert_key(op), op.payload.clone());
        Ok(())
    }
}
