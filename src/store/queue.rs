//! Pending mutation queue.
//!
//! Records locally captured write intents until the synchronizer confirms
//! them against the remote store. The queue is strictly FIFO: operations are
//! replayed in creation order, and clearing a confirmed subset preserves the
//! relative order of survivors.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::kv::KeyValueStore;

const QUEUE_KEY: &str = "pending:queue";
const POISON_KEY: &str = "pending:poisoned";

/// Target effect of a pending operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    ProgressUpsert,
    QuizScoreInsert,
    SummaryUpsert,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::ProgressUpsert => "progress-upsert",
            OperationKind::QuizScoreInsert => "quiz-score-insert",
            OperationKind::SummaryUpsert => "summary-upsert",
        }
    }
}

/// A locally recorded intent to change remote state, not yet confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: Uuid,
    pub kind: OperationKind,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// Failed sync passes so far; bounded by the queue's attempt limit.
    #[serde(default)]
    pub attempts: u32,
}

impl PendingOperation {
    pub fn new(kind: OperationKind, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            payload,
            created_at: Utc::now(),
            attempts: 0,
        }
    }
}

/// Persisted FIFO queue of pending operations.
///
/// An operation leaves the live queue in exactly one of two ways: its id is
/// passed to [`clear`](PendingQueue::clear) after unambiguous remote success,
/// or it exhausts its retry budget and moves to the poison list.
pub struct PendingQueue {
    store: Arc<dyn KeyValueStore>,
    ops: Mutex<Vec<PendingOperation>>,
    poisoned: Mutex<Vec<PendingOperation>>,
    max_attempts: u32,
}

impl PendingQueue {
    /// Load the queue from storage, restoring operations captured in an
    /// earlier session that was closed mid-flight.
    pub fn load(store: Arc<dyn KeyValueStore>, max_attempts: u32) -> Self {
        let ops = read_list(store.as_ref(), QUEUE_KEY);
        let poisoned = read_list(store.as_ref(), POISON_KEY);
        if !ops.is_empty() {
            debug!(count = ops.len(), "Restored pending operations from storage");
        }
        Self {
            store,
            ops: Mutex::new(ops),
            poisoned: Mutex::new(poisoned),
            max_attempts,
        }
    }

    /// Append an operation and persist immediately.
    pub fn enqueue(&self, op: PendingOperation) {
        debug!(op_id = %op.id, kind = op.kind.as_str(), "Enqueueing pending operation");
        let mut ops = self.ops.lock().unwrap();
        ops.push(op);
        self.persist(QUEUE_KEY, &ops);
    }

    /// The current ordered queue, without clearing it.
    pub fn snapshot(&self) -> Vec<PendingOperation> {
        self.ops.lock().unwrap().clone()
    }

    /// Remove exactly the confirmed subset, preserving the order of the rest.
    pub fn clear(&self, ids: &[Uuid]) {
        if ids.is_empty() {
            return;
        }
        let mut ops = self.ops.lock().unwrap();
        ops.retain(|op| !ids.contains(&op.id));
        self.persist(QUEUE_KEY, &ops);
    }

    /// Record a failed pass for each id. Operations that exhaust the attempt
    /// limit are moved to the poison list instead of retrying forever.
    pub fn record_failure(&self, ids: &[Uuid]) {
        if ids.is_empty() {
            return;
        }
        let mut ops = self.ops.lock().unwrap();
        let mut poisoned = self.poisoned.lock().unwrap();

        for op in ops.iter_mut() {
            if ids.contains(&op.id) {
                op.attempts += 1;
            }
        }

        let limit = self.max_attempts;
        let (dead, live): (Vec<_>, Vec<_>) = ops.drain(..).partition(|op| op.attempts >= limit);
        *ops = live;
        for op in dead {
            warn!(
                op_id = %op.id,
                kind = op.kind.as_str(),
                attempts = op.attempts,
                "Operation exhausted retry budget; marking poisoned"
            );
            poisoned.push(op);
        }

        self.persist(QUEUE_KEY, &ops);
        self.persist(POISON_KEY, &poisoned);
    }

    /// Operations that exhausted their retry budget, for UI surfacing.
    pub fn poisoned(&self) -> Vec<PendingOperation> {
        self.poisoned.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.ops.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.lock().unwrap().is_empty()
    }

    fn persist(&self, key: &str, ops: &[PendingOperation]) {
        let payload = match serde_json::to_string(ops) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize pending operations");
                return;
            }
        };
        if let Err(e) = self.store.set(key, &payload) {
            warn!(key, error = %e, "Failed to persist pending operations");
        }
    }
}

fn read_list(store: &dyn KeyValueStore, key: &str) -> Vec<PendingOperation> {
    let Some(payload) = store.get(key) else {
        return Vec::new();
    };
    match serde_json::from_str(&payload) {
        Ok(ops) => ops,
        Err(e) => {
            warn!(key, error = %e, "Discarding corrupt pending-operation list");
            store.remove(key);
            Vec::new()
        }
    }
}
