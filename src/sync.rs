//! Synchronizer — drains the pending queue when connectivity returns.
//!
//! Two states, Idle and Syncing. A false→true connectivity edge, after a
//! short settle delay, triggers exactly one pass: snapshot the queue, replay
//! each operation in FIFO order against the remote store, clear the
//! confirmed subset, record failures. Edges arriving mid-pass coalesce into
//! at most one follow-up pass. Failed operations wait for the next edge
//! rather than retrying within the pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::remote::traits::RemoteStore;
use crate::store::queue::PendingQueue;

/// Observable outcome of synchronization.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Operations still queued after the last pass, not the pre-pass count.
    pub pending_count: usize,
    /// Operations that exhausted their retry budget.
    pub poisoned_count: usize,
    /// True only if the last pass ended with zero remaining failures.
    pub sync_success: bool,
}

/// Replays the pending queue against the remote store on connectivity edges.
pub struct Synchronizer {
    queue: Arc<PendingQueue>,
    remote: Arc<dyn RemoteStore>,
    status_tx: watch::Sender<SyncStatus>,
    settle_delay: Duration,
}

impl Synchronizer {
    pub fn new(queue: Arc<PendingQueue>, remote: Arc<dyn RemoteStore>, config: &SyncConfig) -> Self {
        let initial = SyncStatus {
            is_syncing: false,
            last_sync_time: None,
            pending_count: queue.len(),
            poisoned_count: queue.poisoned().len(),
            sync_success: true,
        };
        let (status_tx, _rx) = watch::channel(initial);
        Self {
            queue,
            remote,
            status_tx,
            settle_delay: Duration::from_millis(config.settle_delay_ms),
        }
    }

    /// Current sync status.
    pub fn status(&self) -> SyncStatus {
        self.status_tx.borrow().clone()
    }

    /// Subscribe to status changes.
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    /// Run the edge-triggered sync loop until the connectivity sender drops.
    ///
    /// The loop is sequential, so at most one pass runs at a time; a watch
    /// update arriving mid-pass is observed once the pass finishes, yielding
    /// exactly one additional pass rather than one per edge.
    pub async fn run(&self, mut connectivity: watch::Receiver<bool>) {
        while connectivity.changed().await.is_ok() {
            let online = *connectivity.borrow_and_update();
            if !online {
                debug!("Connectivity lost; synchronizer idle");
                continue;
            }

            // Settle before trusting a freshly recovered connection
            tokio::time::sleep(self.settle_delay).await;
            if !*connectivity.borrow() {
                debug!("Connection flapped back offline during settle delay");
                continue;
            }

            self.sync_now().await;
        }
    }

    /// Run one synchronization pass immediately.
    pub async fn sync_now(&self) {
        let ops = self.queue.snapshot();
        self.status_tx.send_modify(|s| {
            s.is_syncing = true;
            s.pending_count = ops.len();
        });

        if ops.is_empty() {
            debug!("Sync pass with empty queue");
        } else {
            info!(pending = ops.len(), "Starting sync pass");
        }

        let mut confirmed = Vec::new();
        let mut failed = Vec::new();
        for op in &ops {
            match self.remote.apply(op).await {
                Ok(()) => {
                    debug!(op_id = %op.id, kind = op.kind.as_str(), "Operation applied remotely");
                    confirmed.push(op.id);
                }
                Err(e) => {
                    warn!(
                        op_id = %op.id,
                        kind = op.kind.as_str(),
                        transient = e.is_transient(),
                        error = %e,
                        "Operation failed; left queued for the next pass"
                    );
                    failed.push(op.id);
                }
            }
        }

        self.queue.clear(&confirmed);
        self.queue.record_failure(&failed);

        let status = SyncStatus {
            is_syncing: false,
            last_sync_time: Some(Utc::now()),
            pending_count: self.queue.len(),
            poisoned_count: self.queue.poisoned().len(),
            sync_success: failed.is_empty(),
        };
        info!(
            applied = confirmed.len(),
            remaining = status.pending_count,
            poisoned = status.poisoned_count,
            success = status.sync_success,
            "Sync pass finished"
        );
        self.status_tx.send_replace(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::mock::MockRemoteStore;
    use crate::store::kv::MemoryStore;
    use crate::store::queue::{OperationKind, PendingOperation};
    use serde_json::json;

    fn queue() -> Arc<PendingQueue> {
        Arc::new(PendingQueue::load(Arc::new(MemoryStore::default()), 5))
    }

    fn progress_op(content_id: &str) -> PendingOperation {
        PendingOperation::new(
            OperationKind::ProgressUpsert,
            json!({ "content_id": content_id, "completed": true }),
        )
    }

    #[tokio::test]
    async fn test_pass_clears_confirmed_operations() {
        let queue = queue();
        queue.enqueue(progress_op("c1"));
        queue.enqueue(progress_op("c2"));

        let remote = Arc::new(MockRemoteStore::new());
        let sync = Synchronizer::new(queue.clone(), remote.clone(), &SyncConfig::default());

        sync.sync_now().await;

        assert!(queue.is_empty());
        assert_eq!(remote.state().len(), 2);

        let status = sync.status();
        assert!(!status.is_syncing);
        assert!(status.sync_success);
        assert!(status.last_sync_time.is_some());
        assert_eq!(status.pending_count, 0);
    }

    #[tokio::test]
    async fn test_failures_remain_in_order() {
        let queue = queue();
        let score =
            PendingOperation::new(OperationKind::QuizScoreInsert, json!({ "quiz_id": "q1" }));
        let p1 = progress_op("c1");
        let p2 = progress_op("c2");
        queue.enqueue(p1.clone());
        queue.enqueue(score.clone());
        queue.enqueue(p2.clone());

        let remote =
            Arc::new(MockRemoteStore::new().with_network_failure(OperationKind::QuizScoreInsert));
        let sync = Synchronizer::new(queue.clone(), remote, &SyncConfig::default());

        sync.sync_now().await;

        let remaining = queue.snapshot();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, score.id);
        assert_eq!(remaining[0].attempts, 1);

        let status = sync.status();
        assert!(!status.sync_success);
        assert_eq!(status.pending_count, 1);
    }

    #[tokio::test]
    async fn test_failed_pass_then_recovery() {
        let queue = queue();
        queue.enqueue(progress_op("c1"));

        let remote =
            Arc::new(MockRemoteStore::new().with_network_failure(OperationKind::ProgressUpsert));
        let sync = Synchronizer::new(queue.clone(), remote.clone(), &SyncConfig::default());

        sync.sync_now().await;
        assert_eq!(queue.len(), 1);
        assert!(!sync.status().sync_success);

        remote.heal();
        sync.sync_now().await;
        assert!(queue.is_empty());
        assert!(sync.status().sync_success);
    }

    #[tokio::test]
    async fn test_rejected_operation_poisons_after_budget() {
        let store = Arc::new(MemoryStore::default());
        let queue = Arc::new(PendingQueue::load(store, 2));
        queue.enqueue(progress_op("c1"));

        let remote = Arc::new(MockRemoteStore::new().with_rejection(OperationKind::ProgressUpsert));
        let sync = Synchronizer::new(queue.clone(), remote, &SyncConfig::default());

        sync.sync_now().await;
        assert_eq!(sync.status().pending_count, 1);

        sync.sync_now().await;
        assert_eq!(sync.status().pending_count, 0);
        assert_eq!(sync.status().poisoned_count, 1);
        assert_eq!(queue.poisoned().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edge_triggers_pass_after_settle_delay() {
        let queue = queue();
        queue.enqueue(progress_op("c1"));

        let remote = Arc::new(MockRemoteStore::new());
        let sync = Arc::new(Synchronizer::new(
            queue.clone(),
            remote.clone(),
            &SyncConfig::default(),
        ));

        let (tx, rx) = watch::channel(false);
        let runner = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.run(rx).await })
        };

        tx.send(true).unwrap();
        // Inside the settle window nothing has been applied yet
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(remote.call_count(), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        tokio::task::yield_now().await;
        assert!(queue.is_empty());
        assert_eq!(remote.call_count(), 1);

        drop(tx);
        runner.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_flap_within_settle_window_skips_pass() {
        let queue = queue();
        queue.enqueue(progress_op("c1"));

        let remote = Arc::new(MockRemoteStore::new());
        let sync = Arc::new(Synchronizer::new(
            queue.clone(),
            remote.clone(),
            &SyncConfig::default(),
        ));

        let (tx, rx) = watch::channel(false);
        let runner = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.run(rx).await })
        };

        tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(false).unwrap();
        tokio::time::sleep(Duration::from_millis(2000)).await;

        assert_eq!(remote.call_count(), 0);
        assert_eq!(queue.len(), 1);

        drop(tx);
        runner.await.unwrap();
    }
}
