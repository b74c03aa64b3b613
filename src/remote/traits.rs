//! Remote store boundary.
//!
//! The synchronizer replays pending operations through this trait. The
//! remote side must expose idempotent upsert semantics for progress-type
//! records: an operation resent after an ambiguous failure lands on the same
//! `{user_id, entity_id}` row.

use async_trait::async_trait;

use crate::store::queue::PendingOperation;

/// Error types for remote application.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Transient transport failure; the operation stays queued.
    #[error("Network error: {0}")]
    Network(String),

    /// The remote store rejected the operation itself.
    #[error("Remote rejected operation: HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Operation payload could not be serialized for the wire.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RemoteError {
    /// Whether a retry on the next connectivity edge could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Network(_))
    }
}

/// Apply pending operations against the remote store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Apply one operation. `Ok(())` is the only unambiguous success; any
    /// error leaves the operation queued for a later pass.
    async fn apply(&self, op: &PendingOperation) -> Result<(), RemoteError>;
}
