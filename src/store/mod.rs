//! Durable local storage: record cache and pending mutation queue.

pub mod cache;
pub mod kv;
pub mod queue;

pub use cache::DurableCache;
pub use kv::{KeyValueStore, MemoryStore, StorageError};
pub use queue::{OperationKind, PendingOperation, PendingQueue};
