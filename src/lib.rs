//! Offline-resilience core for a bilingual learning platform.
//!
//! Keeps the client working, with integrity guarantees, while connectivity
//! is absent, intermittent, or recovering:
//! - Durable cache of domain records plus a FIFO queue of not-yet-committed
//!   mutations
//! - Connectivity-triggered synchronizer that drains the queue against the
//!   remote store
//! - Line-buffered decoder for a token-streamed assistant response
//! - Deterministic keyword-scored offline answer engine
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              ChatOrchestrator                │
//! │   (stream when online, matcher when not)     │
//! └───────┬───────────────┬──────────────────────┘
//!         ▼               ▼
//! ┌──────────────┐ ┌───────────────┐ ┌──────────────┐
//! │ ChatTransport│ │ KnowledgeBase │ │ Synchronizer │
//! │ (SseDecoder) │ │   (matcher)   │ │  (replays)   │
//! └──────────────┘ └───────────────┘ └──────┬───────┘
//!         ▲                                 ▼
//! ┌───────┴──────────┐         ┌────────────────────┐
//! │ Connectivity     │         │ DurableCache +     │
//! │ Monitor (watch)  │         │ PendingQueue (kv)  │
//! └──────────────────┘         └────────────────────┘
//! ```

pub mod chat;
pub mod config;
pub mod connectivity;
pub mod remote;
pub mod store;
pub mod stream;
pub mod sync;

// Re-export main types for convenience
pub use chat::{
    ChatError, ChatMessage, ChatOrchestrator, ChatRequest, ChatTransport, ChatUpdate,
    HttpChatClient, KnowledgeBase, KnowledgeEntry, Language, LocalizedAnswer, MockChatTransport,
    Role,
};
pub use config::{ChatConfig, CoreConfig, StorageConfig, SyncConfig};
pub use connectivity::ConnectivityMonitor;
pub use remote::{HttpRemoteStore, MockRemoteStore, RemoteError, RemoteStore};
pub use store::{
    DurableCache, KeyValueStore, MemoryStore, OperationKind, PendingOperation, PendingQueue,
    StorageError,
};
pub use stream::{
    SseDecoder, SseEvent, StreamChunk, StreamEnd, StreamOutcome, TokenStream, TokenStreamSender,
};
pub use sync::{SyncStatus, Synchronizer};
