//! Chat: streamed assistant answers with a deterministic offline fallback.

pub mod client;
pub mod knowledge;
pub mod orchestrator;
pub mod types;

pub use client::{ChatError, ChatRequest, ChatTransport, HttpChatClient, MockChatTransport};
pub use knowledge::{KnowledgeBase, KnowledgeEntry, LocalizedAnswer};
pub use orchestrator::{ChatOrchestrator, ChatUpdate};
pub use types::{ChatMessage, Language, Role};
