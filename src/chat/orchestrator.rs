//! Chat orchestrator.
//!
//! Chooses the streamed transport when online and the offline knowledge
//! matcher when offline, manages per-message state, and falls back to the
//! matcher when the transport fails. The user is never blocked by
//! connectivity state: every send resolves to an answer.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::client::{ChatRequest, ChatTransport};
use super::knowledge::KnowledgeBase;
use super::types::{ChatMessage, Language};
use crate::config::ChatConfig;
use crate::store::cache::DurableCache;
use crate::stream::{StreamEnd, TokenStream};

const CHAT_HISTORY_NAMESPACE: &str = "chat-history";

/// A progress update for an in-flight assistant message.
#[derive(Debug, Clone)]
pub struct ChatUpdate {
    pub message_id: Uuid,
    /// Cumulative assistant text so far
    pub content: String,
    /// Set on the last update for this message
    pub done: bool,
    /// Whether the answer came from the offline knowledge base
    pub offline: bool,
}

/// Coordinates streamed answers, offline fallback, and message state.
pub struct ChatOrchestrator {
    transport: Arc<dyn ChatTransport>,
    knowledge: Arc<KnowledgeBase>,
    cache: Arc<DurableCache>,
    connectivity: watch::Receiver<bool>,
    messages: Arc<Mutex<Vec<ChatMessage>>>,
    language: Language,
    history_limit: usize,
}

impl ChatOrchestrator {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        knowledge: Arc<KnowledgeBase>,
        cache: Arc<DurableCache>,
        connectivity: watch::Receiver<bool>,
        config: &ChatConfig,
        language: Language,
    ) -> Self {
        Self {
            transport,
            knowledge,
            cache,
            connectivity,
            messages: Arc::new(Mutex::new(Vec::new())),
            language,
            history_limit: config.history_limit,
        }
    }

    /// Restore persisted chat history at session start.
    pub async fn load_history(&self) {
        let restored: Vec<ChatMessage> = self.cache.get(CHAT_HISTORY_NAMESPACE);
        if !restored.is_empty() {
            debug!(count = restored.len(), "Restored chat history");
            *self.messages.lock().await = restored;
        }
    }

    /// Current conversation, in append order.
    pub async fn history(&self) -> Vec<ChatMessage> {
        self.messages.lock().await.clone()
    }

    /// Whether offline work may not survive a reload (storage writes failed).
    pub fn storage_degraded(&self) -> bool {
        self.cache.is_degraded()
    }

    /// Send a user message and receive updates for the assistant's answer.
    ///
    /// The user message is appended first; the assistant message is appended
    /// with its id allocated before any content arrives, then mutated in
    /// place per fragment. Once an update with `done` is emitted the message
    /// is final.
    pub async fn send(&self, user_text: &str) -> mpsc::Receiver<ChatUpdate> {
        let (tx, rx) = mpsc::channel(32);

        let assistant_id;
        let history;
        {
            let mut messages = self.messages.lock().await;
            messages.push(ChatMessage::user(user_text));
            history = messages.clone();
            let placeholder = ChatMessage::assistant_placeholder();
            assistant_id = placeholder.id;
            messages.push(placeholder);
        }

        if !*self.connectivity.borrow() {
            debug!("Known offline; answering from knowledge base");
            self.answer_offline(user_text, assistant_id, tx).await;
            return rx;
        }

        let request = ChatRequest {
            history,
            language: self.language,
        };
        match self.transport.stream_chat(request).await {
            Ok(stream) => self.drive_stream(stream, user_text, assistant_id, tx),
            Err(e) => {
                warn!(error = %e, "Chat request failed; falling back to knowledge base");
                self.answer_offline(user_text, assistant_id, tx).await;
            }
        }
        rx
    }

    /// Resolve the message synchronously from the knowledge matcher.
    async fn answer_offline(&self, user_text: &str, assistant_id: Uuid, tx: mpsc::Sender<ChatUpdate>) {
        let answer = self.knowledge.answer(user_text, self.language).to_string();
        set_content(&self.messages, assistant_id, &answer).await;
        persist_history(&self.messages, &self.cache, self.history_limit).await;
        let _ = tx
            .send(ChatUpdate {
                message_id: assistant_id,
                content: answer,
                done: true,
                offline: true,
            })
            .await;
    }

    /// Pump a token stream into the assistant message.
    fn drive_stream(
        &self,
        mut stream: TokenStream,
        user_text: &str,
        assistant_id: Uuid,
        tx: mpsc::Sender<ChatUpdate>,
    ) {
        let messages = Arc::clone(&self.messages);
        let cache = Arc::clone(&self.cache);
        let knowledge = Arc::clone(&self.knowledge);
        let language = self.language;
        let history_limit = self.history_limit;
        let user_text = user_text.to_string();

        tokio::spawn(async move {
            while let Some(chunk) = stream.next().await {
                match chunk.end {
                    None => {
                        let content = stream.accumulated().to_string();
                        set_content(&messages, assistant_id, &content).await;
                        let update = ChatUpdate {
                            message_id: assistant_id,
                            content,
                            done: false,
                            offline: false,
                        };
                        if tx.send(update).await.is_err() {
                            // Caller navigated away; stop pulling chunks so
                            // the transport releases the byte source
                            debug!("Chat updates abandoned mid-stream");
                            return;
                        }
                    }
                    Some(StreamEnd::Done) => break,
                    Some(StreamEnd::Error(e)) => {
                        warn!(error = %e, "Stream failed mid-flight; substituting offline answer");
                        let answer = knowledge.answer(&user_text, language).to_string();
                        set_content(&messages, assistant_id, &answer).await;
                        persist_history(&messages, &cache, history_limit).await;
                        let _ = tx
                            .send(ChatUpdate {
                                message_id: assistant_id,
                                content: answer,
                                done: true,
                                offline: true,
                            })
                            .await;
                        return;
                    }
                }
            }

            let content = stream.accumulated().to_string();
            set_content(&messages, assistant_id, &content).await;
            persist_history(&messages, &cache, history_limit).await;
            info!(message_id = %assistant_id, chars = content.len(), "Assistant message complete");
            let _ = tx
                .send(ChatUpdate {
                    message_id: assistant_id,
                    content,
                    done: true,
                    offline: false,
                })
                .await;
        });
    }
}

async fn set_content(messages: &Mutex<Vec<ChatMessage>>, id: Uuid, content: &str) {
    let mut messages = messages.lock().await;
    if let Some(msg) = messages.iter_mut().find(|m| m.id == id) {
        msg.content = content.to_string();
    }
}

async fn persist_history(messages: &Mutex<Vec<ChatMessage>>, cache: &DurableCache, limit: usize) {
    let messages = messages.lock().await;
    cache.put_capped(CHAT_HISTORY_NAMESPACE, messages.as_slice(), limit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::client::MockChatTransport;
    use crate::chat::types::Role;
    use crate::store::kv::MemoryStore;

    struct Harness {
        orchestrator: ChatOrchestrator,
        transport: Arc<MockChatTransport>,
        connectivity: watch::Sender<bool>,
    }

    fn harness(transport: MockChatTransport, online: bool) -> Harness {
        let transport = Arc::new(transport);
        let cache = Arc::new(DurableCache::new(Arc::new(MemoryStore::default())));
        let (tx, rx) = watch::channel(online);
        let orchestrator = ChatOrchestrator::new(
            transport.clone(),
            Arc::new(KnowledgeBase::built_in()),
            cache,
            rx,
            &ChatConfig::default(),
            Language::En,
        );
        Harness {
            orchestrator,
            transport,
            connectivity: tx,
        }
    }

    async fn collect_updates(mut rx: mpsc::Receiver<ChatUpdate>) -> Vec<ChatUpdate> {
        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            let done = update.done;
            updates.push(update);
            if done {
                break;
            }
        }
        updates
    }

    #[tokio::test]
    async fn test_online_send_streams_cumulative_updates() {
        let h = harness(MockChatTransport::new().with_chunks(&["Hel", "lo!"]), true);

        let updates = collect_updates(h.orchestrator.send("hi there").await).await;

        assert_eq!(updates[0].content, "Hel");
        assert_eq!(updates[1].content, "Hello!");
        let last = updates.last().unwrap();
        assert!(last.done);
        assert!(!last.offline);
        assert_eq!(last.content, "Hello!");

        let history = h.orchestrator.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "Hello!");
        assert_eq!(history[1].id, last.message_id);
    }

    #[tokio::test]
    async fn test_offline_send_answers_without_network_call() {
        let h = harness(MockChatTransport::new().with_chunks(&["unused"]), false);

        let updates = collect_updates(h.orchestrator.send("tell me about my career").await).await;

        assert_eq!(updates.len(), 1);
        assert!(updates[0].done);
        assert!(updates[0].offline);
        assert!(updates[0].content.contains("certificate"));
        // No network call was attempted
        assert_eq!(h.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_request_failure_falls_back_to_matcher() {
        let h = harness(
            MockChatTransport::new().with_request_failure("connection refused"),
            true,
        );

        let updates = collect_updates(h.orchestrator.send("any exam tips?").await).await;

        assert_eq!(h.transport.call_count(), 1);
        assert_eq!(updates.len(), 1);
        assert!(updates[0].offline);
        assert!(!updates[0].content.is_empty());
    }

    #[tokio::test]
    async fn test_mid_stream_failure_substitutes_offline_answer() {
        let h = harness(
            MockChatTransport::new()
                .with_chunks(&["par", "tial"])
                .with_stream_failure("reset"),
            true,
        );

        let updates = collect_updates(h.orchestrator.send("quiz scores?").await).await;

        let last = updates.last().unwrap();
        assert!(last.done);
        assert!(last.offline);
        // Partial streamed text was replaced, not left dangling
        let history = h.orchestrator.history().await;
        assert_eq!(history[1].content, last.content);
        assert_ne!(history[1].content, "partial");
    }

    #[tokio::test]
    async fn test_reconnect_switches_back_to_transport() {
        let h = harness(MockChatTransport::new().with_chunks(&["online again"]), false);

        let updates = collect_updates(h.orchestrator.send("hello").await).await;
        assert!(updates[0].offline);
        assert_eq!(h.transport.call_count(), 0);

        h.connectivity.send(true).unwrap();
        let updates = collect_updates(h.orchestrator.send("hello").await).await;
        assert!(!updates.last().unwrap().offline);
        assert_eq!(h.transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_history_persisted_and_restored() {
        let store = Arc::new(MemoryStore::default());
        let cache = Arc::new(DurableCache::new(store.clone()));
        let (_tx, rx) = watch::channel(false);
        let orchestrator = ChatOrchestrator::new(
            Arc::new(MockChatTransport::new()),
            Arc::new(KnowledgeBase::built_in()),
            cache,
            rx.clone(),
            &ChatConfig::default(),
            Language::En,
        );

        collect_updates(orchestrator.send("hello").await).await;
        let before = orchestrator.history().await;
        assert_eq!(before.len(), 2);

        // New orchestrator over the same backing store, as after a reload
        let orchestrator = ChatOrchestrator::new(
            Arc::new(MockChatTransport::new()),
            Arc::new(KnowledgeBase::built_in()),
            Arc::new(DurableCache::new(store)),
            rx,
            &ChatConfig::default(),
            Language::En,
        );
        orchestrator.load_history().await;
        assert_eq!(orchestrator.history().await, before);
    }
}
