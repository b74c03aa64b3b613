//! Chat endpoint boundary.
//!
//! Trait-based transport for the streamed assistant response, with an
//! OpenAI-compatible HTTP client for production and a scripted mock for
//! tests.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client};
use serde::Serialize;
use tracing::{debug, warn};

use super::types::{ChatMessage, Language, Role};
use crate::config::ChatConfig;
use crate::stream::{SseDecoder, SseEvent, TokenStream};

/// Error types for chat requests.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Transport failure before any response arrived
    #[error("Network error: {0}")]
    Network(String),

    /// Endpoint returned a non-success status
    #[error("Chat request failed: HTTP {status}: {message}")]
    RequestFailed { status: u16, message: String },
}

/// Request carrying the conversation history and a language hint.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub history: Vec<ChatMessage>,
    pub language: Language,
}

/// Streamed chat transport.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Open a streamed completion for the request. A returned stream that
    /// later fails mid-flight ends with a [`StreamEnd::Error`] chunk.
    ///
    /// [`StreamEnd::Error`]: crate::stream::StreamEnd::Error
    async fn stream_chat(&self, request: ChatRequest) -> Result<TokenStream, ChatError>;
}

/// OpenAI-compatible streaming chat client.
pub struct HttpChatClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpChatClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client: Self::build_client(None),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
        }
    }

    /// Construct a client with the configured request timeout applied.
    pub fn from_config(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        config: &ChatConfig,
    ) -> Self {
        Self::new(base_url, model, api_key)
            .with_timeout(Duration::from_millis(config.request_timeout_ms))
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = Self::build_client(Some(timeout));
        self
    }

    fn build_client(timeout: Option<Duration>) -> Client {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        builder.build().expect("Failed to create HTTP client")
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn auth_header(&self) -> Option<String> {
        self.api_key.as_ref().map(|k| format!("Bearer {}", k))
    }

    fn system_prompt(language: Language) -> &'static str {
        match language {
            Language::En => {
                "You are a study assistant for a bilingual learning platform. \
                 Answer concisely and in English."
            }
            Language::Es => {
                "Eres un asistente de estudio de una plataforma de aprendizaje \
                 bilingüe. Responde de forma concisa y en español."
            }
        }
    }
}

/// Chat completion request body.
#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[async_trait]
impl ChatTransport for HttpChatClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<TokenStream, ChatError> {
        let mut messages = vec![WireMessage {
            role: "system".to_string(),
            content: Self::system_prompt(request.language).to_string(),
        }];
        for msg in &request.history {
            messages.push(WireMessage {
                role: match msg.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                }
                .to_string(),
                content: msg.content.clone(),
            });
        }

        let body = WireRequest {
            model: self.model.clone(),
            messages,
            stream: true,
        };

        let mut http_request = self.client.post(self.chat_completions_url());
        if let Some(auth) = self.auth_header() {
            http_request = http_request.header(header::AUTHORIZATION, auth);
        }

        let response = http_request
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ChatError::RequestFailed {
                status: status.as_u16(),
                message,
            });
        }

        let (sender, stream) = TokenStream::channel(32);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut decoder = SseDecoder::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(error = %e, "Chat stream transport failure");
                        let _ = sender.fail(e.to_string()).await;
                        return;
                    }
                };
                for event in decoder.feed(&chunk) {
                    match event {
                        SseEvent::Delta(delta) => {
                            if sender.send_delta(delta).await.is_err() {
                                // Consumer went away; release the byte source
                                debug!("Token stream dropped; abandoning chat response");
                                return;
                            }
                        }
                        SseEvent::Done => {
                            let _ = sender.finish().await;
                            return;
                        }
                    }
                }
            }
            // End of stream without the sentinel is still normal completion
            let _ = sender.finish().await;
        });

        Ok(stream)
    }
}

/// Mock chat transport for testing.
pub struct MockChatTransport {
    chunks: Vec<String>,
    request_failure: Option<String>,
    stream_failure: Option<String>,
    call_count: std::sync::atomic::AtomicU32,
}

impl MockChatTransport {
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            request_failure: None,
            stream_failure: None,
            call_count: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Script the deltas a successful stream delivers.
    pub fn with_chunks(mut self, chunks: &[&str]) -> Self {
        self.chunks = chunks.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Script a failure of the request itself.
    pub fn with_request_failure(mut self, message: impl Into<String>) -> Self {
        self.request_failure = Some(message.into());
        self
    }

    /// Script a mid-stream transport failure after the scripted chunks.
    pub fn with_stream_failure(mut self, message: impl Into<String>) -> Self {
        self.stream_failure = Some(message.into());
        self
    }

    /// Number of stream_chat calls made.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Default for MockChatTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for MockChatTransport {
    async fn stream_chat(&self, _request: ChatRequest) -> Result<TokenStream, ChatError> {
        self.call_count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        if let Some(message) = &self.request_failure {
            return Err(ChatError::Network(message.clone()));
        }

        let chunks = self.chunks.clone();
        let stream_failure = self.stream_failure.clone();
        let (sender, stream) = TokenStream::channel(32);
        tokio::spawn(async move {
            for chunk in chunks {
                if sender.send_delta(chunk).await.is_err() {
                    return;
                }
            }
            match stream_failure {
                Some(message) => {
                    let _ = sender.fail(message).await;
                }
                None => {
                    let _ = sender.finish().await;
                }
            }
        });
        Ok(stream)
    }
}
