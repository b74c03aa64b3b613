//! Streaming response support.
//!
//! Line-buffered decoding of a server-sent-event chat response, plus the
//! token stream type that delivers decoded fragments to the chat layer.
//!
//! The decoder's correctness property: a fragment split across chunk
//! boundaries is never dropped or misread as malformed. A line whose payload
//! does not yet parse is pushed back, terminator included, until more bytes
//! arrive.

use futures::Stream;
use pin_project_lite::pin_project;
use serde::Deserialize;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::warn;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// A decoded server-sent event.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// A content delta to append to the assistant message.
    Delta(String),
    /// The literal done sentinel; no further events follow.
    Done,
}

/// Chat-completions chunk payload carried in a `data:` line.
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Incremental SSE line decoder.
///
/// Append-only byte buffer plus a cursor; the processed prefix is compacted
/// after each feed so total cost stays linear in bytes received. Lines are
/// only decoded once their terminator has arrived, so multi-byte characters
/// split across chunks are never mis-decoded.
#[derive(Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    pos: usize,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the done sentinel has been observed.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a chunk of bytes; returns every event completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }
        self.buf.extend_from_slice(chunk);

        while let Some(offset) = self.buf[self.pos..].iter().position(|&b| b == b'\n') {
            let line_start = self.pos;
            let line_end = line_start + offset;
            self.pos = line_end + 1;

            let line = &self.buf[line_start..line_end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);

            let text = match std::str::from_utf8(line) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Skipping non-UTF-8 stream line");
                    continue;
                }
            };

            // Comments and keep-alive blank lines carry no data
            if text.is_empty() || text.starts_with(':') {
                continue;
            }
            let Some(payload) = text.strip_prefix(DATA_PREFIX) else {
                continue;
            };
            let payload = payload.trim();

            if payload == DONE_SENTINEL {
                self.done = true;
                events.push(SseEvent::Done);
                break;
            }

            match serde_json::from_str::<ChatChunk>(payload) {
                Ok(chunk) => {
                    let delta = chunk
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.delta.content);
                    if let Some(content) = delta {
                        if !content.is_empty() {
                            events.push(SseEvent::Delta(content));
                        }
                    }
                }
                Err(_) => {
                    // Chunk boundary split the fragment mid-value: push the
                    // line back, terminator and all, and wait for more bytes
                    self.pos = line_start;
                    break;
                }
            }
        }

        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        events
    }
}

/// The terminal state of a token stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEnd {
    /// Normal completion (done sentinel or end of stream).
    Done,
    /// Transport failure; the caller must fall back to an offline answer.
    Error(String),
}

/// A fragment delivered through a token stream.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    /// Content delta (not cumulative)
    pub content: String,
    /// Set on the final chunk
    pub end: Option<StreamEnd>,
}

impl StreamChunk {
    pub fn delta(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            end: None,
        }
    }

    pub fn is_final(&self) -> bool {
        self.end.is_some()
    }
}

/// Final text or transport error of a fully consumed stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    pub text: String,
    pub error: Option<String>,
}

pin_project! {
    /// Stream of decoded fragments from a chat response.
    ///
    /// Accumulates the cumulative assistant text as fragments pass through.
    /// Dropping the stream releases the underlying byte source: the producer
    /// observes the closed channel and stops pulling chunks.
    pub struct TokenStream {
        #[pin]
        receiver: mpsc::Receiver<StreamChunk>,
        accumulated: String,
        complete: bool,
        error: Option<String>,
    }
}

impl TokenStream {
    pub fn new(receiver: mpsc::Receiver<StreamChunk>) -> Self {
        Self {
            receiver,
            accumulated: String::new(),
            complete: false,
            error: None,
        }
    }

    /// Create a sender/receiver pair for streaming.
    pub fn channel(buffer: usize) -> (TokenStreamSender, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (TokenStreamSender { sender: tx }, Self::new(rx))
    }

    /// Create an already-complete stream, for non-streaming answer paths.
    pub fn from_text(text: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let text = text.into();
        tokio::spawn(async move {
            let _ = tx
                .send(StreamChunk {
                    content: text,
                    end: Some(StreamEnd::Done),
                })
                .await;
        });
        Self::new(rx)
    }

    /// Cumulative text so far.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Drive the stream to completion and return the final text or error.
    pub async fn collect(mut self) -> StreamOutcome {
        use futures::StreamExt;
        while self.next().await.is_some() {}
        StreamOutcome {
            text: self.accumulated,
            error: self.error,
        }
    }
}

impl Stream for TokenStream {
    type Item = StreamChunk;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.receiver.get_mut().poll_recv(cx) {
            Poll::Ready(Some(chunk)) => {
                this.accumulated.push_str(&chunk.content);
                if let Some(end) = &chunk.end {
                    *this.complete = true;
                    if let StreamEnd::Error(e) = end {
                        *this.error = Some(e.clone());
                    }
                }
                Poll::Ready(Some(chunk))
            }
            Poll::Ready(None) => {
                *this.complete = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Producer half of a token stream.
pub struct TokenStreamSender {
    sender: mpsc::Sender<StreamChunk>,
}

impl TokenStreamSender {
    /// Send a content delta. Errors when the consumer has gone away, which
    /// is the signal to release the byte source.
    pub async fn send_delta(&self, content: impl Into<String>) -> Result<(), StreamError> {
        self.sender
            .send(StreamChunk::delta(content))
            .await
            .map_err(|_| StreamError::Closed)
    }

    /// Signal normal completion.
    pub async fn finish(&self) -> Result<(), StreamError> {
        self.sender
            .send(StreamChunk {
                content: String::new(),
                end: Some(StreamEnd::Done),
            })
            .await
            .map_err(|_| StreamError::Closed)
    }

    /// Signal a transport failure.
    pub async fn fail(&self, message: impl Into<String>) -> Result<(), StreamError> {
        self.sender
            .send(StreamChunk {
                content: String::new(),
                end: Some(StreamEnd::Error(message.into())),
            })
            .await
            .map_err(|_| StreamError::Closed)
    }
}

/// Error during streaming.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Consumer dropped the stream
    #[error("Stream closed")]
    Closed,
}
