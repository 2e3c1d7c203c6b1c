//! Streaming response merger.
//!
//! A [`GroundedResponse`] holds two independent outputs: the citation payload
//! and the open token stream. [`GroundedResponse::into_events`] merges them
//! into one ordered event sequence:
//!
//! ```text
//! Citations ─► Token* ─► (Done | Error)
//! ```
//!
//! Citations always come first, even when empty, and exactly one terminal
//! event closes the sequence. Dropping the event stream drops the token
//! stream, which aborts the provider call.

use std::time::Instant;

use futures::{Stream, StreamExt};
use ragway_llm::{StreamEvent, TokenStream};
use ragway_retrieval::CitationPayload;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Message sent when the server stops mid-stream.
pub const SHUTDOWN_MESSAGE: &str = "Server is shutting down";

/// One event of a merged response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    /// The citation side channel.
    Citations(CitationPayload),
    /// A generated text chunk.
    Token(String),
    /// Generation completed.
    Done {
        /// Provider finish reason, if reported.
        finish_reason: Option<String>,
        /// Model that produced the answer.
        model: String,
        /// Pool index of the credential used.
        credential: usize,
    },
    /// The stream failed after it was opened.
    Error {
        /// Client-facing message.
        message: String,
    },
}

impl ResponseEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            ResponseEvent::Citations(_) => "citations",
            ResponseEvent::Token(_) => "text",
            ResponseEvent::Done { .. } => "done",
            ResponseEvent::Error { .. } => "error",
        }
    }

    /// JSON payload for the event.
    pub fn data(&self) -> Value {
        match self {
            ResponseEvent::Citations(payload) => {
                serde_json::to_value(payload).unwrap_or_else(|_| json!({ "citations": [] }))
            }
            ResponseEvent::Token(content) => json!({ "content": content }),
            ResponseEvent::Done {
                finish_reason,
                model,
                credential,
            } => json!({
                "finish_reason": finish_reason,
                "model": model,
                "credential": credential,
            }),
            ResponseEvent::Error { message } => json!({ "message": message }),
        }
    }

    /// Returns true for `Done` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResponseEvent::Done { .. } | ResponseEvent::Error { .. })
    }
}

/// Citations plus the single open generation stream for one request.
pub struct GroundedResponse {
    citations: CitationPayload,
    stream: TokenStream,
    model: String,
    credential_index: usize,
}

impl std::fmt::Debug for GroundedResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroundedResponse")
            .field("citations", &self.citations.len())
            .field("model", &self.model)
            .field("credential_index", &self.credential_index)
            .finish_non_exhaustive()
    }
}

enum Step {
    Shutdown,
    Next(Option<ragway_llm::Result<StreamEvent>>),
}

impl GroundedResponse {
    /// Pair citations with an open stream.
    pub fn new(
        citations: CitationPayload,
        stream: TokenStream,
        model: impl Into<String>,
        credential_index: usize,
    ) -> Self {
        Self {
            citations,
            stream,
            model: model.into(),
            credential_index,
        }
    }

    /// The citation payload.
    pub fn citations(&self) -> &CitationPayload {
        &self.citations
    }

    /// Model serving this response.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Split into the two outputs.
    pub fn into_parts(self) -> (CitationPayload, TokenStream) {
        (self.citations, self.stream)
    }

    /// Merge into a single ordered event stream.
    ///
    /// Cancelling `shutdown` ends the stream with an error event.
    pub fn into_events(
        self,
        shutdown: CancellationToken,
    ) -> impl Stream<Item = ResponseEvent> + Send + 'static {
        let GroundedResponse {
            citations,
            mut stream,
            model,
            credential_index,
        } = self;

        async_stream::stream! {
            let start = Instant::now();
            let mut tokens = 0usize;

            yield ResponseEvent::Citations(citations);

            loop {
                let step = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => Step::Shutdown,
                    next = stream.next() => Step::Next(next),
                };

                match step {
                    Step::Next(Some(Ok(StreamEvent::Delta(text)))) => {
                        if text.is_empty() {
                            continue;
                        }
                        tokens += 1;
                        yield ResponseEvent::Token(text);
                    }
                    Step::Next(Some(Ok(StreamEvent::Finished { reason }))) => {
                        tracing::info!(
                            credential = credential_index,
                            model = %model,
                            tokens,
                            duration_ms = start.elapsed().as_millis() as u64,
                            "Generation completed"
                        );
                        yield ResponseEvent::Done {
                            finish_reason: reason,
                            model: model.clone(),
                            credential: credential_index,
                        };
                        break;
                    }
                    Step::Next(None) => {
                        tracing::debug!(
                            credential = credential_index,
                            model = %model,
                            tokens,
                            "Stream ended without finish reason"
                        );
                        yield ResponseEvent::Done {
                            finish_reason: None,
                            model: model.clone(),
                            credential: credential_index,
                        };
                        break;
                    }
                    Step::Next(Some(Err(e))) => {
                        tracing::error!(
                            credential = credential_index,
                            model = %model,
                            tokens,
                            error = %e,
                            "Generation stream failed"
                        );
                        yield ResponseEvent::Error { message: e.to_string() };
                        break;
                    }
                    Step::Shutdown => {
                        tracing::warn!(
                            credential = credential_index,
                            model = %model,
                            tokens,
                            "Stream interrupted by shutdown"
                        );
                        yield ResponseEvent::Error { message: SHUTDOWN_MESSAGE.to_string() };
                        break;
                    }
                }
            }
        }
    }
}
