//! Generation backend trait and implementations.
//!
//! This module defines the abstraction over a streaming generation provider
//! and provides a scripted mock implementation for testing.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::credentials::Credential;
use crate::error::{GenerationError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Shared Retry Logic
// ─────────────────────────────────────────────────────────────────────────────

/// Execute an async operation with exponential backoff retry.
///
/// Retries only on transient errors (network failures). Non-retryable errors
/// are returned immediately.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    operation: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= max_retries => return Err(e),
            Err(e) => {
                attempt += 1;
                tracing::warn!(
                    operation,
                    attempt,
                    max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Request failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Streaming Types
// ─────────────────────────────────────────────────────────────────────────────

/// A live token stream from a generation backend.
///
/// Dropping the stream aborts the underlying provider call.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send + 'static>>;

/// Events emitted by an open generation stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A chunk of generated text.
    Delta(String),
    /// Generation finished; no further events follow.
    Finished {
        /// Provider finish reason, if reported.
        reason: Option<String>,
    },
}

impl StreamEvent {
    /// Returns true if this is the final event of the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Finished { .. })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Generation Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for streaming generation providers.
///
/// An implementation opens exactly one stream per successful call. A failed
/// call must not leave anything open behind it.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Open a streaming generation call for `prompt` on `model` using `credential`.
    async fn open_stream(
        &self,
        credential: &Credential,
        model: &str,
        prompt: &str,
    ) -> Result<TokenStream>;

    /// Get the name of this backend.
    fn name(&self) -> &str;
}

/// A backend that can be shared across threads.
pub type SharedBackend = Arc<dyn GenerationBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

/// Scripted result of a mock `open_stream` call.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Open a stream that yields these tokens and then finishes.
    Tokens(Vec<String>),
    /// Fail to open with a provider error.
    Fail {
        /// Provider status.
        status: u16,
        /// Provider message.
        message: String,
    },
    /// Open a stream that yields these tokens and then errors.
    FailMidStream {
        /// Tokens delivered before the failure.
        tokens: Vec<String>,
        /// Stream error message.
        message: String,
    },
    /// Open a stream that never yields anything.
    Pending,
}

impl MockOutcome {
    /// A stream of the given tokens.
    pub fn tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Tokens(tokens.into_iter().map(Into::into).collect())
    }

    /// A quota failure (HTTP 429).
    pub fn quota() -> Self {
        Self::Fail {
            status: 429,
            message: "Resource has been exhausted (e.g. check quota). (RESOURCE_EXHAUSTED)"
                .to_string(),
        }
    }

    /// A model-unavailable failure (HTTP 404).
    pub fn model_not_found() -> Self {
        Self::Fail {
            status: 404,
            message: "model is not found for API version v1beta (NOT_FOUND)".to_string(),
        }
    }
}

/// Decrements the open-stream counter when the stream is dropped.
struct OpenStreamGuard {
    open: Arc<AtomicUsize>,
}

impl Drop for OpenStreamGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A mock backend for testing purposes.
///
/// Outcomes are scripted per `(credential secret, model)` pair, with a default
/// for anything unscripted. Every call is logged, and the number of streams
/// currently alive is tracked so tests can check the one-stream invariant.
pub struct MockBackend {
    name: String,
    outcomes: Mutex<HashMap<(String, String), MockOutcome>>,
    default_outcome: MockOutcome,
    calls: Mutex<Vec<(String, String)>>,
    prompts: Mutex<Vec<String>>,
    open: Arc<AtomicUsize>,
    peak_open: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Create a mock where every unscripted call uses `default_outcome`.
    pub fn new(default_outcome: MockOutcome) -> Self {
        Self {
            name: "mock".to_string(),
            outcomes: Mutex::new(HashMap::new()),
            default_outcome,
            calls: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            open: Arc::new(AtomicUsize::new(0)),
            peak_open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a mock that always streams `text` as a single token.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(MockOutcome::Tokens(vec![text.into()]))
    }

    /// Script the outcome for one `(credential, model)` pair.
    pub fn with_outcome(
        self,
        credential: impl Into<String>,
        model: impl Into<String>,
        outcome: MockOutcome,
    ) -> Self {
        self.outcomes
            .lock()
            .insert((credential.into(), model.into()), outcome);
        self
    }

    /// All `(credential, model)` pairs attempted, in order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    /// Number of `open_stream` calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Prompts received, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    /// Streams currently alive.
    pub fn open_streams(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Highest number of streams alive at once.
    pub fn peak_open_streams(&self) -> usize {
        self.peak_open.load(Ordering::SeqCst)
    }

    fn guarded(&self, events: Vec<Result<StreamEvent>>, pending: bool) -> TokenStream {
        let now_open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_open.fetch_max(now_open, Ordering::SeqCst);
        let guard = OpenStreamGuard {
            open: Arc::clone(&self.open),
        };

        let stream = futures::stream::iter(events);
        let stream: Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>> = if pending {
            Box::pin(stream.chain(futures::stream::pending()))
        } else {
            Box::pin(stream)
        };

        Box::pin(stream.map(move |event| {
            let _alive = &guard;
            event
        }))
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    async fn open_stream(
        &self,
        credential: &Credential,
        model: &str,
        prompt: &str,
    ) -> Result<TokenStream> {
        let key = (credential.expose().to_string(), model.to_string());
        self.calls.lock().push(key.clone());
        self.prompts.lock().push(prompt.to_string());

        let outcome = self
            .outcomes
            .lock()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| self.default_outcome.clone());

        match outcome {
            MockOutcome::Fail { status, message } => {
                Err(GenerationError::provider(status, message))
            }
            MockOutcome::Tokens(tokens) => {
                let mut events: Vec<Result<StreamEvent>> = tokens
                    .into_iter()
                    .map(|t| Ok(StreamEvent::Delta(t)))
                    .collect();
                events.push(Ok(StreamEvent::Finished {
                    reason: Some("STOP".to_string()),
                }));
                Ok(self.guarded(events, false))
            }
            MockOutcome::FailMidStream { tokens, message } => {
                let mut events: Vec<Result<StreamEvent>> = tokens
                    .into_iter()
                    .map(|t| Ok(StreamEvent::Delta(t)))
                    .collect();
                events.push(Err(GenerationError::Stream(message)));
                Ok(self.guarded(events, false))
            }
            MockOutcome::Pending => Ok(self.guarded(Vec::new(), true)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn test_mock_backend_streams_tokens() {
        let backend = MockBackend::new(MockOutcome::tokens(["Hello", " world"]));
        let cred = Credential::new("key-1");

        let mut stream = backend.open_stream(&cred, "m1", "prompt").await.unwrap();
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event.unwrap());
        }

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], StreamEvent::Delta("Hello".to_string()));
        assert!(events[2].is_terminal());
        assert_eq!(backend.calls(), vec![("key-1".to_string(), "m1".to_string())]);
        assert_eq!(backend.prompts(), vec!["prompt".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_backend_scripted_failure() {
        let backend = MockBackend::with_text("ok").with_outcome("key-1", "m1", MockOutcome::quota());
        let cred = Credential::new("key-1");

        let err = backend.open_stream(&cred, "m1", "p").await.err().unwrap();
        assert_eq!(err.status(), Some(429));

        assert!(backend.open_stream(&cred, "m2", "p").await.is_ok());
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_backend_tracks_open_streams() {
        let backend = MockBackend::with_text("ok");
        let cred = Credential::new("key-1");

        let first = backend.open_stream(&cred, "m", "p").await.unwrap();
        assert_eq!(backend.open_streams(), 1);
        let second = backend.open_stream(&cred, "m", "p").await.unwrap();
        assert_eq!(backend.open_streams(), 2);
        assert_eq!(backend.peak_open_streams(), 2);

        drop(first);
        drop(second);
        assert_eq!(backend.open_streams(), 0);
    }

    #[tokio::test]
    async fn test_mock_backend_mid_stream_failure() {
        let backend = MockBackend::new(MockOutcome::FailMidStream {
            tokens: vec!["partial".to_string()],
            message: "connection reset".to_string(),
        });
        let cred = Credential::new("key-1");

        let mut stream = backend.open_stream(&cred, "m", "p").await.unwrap();
        assert!(matches!(stream.next().await, Some(Ok(StreamEvent::Delta(_)))));
        assert!(matches!(
            stream.next().await,
            Some(Err(GenerationError::Stream(_)))
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_with_retry_retries_network_errors() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, Duration::from_millis(1), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(GenerationError::Network("reset".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_stops_on_provider_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(3, Duration::from_millis(1), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GenerationError::provider(429, "quota")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up_after_max() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(2, Duration::from_millis(1), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GenerationError::Network("down".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(GenerationError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
