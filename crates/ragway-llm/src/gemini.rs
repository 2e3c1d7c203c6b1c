//! Google Gemini streaming backend.
//!
//! Talks to the Generative Language API at
//! `{base}/models/{model}:streamGenerateContent?alt=sse`. The credential is
//! chosen per call, so one backend instance serves the whole pool.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{Client, Response, header};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use crate::backend::{GenerationBackend, StreamEvent, TokenStream};
use crate::credentials::Credential;
use crate::error::{GenerationError, Result};

/// Default Generative Language API base URL.
pub const DEFAULT_GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Default connect timeout. The stream itself is not time-limited.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the Gemini backend.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// Base URL for the API.
    pub base_url: String,

    /// TCP connect timeout.
    pub connect_timeout: Duration,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Maximum output tokens.
    pub max_output_tokens: Option<u32>,

    /// Name for this backend instance.
    pub name: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GEMINI_BASE.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            temperature: None,
            max_output_tokens: None,
            name: "gemini".to_string(),
        }
    }
}

impl GeminiConfig {
    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the output token limit.
    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Set connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gemini Backend
// ─────────────────────────────────────────────────────────────────────────────

/// Gemini streaming generation backend.
pub struct GeminiBackend {
    client: Client,
    config: GeminiConfig,
}

impl GeminiBackend {
    /// Create a new backend with the given configuration.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| GenerationError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Build the streaming endpoint URL for a model.
    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url, model
        )
    }

    /// Build the request body for a single-turn prompt.
    fn to_request(&self, prompt: &str) -> GeminiRequest {
        let generation_config =
            if self.config.temperature.is_some() || self.config.max_output_tokens.is_some() {
                Some(GeminiGenerationConfig {
                    temperature: self.config.temperature,
                    max_output_tokens: self.config.max_output_tokens,
                })
            } else {
                None
            };

        GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config,
        }
    }

    /// Turn a non-success response into a provider error.
    async fn handle_error_response(response: Response) -> GenerationError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error_from_body(status.as_u16(), &body)
    }
}

/// Parse a Gemini error body (`{"error": {code, message, status}}`).
fn error_from_body(status: u16, body: &str) -> GenerationError {
    match serde_json::from_str::<GeminiErrorResponse>(body) {
        Ok(parsed) => GenerationError::provider(status, parsed.error.describe()),
        Err(_) => GenerationError::provider(status, format!("HTTP {}: {}", status, body.trim())),
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    async fn open_stream(
        &self,
        credential: &Credential,
        model: &str,
        prompt: &str,
    ) -> Result<TokenStream> {
        let request = self.to_request(prompt);

        tracing::debug!(
            backend = %self.config.name,
            model = %model,
            credential = %credential,
            prompt_chars = prompt.len(),
            "Opening Gemini stream"
        );

        let response = self
            .client
            .post(self.stream_url(model))
            .header(header::CONTENT_TYPE, "application/json")
            .header(API_KEY_HEADER, credential.expose())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::handle_error_response(response).await);
        }

        Ok(parse_gemini_sse_stream(response.bytes_stream()))
    }

    fn name(&self) -> &str {
        &self.config.name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gemini API Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    error: Option<GeminiError>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, serde::Deserialize)]
struct GeminiError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GeminiError {
    fn describe(&self) -> String {
        match &self.status {
            Some(status) => format!("{} ({})", self.message, status),
            None => self.message.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SSE Streaming
// ─────────────────────────────────────────────────────────────────────────────

fn parse_gemini_sse_stream(
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
) -> TokenStream {
    Box::pin(futures::stream::unfold(
        GeminiSseState {
            byte_stream: Box::pin(byte_stream),
            buffer: Vec::new(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Some((event, state));
                }

                if state.done {
                    return None;
                }

                // Only complete lines are decoded; a character may straddle chunks
                if let Some(line_end) = state.buffer.iter().position(|&b| b == b'\n') {
                    let raw: Vec<u8> = state.buffer.drain(..=line_end).collect();
                    let line = decode_line(&raw[..line_end]);

                    if let Some(data) = line.trim().strip_prefix("data:") {
                        state.push_chunk(data.trim());
                    }
                    continue;
                }

                // Need more data
                match state.byte_stream.next().await {
                    Some(Ok(bytes)) => {
                        state.buffer.extend_from_slice(&bytes);
                    }
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((
                            Err(GenerationError::Stream(format!("connection lost: {}", e))),
                            state,
                        ));
                    }
                    None => {
                        // Flush a trailing line without newline
                        let rest = decode_line(&std::mem::take(&mut state.buffer));
                        if let Some(data) = rest.trim().strip_prefix("data:") {
                            state.push_chunk(data.trim());
                        }
                        state.done = true;
                    }
                }
            }
        },
    ))
}

/// Decode one SSE line; invalid sequences become U+FFFD.
fn decode_line(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(line) => line.to_string(),
        Err(_) => String::from_utf8_lossy(raw).into_owned(),
    }
}

struct GeminiSseState {
    byte_stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<StreamEvent>>,
    done: bool,
}

impl GeminiSseState {
    /// Decode one `data:` payload into queued events.
    fn push_chunk(&mut self, data: &str) {
        if data.is_empty() {
            return;
        }

        let chunk: GeminiStreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unparseable Gemini stream chunk");
                return;
            }
        };

        if let Some(error) = chunk.error {
            self.done = true;
            let status = error.code.unwrap_or(500);
            self.pending
                .push_back(Err(GenerationError::provider(status, error.describe())));
            return;
        }

        let Some(candidate) = chunk.candidates.into_iter().next() else {
            return;
        };

        if let Some(content) = candidate.content {
            let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
            if !text.is_empty() {
                self.pending.push_back(Ok(StreamEvent::Delta(text)));
            }
        }

        if let Some(reason) = candidate.finish_reason {
            self.done = true;
            self.pending.push_back(Ok(StreamEvent::Finished {
                reason: Some(reason),
            }));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
