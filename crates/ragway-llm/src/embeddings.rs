//! Query embedding.
//!
//! The gateway embeds each query once, with the first credential of the
//! pool, before vector search.

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::with_retry;
use crate::credentials::Credential;
use crate::error::{GenerationError, Result};
use crate::gemini::DEFAULT_GEMINI_BASE;

/// Default Gemini embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

/// Dimensionality of `text-embedding-004`.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the dimensionality of embeddings produced by this embedder.
    fn dimensions(&self) -> usize;

    /// Get the name of this embedder.
    fn name(&self) -> &str;
}

/// A shared embedder that can be used across threads.
pub type SharedEmbedder = Arc<dyn Embedder>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// A mock embedder for testing.
///
/// Produces deterministic unit vectors from a hash of the text, or a fixed
/// error when built with [`MockEmbedder::failing`].
pub struct MockEmbedder {
    dimensions: usize,
    failure: Option<GenerationError>,
}

impl MockEmbedder {
    /// Create a new mock embedder with the specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            failure: None,
        }
    }

    /// A mock whose every call fails with `error`.
    pub fn failing(error: GenerationError) -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            failure: Some(error),
        }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let mut state = simple_hash(text);
        let mut embedding: Vec<f32> = (0..self.dimensions)
            .map(|_| {
                state = state.wrapping_mul(1103515245).wrapping_add(12345);
                ((state >> 16) as f32 / 32768.0) - 1.0
            })
            .collect();

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "mock"
    }
}

fn simple_hash(s: &str) -> u32 {
    s.bytes()
        .fold(5381u32, |hash, b| hash.wrapping_mul(33).wrapping_add(b as u32))
}

// ─────────────────────────────────────────────────────────────────────────────
// Gemini Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the Gemini embedder.
#[derive(Debug, Clone)]
pub struct GeminiEmbedderConfig {
    /// Base URL for the API.
    pub base_url: String,
    /// Embedding model.
    pub model: String,
    /// Expected output dimensions.
    pub dimensions: usize,
    /// Request timeout.
    pub timeout: Duration,
    /// Retries on transport failure.
    pub max_retries: u32,
    /// Initial backoff between retries.
    pub retry_backoff: Duration,
}

impl Default for GeminiEmbedderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GEMINI_BASE.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

impl GeminiEmbedderConfig {
    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the embedding model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the expected dimensions.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Set retry behaviour.
    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }
}

/// Gemini `embedContent` embedder bound to one credential.
pub struct GeminiEmbedder {
    client: Client,
    config: GeminiEmbedderConfig,
    credential: Credential,
}

impl GeminiEmbedder {
    /// Create an embedder using `credential` for every call.
    pub fn new(config: GeminiEmbedderConfig, credential: Credential) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerationError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            credential,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:embedContent",
            self.config.base_url, self.config.model
        )
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbedContentRequest {
            model: format!("models/{}", self.config.model),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
        };

        let response = self
            .client
            .post(self.url())
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-goog-api-key", self.credential.expose())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::provider(
                status.as_u16(),
                format!("Embedding request failed: {}", body.trim()),
            ));
        }

        let parsed: EmbedContentResponse = response.json().await?;
        Ok(parsed.embedding.values)
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let values = with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            "embed",
            || self.embed_once(text),
        )
        .await?;

        if values.is_empty() {
            return Err(GenerationError::Serialization(
                "embedding response contained no values".to_string(),
            ));
        }

        if values.len() != self.config.dimensions {
            tracing::warn!(
                expected = self.config.dimensions,
                actual = values.len(),
                model = %self.config.model,
                "Embedding dimensions differ from configuration"
            );
        }

        Ok(values)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Serialize)]
struct EmbedContentRequest {
    model: String,
    content: EmbedContent,
}

#[derive(Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_mock_embedder_is_deterministic_and_normalized() {
        let embedder = MockEmbedder::new(16);
        let a = embedder.embed("rule x").await.unwrap();
        let b = embedder.embed("rule x").await.unwrap();
        let c = embedder.embed("rule y").await.unwrap();

        assert_eq!(a.len(), 16);
        assert_eq!(a, b);
        assert_ne!(a, c);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_mock_embedder_failing() {
        let embedder = MockEmbedder::failing(GenerationError::provider(500, "down"));
        assert!(embedder.embed("anything").await.is_err());
    }

    #[tokio::test]
    async fn test_gemini_embedder_request_and_parse() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/text-embedding-004:embedContent"))
            .and(header_eq("x-goog-api-key", "first-key-123"))
            .and(body_partial_json(serde_json::json!({
                "content": {"parts": [{"text": "what is rule x"}]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": {"values": [0.1, 0.2, 0.3]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = GeminiEmbedderConfig::default()
            .with_base_url(server.uri())
            .with_dimensions(3);
        let embedder = GeminiEmbedder::new(config, Credential::new("first-key-123")).unwrap();

        let values = embedder.embed("what is rule x").await.unwrap();
        assert_eq!(values, vec![0.1, 0.2, 0.3]);
        assert_eq!(embedder.dimensions(), 3);
        assert_eq!(embedder.name(), "text-embedding-004");
    }

    #[tokio::test]
    async fn test_gemini_embedder_provider_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("API key not valid"))
            .expect(1)
            .mount(&server)
            .await;

        let config = GeminiEmbedderConfig::default()
            .with_base_url(server.uri())
            .with_retries(3, Duration::from_millis(1));
        let embedder = GeminiEmbedder::new(config, Credential::new("bad-key-000")).unwrap();

        let err = embedder.embed("q").await.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert!(err.to_string().contains("API key not valid"));
    }

    #[tokio::test]
    async fn test_gemini_embedder_empty_values() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": {"values": []}
            })))
            .mount(&server)
            .await;

        let config = GeminiEmbedderConfig::default().with_base_url(server.uri());
        let embedder = GeminiEmbedder::new(config, Credential::new("key-abc-123")).unwrap();
        assert!(matches!(
            embedder.embed("q").await,
            Err(GenerationError::Serialization(_))
        ));
    }
}
