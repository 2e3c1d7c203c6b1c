//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [server]       # bind address, rate limiting
//! [generation]   # credential source, model preference list
//! [embedding]    # query embedding model
//! [retrieval]    # search scope and match counts
//! [prompt]       # assistant role, not-found sentinel
//! [store]        # PostgREST endpoint and service key
//! [auth]         # session validation mode
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server settings.
    pub server: Option<ServerConfig>,

    /// Generation credentials and models.
    pub generation: Option<GenerationConfig>,

    /// Query embedding settings.
    pub embedding: Option<EmbeddingConfig>,

    /// Retrieval scope and limits.
    pub retrieval: Option<RetrievalConfig>,

    /// Prompt wording.
    pub prompt: Option<PromptConfig>,

    /// Document store connection.
    pub store: Option<StoreConfig>,

    /// Session validation.
    pub auth: Option<AuthConfig>,

    /// Log output.
    pub logging: Option<LoggingConfig>,
}

impl GatewayConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole, not merged field by field.
    pub fn merge(&mut self, other: GatewayConfig) {
        if other.server.is_some() {
            self.server = other.server;
        }
        if other.generation.is_some() {
            self.generation = other.generation;
        }
        if other.embedding.is_some() {
            self.embedding = other.embedding;
        }
        if other.retrieval.is_some() {
            self.retrieval = other.retrieval;
        }
        if other.prompt.is_some() {
            self.prompt = other.prompt;
        }
        if other.store.is_some() {
            self.store = other.store;
        }
        if other.auth.is_some() {
            self.auth = other.auth;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Server section, or defaults.
    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    /// Generation section, or defaults.
    pub fn generation(&self) -> GenerationConfig {
        self.generation.clone().unwrap_or_default()
    }

    /// Embedding section, or defaults.
    pub fn embedding(&self) -> EmbeddingConfig {
        self.embedding.clone().unwrap_or_default()
    }

    /// Retrieval section, or defaults.
    pub fn retrieval(&self) -> RetrievalConfig {
        self.retrieval.clone().unwrap_or_default()
    }

    /// Prompt section, or defaults.
    pub fn prompt(&self) -> PromptConfig {
        self.prompt.clone().unwrap_or_default()
    }

    /// Store section, or defaults.
    pub fn store(&self) -> StoreConfig {
        self.store.clone().unwrap_or_default()
    }

    /// Auth section, or defaults.
    pub fn auth(&self) -> AuthConfig {
        self.auth.clone().unwrap_or_default()
    }

    /// Logging section, or defaults.
    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Check value ranges after merging.
    pub fn validate(&self) -> Result<()> {
        let server = self.server();
        if server.rate_limiting && server.api_rpm == 0 {
            return Err(ConfigError::invalid(
                "server.api_rpm",
                "must be positive when rate limiting is enabled",
            ));
        }

        let retrieval = self.retrieval();
        if retrieval.match_count == 0 {
            return Err(ConfigError::invalid("retrieval.match_count", "must be positive"));
        }
        if retrieval.scoped_match_count == 0 {
            return Err(ConfigError::invalid(
                "retrieval.scoped_match_count",
                "must be positive",
            ));
        }
        if retrieval.max_context_chunks == 0 {
            return Err(ConfigError::invalid(
                "retrieval.max_context_chunks",
                "must be positive",
            ));
        }

        if let Some(models) = &self.generation().models
            && models.iter().all(|m| m.trim().is_empty())
        {
            return Err(ConfigError::invalid(
                "generation.models",
                "must name at least one model",
            ));
        }

        if self.prompt().not_found_sentinel.trim().is_empty() {
            return Err(ConfigError::invalid("prompt.not_found_sentinel", "must not be empty"));
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Default API requests per minute.
pub const DEFAULT_API_RPM: u32 = 120;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on.
    pub port: u16,
    /// Address to bind to.
    pub bind: String,
    /// Enable rate limiting.
    pub rate_limiting: bool,
    /// API rate limit: requests per minute, process-wide.
    pub api_rpm: u32,
    /// Enable request logging.
    pub request_logging: bool,
    /// Allowed CORS origins. Empty disables CORS.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            rate_limiting: true,
            api_rpm: DEFAULT_API_RPM,
            request_logging: true,
            cors_origins: Vec::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Generation
// ─────────────────────────────────────────────────────────────────────────────

/// Default environment variable holding comma-separated API keys.
pub const DEFAULT_CREDENTIALS_ENV: &str = "GEMINI_API_KEY";

/// Generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Environment variable with comma-separated API keys.
    pub credentials_env: String,
    /// Plaintext keys, used only when the environment variable is unset.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub api_keys: Vec<String>,
    /// Model preference list. `None` uses the built-in list.
    pub models: Option<Vec<String>>,
    /// Provider base URL override.
    pub base_url: Option<String>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Output token limit.
    pub max_output_tokens: Option<u32>,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            credentials_env: DEFAULT_CREDENTIALS_ENV.to_string(),
            api_keys: Vec::new(),
            models: None,
            base_url: None,
            temperature: None,
            max_output_tokens: None,
            connect_timeout_secs: 10,
        }
    }
}

impl GenerationConfig {
    /// Whether plaintext keys are present in the file.
    pub fn has_plaintext_api_keys(&self) -> bool {
        self.api_keys.iter().any(|k| !k.trim().is_empty())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding
// ─────────────────────────────────────────────────────────────────────────────

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding model.
    pub model: String,
    /// Expected vector dimensions.
    pub dimensions: usize,
    /// Retries on transport failure.
    pub max_retries: u32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-004".to_string(),
            dimensions: 768,
            max_retries: 2,
            timeout_secs: 30,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Retrieval
// ─────────────────────────────────────────────────────────────────────────────

/// Which documents a query searches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeSetting {
    /// All documents.
    #[default]
    Global,
    /// Documents owned by the caller.
    User,
}

/// Retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Search scope.
    pub scope: ScopeSetting,
    /// Match count for global search.
    pub match_count: usize,
    /// Match count for user-scoped search.
    pub scoped_match_count: usize,
    /// Upper bound on chunks rendered into the prompt.
    pub max_context_chunks: usize,
    /// Name used for documents missing from the directory.
    pub fallback_document_name: String,
    /// RPC function performing vector search.
    pub search_function: String,
    /// Table holding document names.
    pub documents_table: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            scope: ScopeSetting::Global,
            match_count: 100,
            scoped_match_count: 25,
            max_context_chunks: 100,
            fallback_document_name: "Untitled document".to_string(),
            search_function: "search_documents_vector".to_string(),
            documents_table: "documents".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Prompt
// ─────────────────────────────────────────────────────────────────────────────

/// Prompt configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Opening role line.
    pub assistant_role: String,
    /// Language answers should be written in.
    pub answer_language: Option<String>,
    /// Exact reply when the answer is not in the context.
    pub not_found_sentinel: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            assistant_role:
                "You are an expert assistant that answers questions about the uploaded documents."
                    .to_string(),
            answer_language: None,
            not_found_sentinel: "Not found in the uploaded documents.".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// Document store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Project URL. Falls back to `url_env`.
    pub url: Option<String>,
    /// Environment variable holding the project URL.
    pub url_env: String,
    /// Environment variable holding the service key.
    pub service_key_env: String,
    /// Plaintext service key, used only when the variable is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_key: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            url_env: "SUPABASE_URL".to_string(),
            service_key_env: "SUPABASE_SERVICE_ROLE_KEY".to_string(),
            service_key: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth
// ─────────────────────────────────────────────────────────────────────────────

/// How sessions are validated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Validate bearer tokens against the store's auth endpoint.
    #[default]
    Supabase,
    /// Compare bearer tokens against one shared token.
    Token,
    /// Accept every request.
    Disabled,
}

/// Auth configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Validation mode.
    pub mode: AuthMode,
    /// Environment variable holding the shared token for `token` mode.
    pub token_env: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Supabase,
            token_env: "RAGWAY_API_TOKEN".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for rolling JSON logs. Defaults to `<config dir>/logs`.
    pub dir: Option<PathBuf>,
}
