//! Error types for retrieval.

use ragway_llm::GenerationError;
use thiserror::Error;

/// Result type alias using the retrieval error type.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Error type for retrieval and document lookup.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The query was empty after trimming.
    #[error("Query must not be empty")]
    EmptyQuery,

    /// Embedding the query failed.
    #[error("Embedding failed: {0}")]
    Embedding(#[from] GenerationError),

    /// The store answered with an error status.
    #[error("Store error [{status}]: {message}")]
    Store {
        /// HTTP status.
        status: u16,
        /// Response body or message.
        message: String,
    },

    /// Network/connectivity error.
    #[error("Network error: {0}")]
    Network(String),

    /// Response could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Store configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RetrievalError {
    /// Create a store error from a status and message.
    pub fn store(status: u16, message: impl Into<String>) -> Self {
        Self::Store {
            status,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for RetrievalError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RetrievalError::Serialization(err.to_string())
        } else {
            RetrievalError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RetrievalError {
    fn from(err: serde_json::Error) -> Self {
        RetrievalError::Serialization(err.to_string())
    }
}
