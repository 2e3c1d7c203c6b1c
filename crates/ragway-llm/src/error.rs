//! Error types for the generation crate.

use thiserror::Error;

use crate::orchestrator::GenerationAttempt;

/// Result type alias using the generation error type.
pub type Result<T> = std::result::Result<T, GenerationError>;

// ─────────────────────────────────────────────────────────────────────────────
// Generation Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error type for a single provider call.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// The provider answered with a non-success status.
    #[error("Provider error [{status}]: {message}")]
    Provider {
        /// HTTP status (or the `code` field of an in-stream error payload).
        status: u16,
        /// Provider message, including the provider's status string when present.
        message: String,
    },

    /// Network/connectivity error (retryable).
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration error (credential missing, bad URL, etc.).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The open stream failed after it was established.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GenerationError {
    /// Create a provider error from a status code and message.
    pub fn provider(status: u16, message: impl Into<String>) -> Self {
        Self::Provider {
            status,
            message: message.into(),
        }
    }

    /// The provider status, if this error came from a provider response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if this error is worth retrying on the same call.
    ///
    /// Only transport failures qualify; provider answers are never retried
    /// in place.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerationError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            GenerationError::Network(format!("Connection failed: {}", err))
        } else {
            GenerationError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GenerationError {
    fn from(err: serde_json::Error) -> Self {
        GenerationError::Serialization(err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure Classification
// ─────────────────────────────────────────────────────────────────────────────

/// How a failed attempt moves the orchestration cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Quota or rate limit hit. Scoped to the credential.
    Quota,
    /// Anything else (model not found, server error, ...). Scoped to the model.
    Other,
}

/// Message fragments that mark a quota or rate-limit failure.
const QUOTA_MARKERS: &[&str] = &[
    "429",
    "quota",
    "resource_exhausted",
    "rate limit",
    "too many requests",
];

/// Classify a provider failure as quota-related or not.
///
/// Status 429 is always a quota failure. Otherwise the rendered message is
/// matched case-insensitively against known provider phrasings.
pub fn classify(error: &GenerationError) -> FailureClass {
    if error.status() == Some(429) {
        return FailureClass::Quota;
    }

    let text = error.to_string().to_lowercase();
    if QUOTA_MARKERS.iter().any(|marker| text.contains(marker)) {
        FailureClass::Quota
    } else {
        FailureClass::Other
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestration Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error returned when no credential/model combination produced a stream.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// The credential pool is empty.
    #[error("Configuration error: no valid API keys configured")]
    NoCredentials,

    /// The model preference list is empty.
    #[error("Configuration error: no generation models configured")]
    NoModels,

    /// Every combination was tried and failed.
    #[error(
        "all {} key/model combinations failed: {last_error}",
        .attempts.len()
    )]
    Exhausted {
        /// Every attempt made, in traversal order.
        attempts: Vec<GenerationAttempt>,
        /// The last observed failure.
        #[source]
        last_error: GenerationError,
        /// Classification of the last failure.
        last_class: FailureClass,
    },
}

impl OrchestrationError {
    /// Returns true if the last failure was a quota failure.
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(
            self,
            Self::Exhausted {
                last_class: FailureClass::Quota,
                ..
            }
        )
    }

    /// Returns true if this is a configuration problem rather than an upstream failure.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::NoCredentials | Self::NoModels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_429() {
        let err = GenerationError::provider(429, "slow down");
        assert_eq!(classify(&err), FailureClass::Quota);
    }

    #[test]
    fn test_classify_recorded_provider_samples() {
        let samples = [
            (
                GenerationError::provider(
                    400,
                    "[GoogleGenerativeAI Error]: [429 Too Many Requests] Resource has been exhausted (e.g. check quota).",
                ),
                FailureClass::Quota,
            ),
            (
                GenerationError::provider(
                    403,
                    "Quota exceeded for quota metric 'Generate Content API requests per minute'",
                ),
                FailureClass::Quota,
            ),
            (
                GenerationError::provider(
                    400,
                    "You exceeded your current quota (RESOURCE_EXHAUSTED)",
                ),
                FailureClass::Quota,
            ),
            (
                GenerationError::Stream("Rate limit reached for requests".to_string()),
                FailureClass::Quota,
            ),
            (
                GenerationError::provider(
                    404,
                    "models/gemini-9-ultra is not found for API version v1beta (NOT_FOUND)",
                ),
                FailureClass::Other,
            ),
            (
                GenerationError::provider(503, "The model is overloaded. Please try again later."),
                FailureClass::Other,
            ),
            (
                GenerationError::provider(400, "API key not valid. Please pass a valid API key."),
                FailureClass::Other,
            ),
            (
                GenerationError::Network("Connection failed: dns error".to_string()),
                FailureClass::Other,
            ),
        ];

        for (error, expected) in samples {
            assert_eq!(classify(&error), expected, "sample: {}", error);
        }
    }

    #[test]
    fn test_is_retryable() {
        assert!(GenerationError::Network("reset".to_string()).is_retryable());
        assert!(!GenerationError::provider(500, "boom").is_retryable());
        assert!(!GenerationError::Config("no key".to_string()).is_retryable());
    }

    #[test]
    fn test_status() {
        assert_eq!(GenerationError::provider(404, "missing").status(), Some(404));
        assert_eq!(GenerationError::Network("x".to_string()).status(), None);
    }

    #[test]
    fn test_orchestration_error_quota_flag() {
        let err = OrchestrationError::Exhausted {
            attempts: Vec::new(),
            last_error: GenerationError::provider(429, "quota"),
            last_class: FailureClass::Quota,
        };
        assert!(err.is_quota_exhausted());
        assert!(!err.is_config());
        assert!(err.to_string().contains("all 0 key/model combinations failed"));

        assert!(OrchestrationError::NoCredentials.is_config());
        assert!(!OrchestrationError::NoCredentials.is_quota_exhausted());
    }
}
