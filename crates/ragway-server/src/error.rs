//! Error types for the server.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ragway_llm::OrchestrationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message returned when every credential ran out of quota.
pub const QUOTA_EXHAUSTED_MESSAGE: &str =
    "AI usage limit reached on all keys. Every key/model combination was tried; add more keys or try again later.";

/// Server error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Authentication failed.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Inbound rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Every credential/model combination failed, last on quota.
    #[error("{message}")]
    QuotaExhausted {
        /// Client-facing message.
        message: String,
        /// Last upstream error.
        last_error: String,
    },

    /// Every credential/model combination failed.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Service unavailable.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<OrchestrationError> for ServerError {
    fn from(e: OrchestrationError) -> Self {
        match e {
            OrchestrationError::NoCredentials => {
                ServerError::Config("no valid API keys configured".to_string())
            }
            OrchestrationError::NoModels => {
                ServerError::Config("no generation models configured".to_string())
            }
            OrchestrationError::Exhausted {
                ref last_error,
                last_class,
                ..
            } if last_class == ragway_llm::FailureClass::Quota => ServerError::QuotaExhausted {
                message: QUOTA_EXHAUSTED_MESSAGE.to_string(),
                last_error: last_error.to_string(),
            },
            OrchestrationError::Exhausted { last_error, .. } => {
                ServerError::Generation(last_error.to_string())
            }
        }
    }
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ServerError {
    /// HTTP status and machine-readable code.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ServerError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ServerError::RateLimitExceeded => {
                (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded")
            }
            ServerError::QuotaExhausted { .. } => (StatusCode::TOO_MANY_REQUESTS, "quota_exhausted"),
            ServerError::Generation(_) => (StatusCode::INTERNAL_SERVER_ERROR, "generation_failed"),
            ServerError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            ServerError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            ServerError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "serialization_error")
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = self.to_string();

        match &self {
            ServerError::QuotaExhausted { last_error, .. } => {
                tracing::error!(status = %status, code, last_error = %last_error, "All keys exhausted");
            }
            e if status.is_server_error() => {
                tracing::error!(status = %status, code, error = %e, "Server error");
            }
            _ => {
                tracing::warn!(status = %status, code, error = %message, "Client error");
            }
        }

        let body = ErrorResponse {
            code: code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragway_llm::{FailureClass, GenerationError};

    #[test]
    fn test_orchestration_error_mapping() {
        let err: ServerError = OrchestrationError::NoCredentials.into();
        assert_eq!(err.status_and_code().0, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("no valid API keys"));

        let err: ServerError = OrchestrationError::Exhausted {
            attempts: Vec::new(),
            last_error: GenerationError::provider(429, "quota"),
            last_class: FailureClass::Quota,
        }
        .into();
        assert_eq!(err.status_and_code(), (StatusCode::TOO_MANY_REQUESTS, "quota_exhausted"));
        assert!(err.to_string().contains("all keys"));

        let err: ServerError = OrchestrationError::Exhausted {
            attempts: Vec::new(),
            last_error: GenerationError::provider(404, "model not found"),
            last_class: FailureClass::Other,
        }
        .into();
        assert_eq!(err.status_and_code().0, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("model not found"));
    }

    #[tokio::test]
    async fn test_into_response_body() {
        let response = ServerError::BadRequest("messages must not be empty".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.code, "bad_request");
        assert!(parsed.message.contains("messages must not be empty"));
    }
}
