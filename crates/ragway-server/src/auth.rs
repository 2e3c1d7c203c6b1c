//! Authentication middleware.
//!
//! Session validation is delegated to a [`SessionValidator`]. Three are
//! provided: the store's auth endpoint, a shared static token, and a
//! pass-through for local use.
//!
//! # Security
//!
//! Static token comparison uses constant-time comparison to prevent timing attacks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::error::ServerError;
use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Identity {
    /// Auth is disabled.
    Anonymous,
    /// Authenticated via the shared static token.
    Token,
    /// Authenticated user session.
    User { id: String },
}

impl Identity {
    /// The user id, if this is a user session.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Identity::User { id } => Some(id),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth Error
// ─────────────────────────────────────────────────────────────────────────────

/// Authentication error.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// Missing authorization header.
    MissingToken,
    /// Invalid token format.
    InvalidFormat,
    /// Token validation failed.
    InvalidToken,
    /// The identity provider could not be reached.
    ProviderUnavailable(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "Missing authorization token"),
            AuthError::InvalidFormat => write!(f, "Invalid authorization format"),
            AuthError::InvalidToken => write!(f, "Invalid or expired session"),
            AuthError::ProviderUnavailable(e) => write!(f, "Identity provider unavailable: {}", e),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<AuthError> for ServerError {
    fn from(e: AuthError) -> Self {
        match &e {
            AuthError::ProviderUnavailable(_) => ServerError::ServiceUnavailable(e.to_string()),
            _ => ServerError::Unauthorized("Please log in again.".to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::debug!(error = %self, "Authentication failed");
        ServerError::from(self).into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Validators
// ─────────────────────────────────────────────────────────────────────────────

/// Validates a bearer token and resolves the caller's identity.
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// Validate `token` (the bearer value, if any).
    async fn validate(&self, token: Option<&str>) -> Result<Identity, AuthError>;
}

/// A validator that can be shared across threads.
pub type SharedSessionValidator = Arc<dyn SessionValidator>;

/// Accepts every request.
pub struct DisabledValidator;

#[async_trait]
impl SessionValidator for DisabledValidator {
    async fn validate(&self, _token: Option<&str>) -> Result<Identity, AuthError> {
        Ok(Identity::Anonymous)
    }
}

/// Accepts a single shared token.
pub struct StaticTokenValidator {
    token: String,
}

impl StaticTokenValidator {
    /// Create a validator for `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl SessionValidator for StaticTokenValidator {
    async fn validate(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        let token = token.ok_or(AuthError::MissingToken)?;
        if constant_time_eq(token, &self.token) {
            Ok(Identity::Token)
        } else {
            Err(AuthError::InvalidToken)
        }
    }
}

/// Validates user access tokens against `{url}/auth/v1/user`.
pub struct SupabaseSessionValidator {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct AuthUser {
    id: String,
}

impl SupabaseSessionValidator {
    /// Create a validator for the project at `url`, sending `api_key` as `apikey`.
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AuthError::ProviderUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl SessionValidator for SupabaseSessionValidator {
    async fn validate(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        let token = token.ok_or(AuthError::MissingToken)?;

        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.url))
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthError::InvalidToken);
        }
        if !status.is_success() {
            return Err(AuthError::ProviderUnavailable(format!("HTTP {}", status)));
        }

        let user: AuthUser = response
            .json()
            .await
            .map_err(|_| AuthError::InvalidToken)?;
        Ok(Identity::User { id: user.id })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Security Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Compare two strings in constant time.
///
/// The comparison takes the same time regardless of how many characters
/// match. Length differences still return false without an early exit.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    if a_bytes.len() == b_bytes.len() {
        a_bytes.ct_eq(b_bytes).into()
    } else {
        let _ = a_bytes.ct_eq(a_bytes);
        false
    }
}

/// Extract the bearer value from an `Authorization` header.
fn bearer_token(request: &Request<Body>) -> Result<Option<&str>, AuthError> {
    let Some(header) = request.headers().get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = header.to_str().map_err(|_| AuthError::InvalidFormat)?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidFormat)?
        .trim();
    if token.is_empty() {
        return Err(AuthError::InvalidFormat);
    }
    Ok(Some(token))
}

// ─────────────────────────────────────────────────────────────────────────────
// Middleware
// ─────────────────────────────────────────────────────────────────────────────

/// Authentication middleware function.
///
/// Validates the request and injects the `Identity` into request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(&request)?.map(str::to_string);
    let identity = state.validator.validate(token.as_deref()).await?;

    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}
