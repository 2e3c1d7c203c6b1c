//! HTTP gateway server for ragway.
//!
//! This crate exposes the grounded chat pipeline over HTTP.
//!
//! # Features
//!
//! - SSE streaming with a citation side channel
//! - Pluggable session validation
//! - Rate limiting
//! - Request logging
//! - Graceful shutdown that closes open streams
//!
//! # Example
//!
//! ```ignore
//! use ragway_server::{AppState, Gateway, Server, ServerConfig};
//!
//! let state = AppState::new(ServerConfig::new(), gateway, validator);
//! Server::from_state(state).run().await?;
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod merge;
pub mod ratelimit;
pub mod routes;
pub mod state;

pub use auth::{
    AuthError, DisabledValidator, Identity, SessionValidator, SharedSessionValidator,
    StaticTokenValidator, SupabaseSessionValidator, auth_middleware,
};
pub use config::ServerConfig;
pub use error::{ErrorResponse, QUOTA_EXHAUSTED_MESSAGE, Result, ServerError};
pub use gateway::Gateway;
pub use merge::{GroundedResponse, ResponseEvent, SHUTDOWN_MESSAGE};
pub use ratelimit::{
    SharedRateLimiter, create_rate_limiter, rate_limit_middleware, request_logging_middleware,
};
pub use routes::{ChatMessage, ChatRequest, HealthResponse};
pub use state::AppState;

use std::net::SocketAddr;

use axum::{Router, http::HeaderValue, middleware};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// The ragway HTTP server.
pub struct Server {
    /// Application state.
    state: AppState,
}

impl Server {
    /// Create a server from a pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// The application state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        let router = Router::new()
            .merge(routes::health_routes())
            .nest("/api/v1", self.api_routes())
            // Request logging (inner layer, runs first)
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                ratelimit::request_logging_middleware,
            ))
            // Rate limiting (outer layer, runs before request logging)
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                ratelimit::rate_limit_middleware,
            ))
            .layer(TraceLayer::new_for_http());

        let router = match self.cors_layer() {
            Some(cors) => router.layer(cors),
            None => router,
        };

        router.with_state(self.state.clone())
    }

    /// API routes (v1), all behind the auth middleware.
    fn api_routes(&self) -> Router<AppState> {
        use axum::routing::post;

        Router::new()
            .route("/chat/send", post(routes::chat_send_handler))
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                auth::auth_middleware,
            ))
    }

    fn cors_layer(&self) -> Option<CorsLayer> {
        let origins = &self.state.config.cors_origins;
        if origins.is_empty() {
            return None;
        }

        let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
        if origins.iter().any(|o| o == "*") {
            return Some(layer.allow_origin(Any));
        }

        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        Some(layer.allow_origin(AllowOrigin::list(parsed)))
    }

    /// Run the server on the configured address.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.bind_address;
        self.run_on(addr).await
    }

    /// Run the server on a specific address (useful for testing).
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind: {}", e)))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until the shutdown token fires.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let router = self.router();
        let shutdown = self.state.shutdown.clone();

        if let Ok(addr) = listener.local_addr() {
            info!(
                %addr,
                credentials = self.state.gateway.credential_count(),
                models = self.state.gateway.model_count(),
                "Starting server"
            );
        }

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {}", e)))?;

        info!("Server stopped");
        Ok(())
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_state;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_no_auth() {
        let app = Server::from_state(test_state(ServerConfig::new())).router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = Server::from_state(test_state(ServerConfig::new())).router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cors_preflight_allowed_origin() {
        let config = ServerConfig::new().with_cors_origins(vec!["http://localhost:3000".to_string()]);
        let app = Server::from_state(test_state(config)).router();
        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/v1/chat/send")
                    .header("Origin", "http://localhost:3000")
                    .header("Access-Control-Request-Method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("http://localhost:3000")
        );
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let state = test_state(ServerConfig::new());
        let shutdown = state.shutdown.clone();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let handle = tokio::spawn(Server::from_state(state).serve(listener));
        shutdown.cancel();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
