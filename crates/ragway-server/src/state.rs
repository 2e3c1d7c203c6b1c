//! Application state shared across handlers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::SharedSessionValidator;
use crate::config::ServerConfig;
use crate::gateway::Gateway;
use crate::ratelimit::{SharedRateLimiter, create_rate_limiter};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,

    /// Grounded answer pipeline.
    pub gateway: Arc<Gateway>,

    /// Session validator for API routes.
    pub validator: SharedSessionValidator,

    /// Inbound request limiter.
    pub limiter: SharedRateLimiter,

    /// Cancelled when the process is shutting down.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create a new application state.
    pub fn new(config: ServerConfig, gateway: Gateway, validator: SharedSessionValidator) -> Self {
        let limiter = create_rate_limiter(config.api_rpm);
        Self {
            config: Arc::new(config),
            gateway: Arc::new(gateway),
            validator,
            limiter,
            shutdown: CancellationToken::new(),
        }
    }

    /// Use an externally owned shutdown token.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::DisabledValidator;
    use ragway_llm::{CredentialPool, MockBackend, MockEmbedder, ModelList, Orchestrator};
    use ragway_retrieval::{
        ContextAssembler, MockDocumentDirectory, MockVectorStore, PromptBuilder, RetrievalClient,
        RetrievalOptions,
    };

    /// State over mock collaborators with auth disabled.
    pub(crate) fn test_state(config: ServerConfig) -> AppState {
        let retrieval = RetrievalClient::new(
            Arc::new(MockEmbedder::default()),
            Arc::new(MockVectorStore::new(Vec::new())),
            RetrievalOptions::default(),
        );
        let assembler = ContextAssembler::new(Arc::new(MockDocumentDirectory::default()), 100);
        let orchestrator = Orchestrator::new(
            Arc::new(MockBackend::with_text("ok")),
            CredentialPool::new(["test-key"]),
            ModelList::new(["m1"]),
        );
        let gateway = Gateway::new(retrieval, assembler, PromptBuilder::default(), orchestrator);
        AppState::new(config, gateway, Arc::new(DisabledValidator))
    }

    #[test]
    fn test_state_shares_limiter_across_clones() {
        let state = test_state(ServerConfig::new().with_api_rpm(1));
        let clone = state.clone();
        assert!(state.limiter.check().is_ok());
        assert!(clone.limiter.check().is_err());
    }
}
