//! Retrieval client: embed the query, then search.

use ragway_llm::SharedEmbedder;
use std::time::Instant;

use crate::error::{Result, RetrievalError};
use crate::store::SharedVectorStore;
use crate::types::{RetrievedChunk, ScopeMode, SearchScope};

/// Default match count for a global search.
pub const DEFAULT_MATCH_COUNT: usize = 100;

/// Default match count for a user-scoped search.
pub const DEFAULT_SCOPED_MATCH_COUNT: usize = 25;

/// Retrieval tuning.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    /// How the search scope is chosen.
    pub scope: ScopeMode,
    /// Match count for global search.
    pub match_count: usize,
    /// Match count for user-scoped search.
    pub scoped_match_count: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            scope: ScopeMode::Global,
            match_count: DEFAULT_MATCH_COUNT,
            scoped_match_count: DEFAULT_SCOPED_MATCH_COUNT,
        }
    }
}

/// Embeds a query and runs a similarity search.
#[derive(Clone)]
pub struct RetrievalClient {
    embedder: SharedEmbedder,
    store: SharedVectorStore,
    options: RetrievalOptions,
}

impl RetrievalClient {
    /// Create a client.
    pub fn new(embedder: SharedEmbedder, store: SharedVectorStore, options: RetrievalOptions) -> Self {
        Self {
            embedder,
            store,
            options,
        }
    }

    /// Scope and match count for a caller.
    ///
    /// User scope needs an identity; without one the search is global.
    pub fn scope_for(&self, identity: Option<&str>) -> (SearchScope, usize) {
        match (self.options.scope, identity) {
            (ScopeMode::User, Some(id)) => (
                SearchScope::User(id.to_string()),
                self.options.scoped_match_count,
            ),
            _ => (SearchScope::Global, self.options.match_count),
        }
    }

    /// Retrieve ranked chunks for `query`.
    pub async fn retrieve(
        &self,
        query: &str,
        identity: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }

        let start = Instant::now();
        let embedding = self.embedder.embed(query).await?;
        let (scope, match_count) = self.scope_for(identity);
        let mut chunks = self.store.search(&embedding, match_count, &scope).await?;
        chunks.truncate(match_count);

        tracing::debug!(
            chunks = chunks.len(),
            match_count,
            scope = %scope,
            duration_ms = start.elapsed().as_millis() as u64,
            "Retrieved chunks"
        );

        Ok(chunks)
    }

    /// Retrieve, degrading any failure to an empty result.
    pub async fn retrieve_or_empty(&self, query: &str, identity: Option<&str>) -> Vec<RetrievedChunk> {
        match self.retrieve(query, identity).await {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::warn!(error = %e, "Retrieval failed, continuing without context");
                Vec::new()
            }
        }
    }
}
