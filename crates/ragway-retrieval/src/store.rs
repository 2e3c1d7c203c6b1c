//! Collaborator traits for vector search and document metadata.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, RetrievalError};
use crate::types::{RetrievedChunk, SearchScope};

/// Similarity search over document chunks.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return up to `match_count` chunks ordered by descending similarity.
    async fn search(
        &self,
        embedding: &[f32],
        match_count: usize,
        scope: &SearchScope,
    ) -> Result<Vec<RetrievedChunk>>;
}

/// Batch lookup of document display names.
#[async_trait]
pub trait DocumentDirectory: Send + Sync {
    /// Map each known id to its display name. Unknown ids are omitted.
    async fn names(&self, ids: &[String]) -> Result<HashMap<String, String>>;
}

/// A vector store that can be shared across threads.
pub type SharedVectorStore = Arc<dyn VectorStore>;

/// A document directory that can be shared across threads.
pub type SharedDocumentDirectory = Arc<dyn DocumentDirectory>;

// ─────────────────────────────────────────────────────────────────────────────
// Mocks
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory vector store for tests.
#[derive(Default)]
pub struct MockVectorStore {
    chunks: Vec<RetrievedChunk>,
    failure: Option<String>,
    searches: Mutex<Vec<(usize, SearchScope)>>,
}

impl MockVectorStore {
    /// A store that always returns `chunks` (truncated to `match_count`).
    pub fn new(chunks: Vec<RetrievedChunk>) -> Self {
        Self {
            chunks,
            ..Default::default()
        }
    }

    /// A store whose every search fails.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Default::default()
        }
    }

    /// `(match_count, scope)` of each search, in order.
    pub fn searches(&self) -> Vec<(usize, SearchScope)> {
        self.searches.lock().clone()
    }
}

#[async_trait]
impl VectorStore for MockVectorStore {
    async fn search(
        &self,
        _embedding: &[f32],
        match_count: usize,
        scope: &SearchScope,
    ) -> Result<Vec<RetrievedChunk>> {
        self.searches.lock().push((match_count, scope.clone()));
        if let Some(message) = &self.failure {
            return Err(RetrievalError::store(500, message.clone()));
        }
        Ok(self.chunks.iter().take(match_count).cloned().collect())
    }
}

/// In-memory document directory for tests.
#[derive(Default)]
pub struct MockDocumentDirectory {
    names: HashMap<String, String>,
    fail: bool,
    lookups: Mutex<Vec<Vec<String>>>,
}

impl MockDocumentDirectory {
    /// A directory holding the given `(id, name)` pairs.
    pub fn new<I, K, V>(names: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            names: names
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            ..Default::default()
        }
    }

    /// A directory whose every lookup fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Ids requested by each lookup, in order.
    pub fn lookups(&self) -> Vec<Vec<String>> {
        self.lookups.lock().clone()
    }
}

#[async_trait]
impl DocumentDirectory for MockDocumentDirectory {
    async fn names(&self, ids: &[String]) -> Result<HashMap<String, String>> {
        self.lookups.lock().push(ids.to_vec());
        if self.fail {
            return Err(RetrievalError::Network("directory unavailable".to_string()));
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.names.get(id).map(|name| (id.clone(), name.clone())))
            .collect())
    }
}
