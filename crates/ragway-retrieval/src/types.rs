//! Retrieval data types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One ranked passage returned by vector search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Owning document.
    pub document_id: String,
    /// Page the passage came from, when known.
    pub page_number: Option<u32>,
    /// Passage text.
    pub content: String,
    /// Zero-based rank in descending similarity order.
    pub similarity_rank: usize,
}

impl RetrievedChunk {
    /// Create a chunk.
    pub fn new(
        document_id: impl Into<String>,
        page_number: Option<u32>,
        content: impl Into<String>,
        similarity_rank: usize,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            page_number,
            content: content.into(),
            similarity_rank,
        }
    }
}

/// Which documents a search may match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchScope {
    /// Every document in the store.
    Global,
    /// Only documents owned by this identity.
    User(String),
}

impl SearchScope {
    /// The identity filter, if any.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Global => None,
            Self::User(id) => Some(id),
        }
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::User(_) => f.write_str("user"),
        }
    }
}

/// How the gateway picks a [`SearchScope`] for a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeMode {
    /// Search across every document.
    #[default]
    Global,
    /// Restrict to the caller's documents.
    User,
}

/// A citation attached to a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Source document.
    pub document_id: String,
    /// Display name, or the configured fallback.
    pub document_name: String,
    /// Source page, when known.
    pub page_number: Option<u32>,
    /// Cited passage.
    pub content: String,
    /// Rank of the passage in the search results.
    pub similarity_rank: usize,
}

/// The ordered citation list sent once, ahead of any generated text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitationPayload {
    /// Citations in ranked order.
    pub citations: Vec<Citation>,
}

impl CitationPayload {
    /// Returns true if there are no citations.
    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }

    /// Number of citations.
    pub fn len(&self) -> usize {
        self.citations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_user_id() {
        assert_eq!(SearchScope::Global.user_id(), None);
        assert_eq!(SearchScope::User("u-1".to_string()).user_id(), Some("u-1"));
    }

    #[test]
    fn test_scope_mode_serde() {
        let mode: ScopeMode = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(mode, ScopeMode::User);
        assert_eq!(ScopeMode::default(), ScopeMode::Global);
    }

    #[test]
    fn test_citation_payload_wire_shape() {
        let payload = CitationPayload {
            citations: vec![Citation {
                document_id: "d1".to_string(),
                document_name: "Doc A".to_string(),
                page_number: Some(3),
                content: "text".to_string(),
                similarity_rank: 0,
            }],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["citations"][0]["document_name"], "Doc A");
        assert_eq!(json["citations"][0]["page_number"], 3);

        let empty = serde_json::to_string(&CitationPayload::default()).unwrap();
        assert_eq!(empty, r#"{"citations":[]}"#);
    }
}
