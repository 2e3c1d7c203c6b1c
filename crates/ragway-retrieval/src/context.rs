//! Context assembly: name enrichment, rendering, citations.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::store::SharedDocumentDirectory;
use crate::types::{Citation, CitationPayload, RetrievedChunk};

/// Default name for documents missing from the directory.
pub const DEFAULT_FALLBACK_NAME: &str = "Untitled document";

/// Separator between rendered context blocks.
const BLOCK_SEPARATOR: &str = "\n\n";

/// Read-only `document_id → display name` map for one request.
#[derive(Debug, Clone, Default)]
pub struct DocumentNameMap {
    names: HashMap<String, String>,
    fallback: String,
}

impl DocumentNameMap {
    /// Build from a lookup result and fallback name.
    pub fn new(names: HashMap<String, String>, fallback: impl Into<String>) -> Self {
        Self {
            names,
            fallback: fallback.into(),
        }
    }

    /// Display name for `document_id`, or the fallback.
    pub fn name_of(&self, document_id: &str) -> &str {
        self.names
            .get(document_id)
            .map(String::as_str)
            .unwrap_or(&self.fallback)
    }

    /// Number of resolved names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if no name was resolved.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Rendered prompt context. Empty when nothing was retrieved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptContext(String);

impl PromptContext {
    /// The rendered text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if there is no context.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PromptContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Output of [`ContextAssembler::assemble`].
#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
    /// Names resolved for this request.
    pub names: DocumentNameMap,
    /// Prompt context block.
    pub context: PromptContext,
    /// Citations in ranked order.
    pub citations: CitationPayload,
}

/// Turns ranked chunks into a prompt context and citation list.
#[derive(Clone)]
pub struct ContextAssembler {
    directory: SharedDocumentDirectory,
    fallback_name: String,
    max_chunks: usize,
}

impl ContextAssembler {
    /// Create an assembler.
    pub fn new(directory: SharedDocumentDirectory, max_chunks: usize) -> Self {
        Self {
            directory,
            fallback_name: DEFAULT_FALLBACK_NAME.to_string(),
            max_chunks,
        }
    }

    /// Override the fallback document name.
    pub fn with_fallback_name(mut self, name: impl Into<String>) -> Self {
        self.fallback_name = name.into();
        self
    }

    /// Assemble context for `chunks`, preserving their order.
    ///
    /// Exact duplicate passages are dropped and the list is capped at the
    /// configured maximum. A failed name lookup falls back to the default
    /// name for every document.
    pub async fn assemble(&self, chunks: Vec<RetrievedChunk>) -> AssembledContext {
        let chunks = dedup(chunks, self.max_chunks);
        if chunks.is_empty() {
            return AssembledContext {
                names: DocumentNameMap::new(HashMap::new(), self.fallback_name.clone()),
                ..Default::default()
            };
        }

        let mut seen = HashSet::new();
        let ids: Vec<String> = chunks
            .iter()
            .filter(|c| seen.insert(c.document_id.as_str()))
            .map(|c| c.document_id.clone())
            .collect();

        let resolved = match self.directory.names(&ids).await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(error = %e, documents = ids.len(), "Document name lookup failed");
                HashMap::new()
            }
        };
        let names = DocumentNameMap::new(resolved, self.fallback_name.clone());

        let context = render(&chunks, &names);
        let citations = CitationPayload {
            citations: chunks
                .into_iter()
                .map(|c| Citation {
                    document_name: names.name_of(&c.document_id).to_string(),
                    document_id: c.document_id,
                    page_number: c.page_number,
                    content: c.content,
                    similarity_rank: c.similarity_rank,
                })
                .collect(),
        };

        tracing::debug!(
            chunks = citations.len(),
            documents = ids.len(),
            resolved = names.len(),
            context_chars = context.as_str().len(),
            "Assembled context"
        );

        AssembledContext {
            names,
            context,
            citations,
        }
    }
}

fn dedup(chunks: Vec<RetrievedChunk>, max: usize) -> Vec<RetrievedChunk> {
    let mut seen: HashSet<(String, Option<u32>, String)> = HashSet::new();
    chunks
        .into_iter()
        .filter(|c| seen.insert((c.document_id.clone(), c.page_number, c.content.clone())))
        .take(max)
        .collect()
}

/// Render chunks as `[File: <name>, Page: <page>] <content>` blocks.
fn render(chunks: &[RetrievedChunk], names: &DocumentNameMap) -> PromptContext {
    let blocks: Vec<String> = chunks
        .iter()
        .map(|c| {
            let page = c
                .page_number
                .map(|p| p.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            format!(
                "[File: {}, Page: {}] {}",
                names.name_of(&c.document_id),
                page,
                c.content
            )
        })
        .collect();
    PromptContext(blocks.join(BLOCK_SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockDocumentDirectory;
    use std::sync::Arc;

    fn assembler(dir: Arc<MockDocumentDirectory>) -> ContextAssembler {
        ContextAssembler::new(dir, 100)
    }

    #[tokio::test]
    async fn test_two_chunks_same_document() {
        let dir = Arc::new(MockDocumentDirectory::new([("doc-a", "Doc A")]));
        let out = assembler(dir.clone())
            .assemble(vec![
                RetrievedChunk::new("doc-a", Some(3), "Rule X says stop.", 0),
                RetrievedChunk::new("doc-a", Some(5), "Rule X has exceptions.", 1),
            ])
            .await;

        assert_eq!(
            out.context.as_str(),
            "[File: Doc A, Page: 3] Rule X says stop.\n\n[File: Doc A, Page: 5] Rule X has exceptions."
        );
        assert_eq!(out.citations.len(), 2);
        assert!(out.citations.citations.iter().all(|c| c.document_name == "Doc A"));
        assert_eq!(out.citations.citations[0].page_number, Some(3));
        // one lookup, distinct ids only
        assert_eq!(dir.lookups(), vec![vec!["doc-a".to_string()]]);
    }

    #[tokio::test]
    async fn test_empty_chunks_skip_lookup() {
        let dir = Arc::new(MockDocumentDirectory::default());
        let out = assembler(dir.clone()).assemble(Vec::new()).await;

        assert!(out.context.is_empty());
        assert!(out.citations.is_empty());
        assert!(dir.lookups().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_document_uses_fallback() {
        let dir = Arc::new(MockDocumentDirectory::new([("doc-a", "Doc A")]));
        let out = assembler(dir)
            .with_fallback_name("Company document")
            .assemble(vec![
                RetrievedChunk::new("doc-z", None, "orphan", 0),
                RetrievedChunk::new("doc-a", Some(1), "known", 1),
            ])
            .await;

        assert!(
            out.context
                .as_str()
                .starts_with("[File: Company document, Page: unknown] orphan")
        );
        assert_eq!(out.citations.citations[0].document_name, "Company document");
        assert_eq!(out.citations.citations[1].document_name, "Doc A");
    }

    #[tokio::test]
    async fn test_lookup_failure_keeps_citations() {
        let out = assembler(Arc::new(MockDocumentDirectory::failing()))
            .assemble(vec![RetrievedChunk::new("doc-a", Some(2), "text", 0)])
            .await;

        assert_eq!(out.citations.len(), 1);
        assert_eq!(out.citations.citations[0].document_name, DEFAULT_FALLBACK_NAME);
    }

    #[tokio::test]
    async fn test_ranked_order_dedup_and_cap() {
        let dir = Arc::new(MockDocumentDirectory::default());
        let out = ContextAssembler::new(dir, 2)
            .assemble(vec![
                RetrievedChunk::new("d2", Some(9), "second doc", 0),
                RetrievedChunk::new("d2", Some(9), "second doc", 1),
                RetrievedChunk::new("d1", Some(1), "first doc", 2),
                RetrievedChunk::new("d1", Some(4), "dropped by cap", 3),
            ])
            .await;

        let ranks: Vec<usize> = out
            .citations
            .citations
            .iter()
            .map(|c| c.similarity_rank)
            .collect();
        assert_eq!(ranks, vec![0, 2]);
        assert!(!out.context.as_str().contains("dropped by cap"));
    }
}
