//! Retrieval and grounding for ragway.
//!
//! ```text
//! query ─► RetrievalClient ─► Vec<RetrievedChunk> ─► ContextAssembler ─► PromptBuilder
//!            │ embed + search                          │ name lookup
//!            ▼                                         ▼
//!       VectorStore                             DocumentDirectory
//! ```
//!
//! Retrieval failures never fail a request: [`RetrievalClient::retrieve_or_empty`]
//! logs and returns no chunks, and the prompt then tells the model to answer
//! with the not-found sentinel.

pub mod client;
pub mod context;
pub mod error;
pub mod postgrest;
pub mod prompt;
pub mod store;
pub mod types;

pub use client::{
    DEFAULT_MATCH_COUNT, DEFAULT_SCOPED_MATCH_COUNT, RetrievalClient, RetrievalOptions,
};
pub use context::{
    AssembledContext, ContextAssembler, DEFAULT_FALLBACK_NAME, DocumentNameMap, PromptContext,
};
pub use error::{Result, RetrievalError};
pub use postgrest::{
    DEFAULT_DOCUMENTS_TABLE, DEFAULT_SEARCH_FUNCTION, PostgrestConfig, PostgrestStore,
};
pub use prompt::{DEFAULT_ASSISTANT_ROLE, DEFAULT_NOT_FOUND_SENTINEL, PromptBuilder};
pub use store::{
    DocumentDirectory, MockDocumentDirectory, MockVectorStore, SharedDocumentDirectory,
    SharedVectorStore, VectorStore,
};
pub use types::{Citation, CitationPayload, RetrievedChunk, ScopeMode, SearchScope};
