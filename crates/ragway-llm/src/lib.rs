//! Generation layer for ragway.
//!
//! This crate owns everything between an assembled prompt and an open token
//! stream: the credential pool, the model preference list, failure
//! classification, the fallback traversal, and the Gemini provider.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Orchestrator                           │
//! │  CredentialPool × ModelList traversal   │
//! │  classify() -> Quota | Other            │
//! └─────────────────────────────────────────┘
//!                    │ open_stream()
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │  GenerationBackend trait                │
//! │  - open_stream() -> TokenStream         │
//! └─────────────────────────────────────────┘
//!          │                     │
//!          ▼                     ▼
//!   ┌──────────────┐      ┌─────────────┐
//!   │GeminiBackend │      │ MockBackend │
//!   └──────────────┘      └─────────────┘
//! ```
//!
//! Query embedding lives here too ([`Embedder`]) since it shares the
//! provider and the first credential of the pool.

pub mod backend;
pub mod credentials;
pub mod embeddings;
pub mod error;
pub mod gemini;
pub mod orchestrator;

pub use backend::{
    GenerationBackend, MockBackend, MockOutcome, SharedBackend, StreamEvent, TokenStream,
    with_retry,
};
pub use credentials::{Credential, CredentialPool, DEFAULT_MODELS, ModelList, mask_secret};
pub use embeddings::{
    DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_MODEL, Embedder, GeminiEmbedder,
    GeminiEmbedderConfig, MockEmbedder, SharedEmbedder,
};
pub use error::{FailureClass, GenerationError, OrchestrationError, Result, classify};
pub use gemini::{DEFAULT_GEMINI_BASE, GeminiBackend, GeminiConfig};
pub use orchestrator::{
    AttemptOutcome, GenerationAttempt, Orchestrator, Selection, Slot, Transition, Traversal,
};
