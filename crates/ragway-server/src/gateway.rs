//! Request pipeline: retrieval, context assembly, prompt, orchestration.

use std::time::Instant;

use ragway_llm::{OrchestrationError, Orchestrator};
use ragway_retrieval::{ContextAssembler, PromptBuilder, RetrievalClient};

use crate::auth::Identity;
use crate::error::{Result, ServerError};
use crate::merge::GroundedResponse;

/// The grounded answer pipeline shared by all requests.
///
/// Everything here is read-only after construction.
#[derive(Clone)]
pub struct Gateway {
    retrieval: RetrievalClient,
    assembler: ContextAssembler,
    prompts: PromptBuilder,
    orchestrator: Orchestrator,
}

impl Gateway {
    /// Create a gateway.
    pub fn new(
        retrieval: RetrievalClient,
        assembler: ContextAssembler,
        prompts: PromptBuilder,
        orchestrator: Orchestrator,
    ) -> Self {
        Self {
            retrieval,
            assembler,
            prompts,
            orchestrator,
        }
    }

    /// Number of configured credentials.
    pub fn credential_count(&self) -> usize {
        self.orchestrator.credentials().len()
    }

    /// Number of configured models.
    pub fn model_count(&self) -> usize {
        self.orchestrator.models().len()
    }

    /// Answer `query` for `identity`.
    ///
    /// Retrieval failures degrade to an empty context. The returned response
    /// holds exactly one open generation stream.
    pub async fn answer(&self, query: &str, identity: &Identity) -> Result<GroundedResponse> {
        if self.orchestrator.credentials().is_empty() {
            return Err(OrchestrationError::NoCredentials.into());
        }

        let start = Instant::now();
        let chunks = self.retrieval.retrieve_or_empty(query, identity.user_id()).await;
        let assembled = self.assembler.assemble(chunks).await;
        let prompt = self.prompts.build(&assembled.context, query);

        tracing::debug!(
            chunks = assembled.citations.len(),
            prompt_chars = prompt.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Prompt ready"
        );

        let selection = self
            .orchestrator
            .open_stream(&prompt)
            .await
            .map_err(ServerError::from)?;

        tracing::info!(
            credential = selection.credential_index,
            model = %selection.model,
            attempts = selection.attempts.len(),
            citations = assembled.citations.len(),
            "Generation stream opened"
        );

        Ok(GroundedResponse::new(
            assembled.citations,
            selection.stream,
            selection.model,
            selection.credential_index,
        ))
    }
}
