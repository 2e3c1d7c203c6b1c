//! Grounded prompt construction.

use crate::context::PromptContext;

/// Default reply when the context does not contain the answer.
pub const DEFAULT_NOT_FOUND_SENTINEL: &str = "Not found in the uploaded documents.";

/// Default assistant role line.
pub const DEFAULT_ASSISTANT_ROLE: &str =
    "You are an expert assistant that answers questions about the uploaded documents.";

/// Builds the single-turn prompt sent to the generation model.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    assistant_role: String,
    answer_language: Option<String>,
    not_found_sentinel: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            assistant_role: DEFAULT_ASSISTANT_ROLE.to_string(),
            answer_language: None,
            not_found_sentinel: DEFAULT_NOT_FOUND_SENTINEL.to_string(),
        }
    }
}

impl PromptBuilder {
    /// Override the assistant role line.
    pub fn with_assistant_role(mut self, role: impl Into<String>) -> Self {
        self.assistant_role = role.into();
        self
    }

    /// Ask for answers in a specific language.
    pub fn with_answer_language(mut self, language: impl Into<String>) -> Self {
        self.answer_language = Some(language.into());
        self
    }

    /// Override the not-found sentinel.
    pub fn with_not_found_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.not_found_sentinel = sentinel.into();
        self
    }

    /// The sentinel the model must reply with when the answer is absent.
    pub fn not_found_sentinel(&self) -> &str {
        &self.not_found_sentinel
    }

    /// Build the prompt for `query` over `context`.
    pub fn build(&self, context: &PromptContext, query: &str) -> String {
        let language = match &self.answer_language {
            Some(lang) => format!("Provide a comprehensive explanation in {}.", lang),
            None => "Provide a comprehensive explanation.".to_string(),
        };

        let instructions = [
            language,
            "Use ONLY the provided document context. Do not rely on outside knowledge.".to_string(),
            "Synthesize information from multiple pages if necessary to give a complete answer."
                .to_string(),
            "ALWAYS end with a \"Sources\" section listing each unique document name and its page(s) on a new line."
                .to_string(),
            format!(
                "If the EXACT answer is not present in the context, respond ONLY with: \"{}\"",
                self.not_found_sentinel
            ),
        ];

        let mut prompt = String::new();
        prompt.push_str(&self.assistant_role);
        prompt.push_str("\n\nINSTRUCTIONS:\n");
        for (i, line) in instructions.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, line));
        }
        prompt.push_str("\nCONTEXT DATA:\n");
        prompt.push_str(context.as_str());
        prompt.push_str("\n\nQuestion: ");
        prompt.push_str(query.trim());
        prompt.push_str("\n\nAnswer:");
        prompt
    }
}
