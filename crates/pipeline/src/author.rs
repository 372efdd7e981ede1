//! Oracle-authored transformation programs.

use crate::feedback::Feedback;
use crate::prompts::{GenerationContext, PromptBuilder};
use sheetwise_core::CandidateProgram;
use sheetwise_oracle::{extract_code, Oracle, OracleError, Result};
use std::sync::Arc;
use tracing::{debug, info};

const GENERATION_SYSTEM: &str =
    "You are an expert programmer. Generate clean, efficient, production-ready code.";
const REGENERATION_SYSTEM: &str =
    "You are an expert debugger and programmer. Fix code issues precisely.";

/// Writes and revises candidate programs.
pub struct CodeAuthor {
    oracle: Arc<dyn Oracle>,
    prompts: PromptBuilder,
}

impl CodeAuthor {
    pub fn new(oracle: Arc<dyn Oracle>, prompts: PromptBuilder) -> Self {
        Self { oracle, prompts }
    }

    /// First program for a job.
    pub async fn generate_code(&self, context: &GenerationContext<'_>) -> Result<CandidateProgram> {
        let prompt = self.prompts.generation_prompt(context);
        let source = self.author(&prompt, GENERATION_SYSTEM).await?;
        info!(chars = source.len(), "Generated transformation program");
        Ok(CandidateProgram::generated(source))
    }

    /// A new program replacing `previous`, which failed with `feedback`.
    pub async fn regenerate_code(
        &self,
        previous: &CandidateProgram,
        feedback: &Feedback,
    ) -> Result<CandidateProgram> {
        let prompt = self.prompts.regeneration_prompt(previous, feedback);
        let source = self.author(&prompt, REGENERATION_SYSTEM).await?;
        let program = previous.successor(source);
        info!(
            generation = program.generation(),
            failure = %feedback.kind,
            "Regenerated transformation program"
        );
        Ok(program)
    }

    async fn author(&self, prompt: &str, system: &str) -> Result<String> {
        let response = self.oracle.generate(prompt, Some(system)).await?;
        let code = extract_code(&response, self.prompts.language().fence_tag());
        if code.trim().is_empty() {
            return Err(OracleError::EmptyResponse);
        }
        debug!(chars = code.len(), "Extracted program source");
        Ok(code)
    }
}
