use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{ExtractError, Result};
use crate::llm::LlmClient;
use crate::parser::{Validated, parse_extraction};
use crate::prompt;

/// One schema-constrained model call per chunk: render the prompt, call
/// the model under a timeout, validate the answer.
pub struct SchemaClient<C: ?Sized> {
    llm: Arc<C>,
    call_timeout: Duration,
}

impl<C: ?Sized> Clone for SchemaClient<C> {
    fn clone(&self) -> Self {
        Self {
            llm: Arc::clone(&self.llm),
            call_timeout: self.call_timeout,
        }
    }
}

impl<C: LlmClient + ?Sized> SchemaClient<C> {
    pub fn new(llm: Arc<C>, call_timeout: Duration) -> Self {
        Self { llm, call_timeout }
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// `previous_error` carries the last validation failure so the re-prompt
    /// can point at it.
    pub async fn extract(&self, chunk_text: &str, previous_error: Option<&str>) -> Result<Validated> {
        let prompt = match previous_error {
            Some(error) => prompt::build_retry_prompt(chunk_text, error),
            None => prompt::build_extraction_prompt(chunk_text),
        };
        debug!("Prompt length: {} chars", prompt.len());

        let response = timeout(self.call_timeout, self.llm.complete(&prompt))
            .await
            .map_err(|_| {
                ExtractError::Transport(format!(
                    "model call timed out after {}s",
                    self.call_timeout.as_secs_f64()
                ))
            })??;
        debug!("LLM response length: {} chars", response.len());

        parse_extraction(&response)
    }
}
