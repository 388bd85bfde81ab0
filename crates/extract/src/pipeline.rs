use futures::stream::{self, StreamExt};
use ingest::{Chunker, RawDocument};
use std::sync::Arc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::SchemaClient;
use crate::config::PipelineConfig;
use crate::error::{ExtractError, Result};
use crate::llm::LlmClient;
use crate::merge::{ResultMerger, RunHeader};
use crate::normalizer::EntityNormalizer;
use crate::retry::RetryController;
use crate::schema::ConsolidatedResult;

/// Chunk a document, extract every chunk, merge into one result.
///
/// Chunk extractions run concurrently up to `max_concurrent_chunks`, but
/// their outcomes reach the merger strictly in chunk order, so a fixed
/// input always yields the same canonical names.
pub struct Pipeline<C: ?Sized> {
    client: SchemaClient<C>,
    chunker: Chunker,
    normalizer: EntityNormalizer,
    config: PipelineConfig,
}

impl<C: LlmClient + ?Sized> Pipeline<C> {
    pub fn new(llm: Arc<C>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let chunker = Chunker::new(config.chunker_config())
            .map_err(|e| ExtractError::Config(e.to_string()))?;

        Ok(Self {
            client: SchemaClient::new(llm, config.call_timeout()),
            chunker,
            normalizer: EntityNormalizer::new(config.similarity_threshold),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    /// Only a too-short document is an error here; chunk failures end up
    /// in the result's metadata.
    pub async fn run(&self, document: &RawDocument) -> Result<ConsolidatedResult> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();

        let tokens = document.tokens();
        let chunks = self.chunker.chunk(&document.doc_id, &tokens)?;

        info!(
            %run_id,
            source_id = %document.source_id,
            tokens = tokens.len(),
            chunks = chunks.total(),
            model = self.model_name(),
            "Starting extraction run"
        );

        let deadline = self.config.run_timeout().map(|timeout| started + timeout);
        let mut controller = RetryController::new(self.config.retry_policy());
        if let Some(deadline) = deadline {
            controller = controller.with_deadline(deadline);
        }

        let mut merger = ResultMerger::new(self.normalizer.clone(), self.config.level_policy);

        let controller = &controller;
        let client = &self.client;
        let mut outcomes = stream::iter(chunks.clone())
            .map(|chunk| controller.extract(client, chunk))
            .buffered(self.config.max_concurrent_chunks);

        let expired = async {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(expired);

        let mut truncated = false;
        loop {
            tokio::select! {
                biased;
                next = outcomes.next() => match next {
                    Some(outcome) => {
                        debug!(
                            chunk_index = outcome.chunk.index,
                            status = ?outcome.status,
                            attempts = outcome.attempts,
                            "Merging chunk"
                        );
                        merger.push(outcome);
                    }
                    None => break,
                },
                () = &mut expired => {
                    warn!(
                        %run_id,
                        merged = merger.merged_chunks(),
                        total = chunks.total(),
                        "Run deadline reached, cancelling outstanding chunks"
                    );
                    truncated = true;
                    break;
                }
            }
        }
        // Dropping the stream cancels every in-flight attempt
        drop(outcomes);

        if truncated {
            for chunk in chunks.skip(merger.merged_chunks()) {
                merger.cancel(chunk.index, chunk.chunk_id);
            }
        }

        let header = RunHeader {
            run_id,
            source_id: document.source_id.clone(),
            doc_id: document.doc_id.clone(),
            model: self.model_name().to_string(),
            total_tokens: tokens.len(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        let result = merger.finish(header, truncated);

        info!(
            %run_id,
            status = ?result.metadata.status,
            entities = result.entities.len(),
            relations = result.relations.len(),
            unresolved_relations = result.metadata.unresolved_relations,
            elapsed_ms = result.metadata.elapsed_ms,
            "Extraction run finished"
        );

        Ok(result)
    }
}
