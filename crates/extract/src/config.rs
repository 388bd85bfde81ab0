use ingest::{ChunkerConfig, MIN_DOCUMENT_TOKENS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ExtractError, Result};
use crate::normalizer::DEFAULT_SIMILARITY_THRESHOLD;
use crate::retry::RetryPolicy;

/// How per-chunk bankruptcy levels collapse into one.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LevelPolicy {
    /// Largest absolute value; ties go to the earliest chunk
    #[default]
    MaxMagnitude,
    /// Level of the last chunk that produced a result
    LastChunk,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_chunk_tokens: usize,
    pub min_document_tokens: usize,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub call_timeout_secs: u64,
    pub run_timeout_secs: Option<u64>,
    pub similarity_threshold: f64,
    pub max_concurrent_chunks: usize,
    pub level_policy: LevelPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_chunk_tokens: 2000,
            min_document_tokens: MIN_DOCUMENT_TOKENS,
            max_attempts: 5,
            base_backoff_ms: 120_000,
            call_timeout_secs: 120,
            run_timeout_secs: None,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_concurrent_chunks: 3,
            level_policy: LevelPolicy::MaxMagnitude,
        }
    }
}

impl PipelineConfig {
    /// Hosted models with generous rate limits: short waits, more parallelism.
    pub fn fast_mode() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 2_000,
            call_timeout_secs: 30,
            max_concurrent_chunks: 8,
            ..Self::default()
        }
    }

    /// Small local models: smaller chunks, one at a time, patient retries.
    pub fn accurate_mode() -> Self {
        Self {
            max_chunk_tokens: 1000,
            max_attempts: 5,
            call_timeout_secs: 300,
            max_concurrent_chunks: 1,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_tokens == 0 {
            return Err(ExtractError::Config(
                "max_chunk_tokens must be greater than zero".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ExtractError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_chunks == 0 {
            return Err(ExtractError::Config(
                "max_concurrent_chunks must be at least 1".to_string(),
            ));
        }
        if self.call_timeout_secs == 0 {
            return Err(ExtractError::Config(
                "call_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(ExtractError::Config(format!(
                "similarity_threshold must be in (0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.run_timeout_secs == Some(0) {
            return Err(ExtractError::Config(
                "run_timeout_secs must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            max_tokens: self.max_chunk_tokens,
            min_document_tokens: self.min_document_tokens,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_backoff_ms))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}
