//! Schema-constrained extraction of summaries, bankruptcy risk, entities and
//! relations from financial narrative text.
//!
//! A [`Pipeline`] chunks a document, sends each chunk through a
//! [`SchemaClient`] under a [`RetryController`], and folds the chunk results
//! into one [`ConsolidatedResult`] whose entities are canonicalized by the
//! [`EntityNormalizer`].

pub mod client;
pub mod config;
pub mod error;
pub mod groq;
pub mod llm;
pub mod merge;
pub mod mock;
pub mod normalizer;
pub mod parser;
pub mod pipeline;
pub mod prompt;
pub mod retry;
pub mod schema;
pub mod similarity;

pub use client::SchemaClient;
pub use config::{LevelPolicy, PipelineConfig};
pub use error::{ExtractError, Result};
pub use groq::GroqClient;
pub use llm::{LlmClient, OllamaClient};
pub use merge::{ResultMerger, RunHeader};
pub use mock::{MockLlmClient, MockReply};
pub use normalizer::{
    CanonicalEntity, CanonicalId, EntityNormalizer, NormalizationIndex, normalize_name,
};
pub use pipeline::Pipeline;
pub use retry::{ChunkOutcome, RetryController, RetryOutcome, RetryPolicy, RetryState};
pub use schema::{
    ChunkReport, ChunkStatus, ConsolidatedLevel, ConsolidatedResult, Entity, EntityType,
    ExtractionResult, LevelStatus, Relation, RelationType, RiskBand, RunMetadata, RunStatus,
};
