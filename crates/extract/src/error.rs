use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExtractError>;

/// Failures of the extraction pipeline.
///
/// Only [`ExtractError::InvalidInput`] and [`ExtractError::Config`] ever reach
/// the caller of [`crate::Pipeline::run`]; per-chunk failures are absorbed
/// into the run metadata.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ingest::IngestError),

    /// Network, timeout or rate limit. Retryable.
    #[error("transport error: {0}")]
    Transport(String),

    /// Model output was not the expected JSON shape. Retryable.
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    /// Anything the retry loop must not repeat.
    #[error("fatal model error: {0}")]
    Fatal(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ExtractError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExtractError::Transport(_) | ExtractError::SchemaValidation(_)
        )
    }
}

impl From<serde_json::Error> for ExtractError {
    fn from(e: serde_json::Error) -> Self {
        ExtractError::SchemaValidation(e.to_string())
    }
}
