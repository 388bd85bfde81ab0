use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Document is too short to be worth extracting from. The caller is
    /// expected to discard the source.
    #[error("document {source_id} has {tokens} tokens, need at least {min}")]
    InvalidInput {
        source_id: String,
        tokens: usize,
        min: usize,
    },

    #[error("invalid chunker configuration: {0}")]
    InvalidConfig(String),

    #[error("unsupported file format: {0:?}")]
    UnsupportedFormat(PathBuf),

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IngestError {
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, IngestError::InvalidInput { .. })
    }
}
