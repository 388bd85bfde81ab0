use serde::{Deserialize, Serialize};

use crate::generate_doc_id;

/// Immutable input text plus where it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    pub doc_id: String,
    pub source_id: String,
    text: String,
}

impl RawDocument {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        let source_id = source_id.into();
        Self {
            doc_id: generate_doc_id(&source_id),
            source_id,
            text: text.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whitespace-delimited tokens, in document order
    pub fn tokens(&self) -> Vec<&str> {
        self.text.split_whitespace().collect()
    }

    pub fn token_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}
