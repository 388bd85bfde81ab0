use crate::chunk::TextChunk;
use crate::error::{IngestError, Result};

/// Documents shorter than this are not worth a model call.
pub const MIN_DOCUMENT_TOKENS: usize = 50;

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub max_tokens: usize,
    pub min_document_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            min_document_tokens: MIN_DOCUMENT_TOKENS,
        }
    }
}

/// Splits a token sequence into contiguous, non-overlapping chunks of at
/// most `max_tokens` tokens.
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        if config.max_tokens == 0 {
            return Err(IngestError::InvalidConfig(
                "max_tokens must be greater than 0".to_string(),
            ));
        }
        Ok(Self { config })
    }

    /// Lazily chunk `tokens`. Nothing is built until the iterator is driven,
    /// and the iterator can be cloned to walk the chunks again.
    pub fn chunk<'t, S: AsRef<str>>(
        &self,
        doc_id: &str,
        tokens: &'t [S],
    ) -> Result<TokenChunks<'t, S>> {
        if tokens.len() < self.config.min_document_tokens {
            return Err(IngestError::InvalidInput {
                source_id: doc_id.to_string(),
                tokens: tokens.len(),
                min: self.config.min_document_tokens,
            });
        }

        Ok(TokenChunks {
            doc_id: doc_id.to_string(),
            tokens,
            max_tokens: self.config.max_tokens,
            next_index: 0,
        })
    }
}

#[derive(Debug)]
pub struct TokenChunks<'t, S> {
    doc_id: String,
    tokens: &'t [S],
    max_tokens: usize,
    next_index: usize,
}

// Manual impl: `S` itself need not be Clone, only the borrowed slice is copied.
impl<S> Clone for TokenChunks<'_, S> {
    fn clone(&self) -> Self {
        Self {
            doc_id: self.doc_id.clone(),
            tokens: self.tokens,
            max_tokens: self.max_tokens,
            next_index: self.next_index,
        }
    }
}

impl<S: AsRef<str>> TokenChunks<'_, S> {
    /// Total number of chunks this sequence yields from the start.
    pub fn total(&self) -> usize {
        self.tokens.len().div_ceil(self.max_tokens)
    }
}

impl<S: AsRef<str>> Iterator for TokenChunks<'_, S> {
    type Item = TextChunk;

    fn next(&mut self) -> Option<TextChunk> {
        let start = self.next_index * self.max_tokens;
        if start >= self.tokens.len() {
            return None;
        }
        let end = (start + self.max_tokens).min(self.tokens.len());
        let chunk = TextChunk::new(
            self.doc_id.clone(),
            self.next_index,
            &self.tokens[start..end],
            (start, end),
        );
        self.next_index += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total().saturating_sub(self.next_index);
        (remaining, Some(remaining))
    }
}

impl<S: AsRef<str>> ExactSizeIterator for TokenChunks<'_, S> {}
