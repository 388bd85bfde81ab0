use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    pub doc_id: String,
    pub chunk_id: String,
    pub index: usize,
    pub token_count: usize,
    pub text: String,
    pub offset: (usize, usize), // [start, end) token positions
}

impl TextChunk {
    pub fn new(doc_id: String, index: usize, tokens: &[impl AsRef<str>], offset: (usize, usize)) -> Self {
        let text = tokens
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(" ");
        // Generate stable chunk_id from content
        let chunk_id = Self::generate_chunk_id(&doc_id, &text, offset);

        Self {
            doc_id,
            chunk_id,
            index,
            token_count: tokens.len(),
            text,
            offset,
        }
    }

    fn generate_chunk_id(doc_id: &str, text: &str, offset: (usize, usize)) -> String {
        let mut hasher = Sha256::new();
        hasher.update(doc_id.as_bytes());
        hasher.update(text.as_bytes());
        hasher.update(offset.0.to_string().as_bytes());
        hasher.update(offset.1.to_string().as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16]) // Use first 16 bytes (32 hex chars)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.text.split(' ')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_joins_tokens() {
        let chunk = TextChunk::new("doc".into(), 0, &["Acme", "Corp", "filed"], (0, 3));
        assert_eq!(chunk.text, "Acme Corp filed");
        assert_eq!(chunk.token_count, 3);
        assert_eq!(chunk.tokens().count(), 3);
    }

    #[test]
    fn test_chunk_id_depends_on_offset() {
        let a = TextChunk::new("doc".into(), 0, &["same"], (0, 1));
        let b = TextChunk::new("doc".into(), 1, &["same"], (1, 2));
        assert_ne!(a.chunk_id, b.chunk_id);
        assert_eq!(a.chunk_id.len(), 32);
    }
}
