pub mod chunk;
pub mod chunker;
pub mod document;
pub mod error;
pub mod reader;
pub mod segment;

pub use chunk::TextChunk;
pub use chunker::{Chunker, ChunkerConfig, MIN_DOCUMENT_TOKENS, TokenChunks};
pub use document::RawDocument;
pub use error::{IngestError, Result};
pub use reader::FileReader;
pub use segment::{Passthrough, Segmenter, SentenceSegmenter};

use sha2::{Digest, Sha256};
use std::path::Path;

/// Generate a stable document ID from file path
pub fn generate_doc_id(path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

/// Read a file and run it through `segmenter`, keeping the source id.
pub async fn load_document(file_path: &Path, segmenter: &dyn Segmenter) -> Result<RawDocument> {
    let raw = FileReader::read_file(file_path).await?;
    Ok(RawDocument::new(raw.source_id.clone(), segmenter.prepare(raw.text())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_document_segments_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mdna.txt");
        std::fs::write(&path, "Liquidity\nremained tight.\n\nCash fell.").unwrap();

        let doc = load_document(&path, &SentenceSegmenter).await.unwrap();
        assert_eq!(doc.text(), "Liquidity remained tight. Cash fell.");
        assert_eq!(doc.source_id, path.to_string_lossy());
    }
}
