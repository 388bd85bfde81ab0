use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::document::RawDocument;
use crate::error::{IngestError, Result};

pub struct FileReader;

impl FileReader {
    /// `.txt` and `.md` only.
    pub fn is_supported(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("txt") | Some("md")
        )
    }

    pub async fn read_file(path: &Path) -> Result<RawDocument> {
        if !Self::is_supported(path) {
            return Err(IngestError::UnsupportedFormat(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).await.map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = content.len(), "Read document");

        Ok(RawDocument::new(path.to_string_lossy(), content))
    }

    /// Supported files under `dir`, sorted so runs are reproducible.
    pub fn list_directory(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| Self::is_supported(path))
            .collect();
        files.sort();
        files
    }

    pub async fn read_directory(dir: &Path) -> Result<Vec<RawDocument>> {
        let mut documents = Vec::new();
        for path in Self::list_directory(dir) {
            documents.push(Self::read_file(&path).await?);
        }
        Ok(documents)
    }

    /// Delete a source file that was rejected as too short.
    pub async fn remove_source(path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Removed rejected input file");
        Ok(())
    }
}
