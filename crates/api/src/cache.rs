use dashmap::DashMap;
use extract::{ConsolidatedResult, RunStatus};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Consolidated results keyed by document text and model, so re-submitting
/// an unchanged file skips the model calls.
pub struct ResultCache {
    results: Arc<DashMap<String, ConsolidatedResult>>,
    max_entries: usize,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ResultCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            results: Arc::new(DashMap::new()),
            max_entries,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, text: &str, model: &str) -> Option<ConsolidatedResult> {
        let key = Self::key(text, model);
        match self.results.get(&key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value().clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Only complete runs are cached. Degraded and truncated runs carry
    /// fallback or missing chunks and must reach the model again.
    pub fn insert(&self, text: &str, model: &str, result: &ConsolidatedResult) {
        if result.metadata.status != RunStatus::Complete {
            return;
        }
        if self.results.len() >= self.max_entries {
            // Simple eviction: clear 25% when full
            let to_remove: Vec<_> = self
                .results
                .iter()
                .take((self.max_entries / 4).max(1))
                .map(|r| r.key().clone())
                .collect();
            for key in to_remove {
                self.results.remove(&key);
            }
        }
        self.results.insert(Self::key(text, model), result.clone());
    }

    fn key(text: &str, model: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.results.len(),
            max_entries: self.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: usize,
    pub misses: usize,
}
