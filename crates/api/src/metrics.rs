use extract::{ChunkStatus, ConsolidatedResult};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

pub struct Metrics {
    // Requests
    total_requests: AtomicUsize,
    failed_requests: AtomicUsize,

    // Documents
    documents_processed: AtomicUsize,
    documents_rejected: AtomicUsize,
    documents_failed: AtomicUsize,
    documents_truncated: AtomicUsize,
    cache_hits: AtomicUsize,

    // Chunks
    chunks_succeeded: AtomicUsize,
    chunks_exhausted: AtomicUsize,
    chunks_cancelled: AtomicUsize,

    // Output
    total_entities_extracted: AtomicUsize,
    total_relations_extracted: AtomicUsize,
    unresolved_relations: AtomicUsize,

    // Timing (in microseconds)
    total_extract_time_us: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            total_requests: AtomicUsize::new(0),
            failed_requests: AtomicUsize::new(0),
            documents_processed: AtomicUsize::new(0),
            documents_rejected: AtomicUsize::new(0),
            documents_failed: AtomicUsize::new(0),
            documents_truncated: AtomicUsize::new(0),
            cache_hits: AtomicUsize::new(0),
            chunks_succeeded: AtomicUsize::new(0),
            chunks_exhausted: AtomicUsize::new(0),
            chunks_cancelled: AtomicUsize::new(0),
            total_entities_extracted: AtomicUsize::new(0),
            total_relations_extracted: AtomicUsize::new(0),
            unresolved_relations: AtomicUsize::new(0),
            total_extract_time_us: AtomicU64::new(0),
        })
    }

    pub fn record_request(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_document(&self, duration: Duration, result: &ConsolidatedResult) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
        self.total_extract_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        if result.is_truncated() {
            self.documents_truncated.fetch_add(1, Ordering::Relaxed);
        }
        for chunk in &result.metadata.chunks {
            let counter = match chunk.status {
                ChunkStatus::Succeeded => &self.chunks_succeeded,
                ChunkStatus::Exhausted => &self.chunks_exhausted,
                ChunkStatus::Cancelled => &self.chunks_cancelled,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }

        self.total_entities_extracted
            .fetch_add(result.entities.len(), Ordering::Relaxed);
        self.total_relations_extracted
            .fetch_add(result.relations.len(), Ordering::Relaxed);
        self.unresolved_relations
            .fetch_add(result.metadata.unresolved_relations, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.documents_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let processed = self.documents_processed.load(Ordering::Relaxed);
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            documents_processed: processed,
            documents_rejected: self.documents_rejected.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            documents_truncated: self.documents_truncated.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            chunks_succeeded: self.chunks_succeeded.load(Ordering::Relaxed),
            chunks_exhausted: self.chunks_exhausted.load(Ordering::Relaxed),
            chunks_cancelled: self.chunks_cancelled.load(Ordering::Relaxed),
            total_entities_extracted: self.total_entities_extracted.load(Ordering::Relaxed),
            total_relations_extracted: self.total_relations_extracted.load(Ordering::Relaxed),
            unresolved_relations: self.unresolved_relations.load(Ordering::Relaxed),
            avg_extract_time_ms: avg_time_ms(&self.total_extract_time_us, processed),
        }
    }
}

fn avg_time_ms(total_us: &AtomicU64, count: usize) -> f64 {
    let total = total_us.load(Ordering::Relaxed) as f64;
    if count > 0 {
        total / count as f64 / 1000.0 // Convert to ms
    } else {
        0.0
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub failed_requests: usize,
    pub documents_processed: usize,
    pub documents_rejected: usize,
    pub documents_failed: usize,
    pub documents_truncated: usize,
    pub cache_hits: usize,
    pub chunks_succeeded: usize,
    pub chunks_exhausted: usize,
    pub chunks_cancelled: usize,
    pub total_entities_extracted: usize,
    pub total_relations_extracted: usize,
    pub unresolved_relations: usize,
    pub avg_extract_time_ms: f64,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::{ChunkReport, ConsolidatedLevel, RunMetadata, RunStatus};
    use uuid::Uuid;

    fn report(index: usize, status: ChunkStatus) -> ChunkReport {
        ChunkReport {
            index,
            chunk_id: format!("c{}", index),
            status,
            attempts: 1,
            dropped_relations: 0,
            error: None,
        }
    }

    #[test]
    fn test_record_document() {
        let metrics = Metrics::new();
        let result = ConsolidatedResult {
            summary: String::new(),
            bankruptcy_level: ConsolidatedLevel::indeterminate(),
            entities: Vec::new(),
            relations: Vec::new(),
            metadata: RunMetadata {
                run_id: Uuid::new_v4(),
                source_id: "a.txt".into(),
                doc_id: "a".into(),
                model: "mock".into(),
                status: RunStatus::Truncated,
                total_tokens: 60,
                chunks: vec![
                    report(0, ChunkStatus::Succeeded),
                    report(1, ChunkStatus::Exhausted),
                    report(2, ChunkStatus::Cancelled),
                ],
                unresolved_relations: 2,
                elapsed_ms: 10,
            },
        };

        metrics.record_document(Duration::from_millis(20), &result);
        metrics.record_document(Duration::from_millis(40), &result);
        metrics.record_rejected();
        metrics.record_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_processed, 2);
        assert_eq!(snapshot.documents_rejected, 1);
        assert_eq!(snapshot.documents_failed, 1);
        assert_eq!(snapshot.documents_truncated, 2);
        assert_eq!(snapshot.chunks_exhausted, 2);
        assert_eq!(snapshot.chunks_cancelled, 2);
        assert_eq!(snapshot.unresolved_relations, 4);
        assert!((snapshot.avg_extract_time_ms - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = Metrics::new().snapshot();
        assert_eq!(snapshot.avg_extract_time_ms, 0.0);
        assert_eq!(snapshot.total_requests, 0);
    }

    #[test]
    fn test_failed_requests_counted() {
        let metrics = Metrics::new();
        metrics.record_request(true);
        metrics.record_request(false);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.failed_requests, 1);
    }
}
