use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::LevelPolicy;
use crate::normalizer::{CanonicalId, EntityNormalizer, NormalizationIndex};
use crate::retry::ChunkOutcome;
use crate::schema::{
    ChunkReport, ChunkStatus, ConsolidatedLevel, ConsolidatedResult, Relation, RunMetadata,
    RunStatus, mention_key,
};

/// Identity of a run, filled in by the caller when merging is done.
#[derive(Debug, Clone)]
pub struct RunHeader {
    pub run_id: Uuid,
    pub source_id: String,
    pub doc_id: String,
    pub model: String,
    pub total_tokens: usize,
    pub elapsed_ms: u64,
}

/// Folds chunk outcomes, in chunk order, into one consolidated result.
///
/// The merger owns the run's [`NormalizationIndex`]; nothing else writes it.
#[derive(Debug)]
pub struct ResultMerger {
    normalizer: EntityNormalizer,
    index: NormalizationIndex,
    level_policy: LevelPolicy,
    summaries: Vec<String>,
    level: Option<f64>,
    relations: Vec<Relation>,
    reports: Vec<ChunkReport>,
    unresolved_relations: usize,
}

impl ResultMerger {
    pub fn new(normalizer: EntityNormalizer, level_policy: LevelPolicy) -> Self {
        Self {
            normalizer,
            index: NormalizationIndex::new(),
            level_policy,
            summaries: Vec::new(),
            level: None,
            relations: Vec::new(),
            reports: Vec::new(),
            unresolved_relations: 0,
        }
    }

    pub fn merged_chunks(&self) -> usize {
        self.reports.len()
    }

    pub fn push(&mut self, outcome: ChunkOutcome) {
        let chunk_index = outcome.chunk.index;
        let mut dropped = outcome.dropped_relations.len();

        if outcome.is_fallback() {
            debug!(chunk_index, "Skipping fallback result");
            self.reports.push(ChunkReport {
                index: chunk_index,
                chunk_id: outcome.chunk.chunk_id,
                status: outcome.status,
                attempts: outcome.attempts,
                dropped_relations: 0,
                error: outcome.error,
            });
            return;
        }

        let result = outcome.result;

        let summary = result.summary.trim();
        if !summary.is_empty() {
            self.summaries.push(summary.to_string());
        }

        let level = result.bankruptcy_level.level;
        self.level = match (self.level_policy, self.level) {
            (LevelPolicy::MaxMagnitude, Some(current)) if current.abs() >= level.abs() => {
                Some(current)
            }
            _ => Some(level),
        };

        // Names as this chunk wrote them -> canonical identity
        let mut local: HashMap<String, CanonicalId> = HashMap::new();
        for entity in &result.entities {
            let resolution = self
                .normalizer
                .resolve(&mut self.index, &entity.name, entity.entity_type);
            local
                .entry(mention_key(&entity.name))
                .or_insert(resolution.id);
        }

        for relation in result.relations {
            let source = local.get(&mention_key(&relation.source)).copied();
            let target = local.get(&mention_key(&relation.target)).copied();

            let (Some(source), Some(target)) = (source, target) else {
                warn!(
                    chunk_index,
                    source = %relation.source,
                    target = %relation.target,
                    relation = %relation.relation,
                    "Dropping relation with unresolved endpoint"
                );
                dropped += 1;
                continue;
            };

            let canonical = Relation {
                source: self.display_name(source, &relation.source),
                target: self.display_name(target, &relation.target),
                relation: relation.relation,
                properties: relation.properties,
            };
            if !self.relations.contains(&canonical) {
                self.relations.push(canonical);
            }
        }

        self.unresolved_relations += dropped;
        self.reports.push(ChunkReport {
            index: chunk_index,
            chunk_id: outcome.chunk.chunk_id,
            status: ChunkStatus::Succeeded,
            attempts: outcome.attempts,
            dropped_relations: dropped,
            error: None,
        });
    }

    /// Record a chunk that never reached the merger.
    pub fn cancel(&mut self, index: usize, chunk_id: String) {
        self.reports.push(ChunkReport {
            index,
            chunk_id,
            status: ChunkStatus::Cancelled,
            attempts: 0,
            dropped_relations: 0,
            error: Some("run deadline reached".to_string()),
        });
    }

    pub fn finish(mut self, header: RunHeader, truncated: bool) -> ConsolidatedResult {
        self.reports.sort_by_key(|report| report.index);

        let status = if truncated {
            RunStatus::Truncated
        } else if self
            .reports
            .iter()
            .any(|report| report.status != ChunkStatus::Succeeded)
        {
            RunStatus::Degraded
        } else {
            RunStatus::Complete
        };

        let bankruptcy_level = match self.level {
            Some(level) => ConsolidatedLevel::determined(level),
            None => ConsolidatedLevel::indeterminate(),
        };

        ConsolidatedResult {
            summary: self.summaries.join("\n\n"),
            bankruptcy_level,
            entities: self.index.into_entities(),
            relations: self.relations,
            metadata: RunMetadata {
                run_id: header.run_id,
                source_id: header.source_id,
                doc_id: header.doc_id,
                model: header.model,
                status,
                total_tokens: header.total_tokens,
                chunks: self.reports,
                unresolved_relations: self.unresolved_relations,
                elapsed_ms: header.elapsed_ms,
            },
        }
    }

    fn display_name(&self, id: CanonicalId, raw: &str) -> String {
        self.index
            .get(id)
            .map(|entity| entity.name.clone())
            .unwrap_or_else(|| raw.trim().to_string())
    }
}
