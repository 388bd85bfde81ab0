use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::normalizer::CanonicalEntity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Company,
    Event,
    Product,
}

impl EntityType {
    pub const ALL: [EntityType; 3] = [EntityType::Company, EntityType::Event, EntityType::Product];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Company => "COMPANY",
            EntityType::Event => "EVENT",
            EntityType::Product => "PRODUCT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationType {
    ParticipatesIn,
    Produces,
    Mentions,
    Owns,
    CompetesWith,
    HadNegativeImpactOn,
    HadPositiveImpactOn,
}

impl RelationType {
    pub const ALL: [RelationType; 7] = [
        RelationType::ParticipatesIn,
        RelationType::Produces,
        RelationType::Mentions,
        RelationType::Owns,
        RelationType::CompetesWith,
        RelationType::HadNegativeImpactOn,
        RelationType::HadPositiveImpactOn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::ParticipatesIn => "PARTICIPATES_IN",
            RelationType::Produces => "PRODUCES",
            RelationType::Mentions => "MENTIONS",
            RelationType::Owns => "OWNS",
            RelationType::CompetesWith => "COMPETES_WITH",
            RelationType::HadNegativeImpactOn => "HAD_NEGATIVE_IMPACT_ON",
            RelationType::HadPositiveImpactOn => "HAD_POSITIVE_IMPACT_ON",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Source and target entity types, as shown to the model
    pub fn direction(&self) -> &'static str {
        match self {
            RelationType::ParticipatesIn => "COMPANY -> EVENT",
            RelationType::Produces => "COMPANY -> PRODUCT",
            RelationType::Mentions => "EVENT -> COMPANY/PRODUCT",
            RelationType::Owns | RelationType::CompetesWith => "COMPANY -> COMPANY",
            RelationType::HadNegativeImpactOn | RelationType::HadPositiveImpactOn => {
                "EVENT -> COMPANY"
            }
        }
    }

    /// Required properties with their allowed values or ranges
    pub fn properties(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            RelationType::ParticipatesIn => &[
                ("role", "Organizer | Participant | Sponsor"),
                ("effect", "-1 to 1"),
            ],
            RelationType::Produces => &[
                ("production_volume", "number or text"),
                ("production_start_date", "date"),
            ],
            RelationType::Mentions => &[
                ("sentiment", "-1 to 1"),
                ("mention_count", "integer"),
            ],
            RelationType::Owns => &[
                ("ownership_percentage", "0 to 100"),
                ("acquisition_date", "date"),
            ],
            RelationType::CompetesWith => &[("market_overlap_percentage", "0 to 100")],
            RelationType::HadNegativeImpactOn | RelationType::HadPositiveImpactOn => &[
                ("impact_level", "0 to 1"),
                ("impact_type", "Financial | Reputation | Legal"),
                ("reason", "text"),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "entity")]
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub source: String,
    pub target: String,
    pub relation: String,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BankruptcyLevel {
    pub level: f64,
}

impl BankruptcyLevel {
    pub fn clamped(level: f64) -> Self {
        Self {
            level: clamp_level(level),
        }
    }
}

/// Clamp a model-reported level into [-1, 1]. NaN counts as neutral.
pub fn clamp_level(level: f64) -> f64 {
    if level.is_nan() {
        0.0
    } else {
        level.clamp(-1.0, 1.0)
    }
}

/// Key used to match relation endpoints against entity names within one response
pub fn mention_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// One chunk's validated model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub summary: String,
    pub bankruptcy_level: BankruptcyLevel,
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
}

impl ExtractionResult {
    /// Neutral result handed back when a chunk exhausted its attempts.
    pub fn fallback() -> Self {
        Self {
            summary: String::new(),
            bankruptcy_level: BankruptcyLevel { level: 0.0 },
            entities: Vec::new(),
            relations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Succeeded,
    Exhausted,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkReport {
    pub index: usize,
    pub chunk_id: String,
    pub status: ChunkStatus,
    pub attempts: u32,
    pub dropped_relations: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every chunk produced a model result
    Complete,
    /// At least one chunk fell back after exhausting its attempts
    Degraded,
    /// The run deadline cancelled outstanding chunks
    Truncated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelStatus {
    Determined,
    Indeterminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    AtRisk,
    Critical,
    NotAtRisk,
    Unknown,
}

impl RiskBand {
    pub fn classify(level: Option<f64>) -> Self {
        match level {
            None => RiskBand::Unknown,
            Some(l) if l > 0.4 => RiskBand::AtRisk,
            Some(l) if l > 0.0 => RiskBand::Critical,
            Some(_) => RiskBand::NotAtRisk,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedLevel {
    pub level: Option<f64>,
    pub status: LevelStatus,
    pub band: RiskBand,
}

impl ConsolidatedLevel {
    pub fn determined(level: f64) -> Self {
        let level = clamp_level(level);
        Self {
            level: Some(level),
            status: LevelStatus::Determined,
            band: RiskBand::classify(Some(level)),
        }
    }

    pub fn indeterminate() -> Self {
        Self {
            level: None,
            status: LevelStatus::Indeterminate,
            band: RiskBand::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub source_id: String,
    pub doc_id: String,
    pub model: String,
    pub status: RunStatus,
    pub total_tokens: usize,
    pub chunks: Vec<ChunkReport>,
    pub unresolved_relations: usize,
    pub elapsed_ms: u64,
}

/// Merged output of one document run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedResult {
    pub summary: String,
    pub bankruptcy_level: ConsolidatedLevel,
    pub entities: Vec<CanonicalEntity>,
    pub relations: Vec<Relation>,
    pub metadata: RunMetadata,
}

impl ConsolidatedResult {
    pub fn is_truncated(&self) -> bool {
        self.metadata.status == RunStatus::Truncated
    }
}
