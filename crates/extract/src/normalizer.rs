use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::debug;

use crate::schema::EntityType;
use crate::similarity;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.95;

/// Legal-form words that do not distinguish one company from another.
pub const CORPORATE_SUFFIXES: &[&str] = &[
    "limited",
    "ltd",
    "llc",
    "inc",
    "incorporated",
    "corporation",
    "corp",
    "enterprise",
    "enterprises",
    "company",
    "co",
    "group",
    "holdings",
    "plc",
    "ag",
    "sa",
    "nv",
    "private",
    "pvt",
];

// Keeps word characters, whitespace, '&', '0' and '-'.
static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s&0-]").expect("static pattern"));

/// Normalized key for an entity name: lowercase, whitespace collapsed,
/// punctuation stripped, corporate suffixes removed. Falls back to the
/// unsuffixed form when the suffixes were all there was.
pub fn normalize_name(name: &str) -> String {
    let collapsed = name
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let stripped = DISALLOWED.replace_all(&collapsed, "");

    let kept: Vec<&str> = stripped
        .split_whitespace()
        .filter(|word| !CORPORATE_SUFFIXES.contains(word))
        .collect();

    if !kept.is_empty() {
        return kept.join(" ");
    }

    let stripped = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if stripped.is_empty() {
        // punctuation-only names keep their punctuation rather than becoming ""
        collapsed
    } else {
        stripped
    }
}

/// Position of a canonical entity in its run's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalId(pub usize);

/// The single identity a set of alias mentions resolves to within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEntity {
    #[serde(rename = "entity")]
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub key: String,
    pub aliases: BTreeSet<String>,
}

/// Normalized key -> canonical entity, in registration order. One per run.
#[derive(Debug, Default, Clone)]
pub struct NormalizationIndex {
    entries: IndexMap<String, CanonicalEntity>,
}

impl NormalizationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: CanonicalId) -> Option<&CanonicalEntity> {
        self.entries.get_index(id.0).map(|(_, entity)| entity)
    }

    pub fn lookup(&self, key: &str) -> Option<CanonicalId> {
        self.entries.get_index_of(key).map(CanonicalId)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CanonicalEntity> {
        self.entries.values()
    }

    pub fn into_entities(self) -> Vec<CanonicalEntity> {
        self.entries.into_values().collect()
    }

    fn add_alias(&mut self, id: CanonicalId, raw_name: &str) {
        if let Some((_, entity)) = self.entries.get_index_mut(id.0) {
            entity.aliases.insert(raw_name.trim().to_string());
        }
    }

    fn register(&mut self, key: String, raw_name: &str, entity_type: EntityType) -> CanonicalId {
        let name = raw_name.trim().to_string();
        let entity = CanonicalEntity {
            name: name.clone(),
            entity_type,
            key: key.clone(),
            aliases: BTreeSet::from([name]),
        };
        let (position, _) = self.entries.insert_full(key, entity);
        CanonicalId(position)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub id: CanonicalId,
    pub created: bool,
}

/// Resolves raw entity names against a [`NormalizationIndex`].
#[derive(Debug, Clone)]
pub struct EntityNormalizer {
    threshold: f64,
}

impl Default for EntityNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl EntityNormalizer {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Find or create the canonical entity for `raw_name`.
    ///
    /// Exact key matches win; otherwise the first registered key whose
    /// similarity ratio reaches the threshold. The result depends on
    /// registration order, which callers keep deterministic.
    pub fn resolve(
        &self,
        index: &mut NormalizationIndex,
        raw_name: &str,
        entity_type: EntityType,
    ) -> Resolution {
        let key = normalize_name(raw_name);

        if let Some(id) = index.lookup(&key).or_else(|| self.find_similar(index, &key)) {
            index.add_alias(id, raw_name);
            return Resolution { id, created: false };
        }

        debug!(key = %key, name = raw_name, "Registering canonical entity");
        let id = index.register(key, raw_name, entity_type);
        Resolution { id, created: true }
    }

    fn find_similar(&self, index: &NormalizationIndex, key: &str) -> Option<CanonicalId> {
        index
            .entries
            .keys()
            .position(|existing| similarity::ratio(key, existing) >= self.threshold)
            .map(CanonicalId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_name("Apple Inc."), "apple");
        assert_eq!(normalize_name("Apple Corporation"), "apple");
        assert_eq!(normalize_name("  Goldman   Sachs Group, Inc. "), "goldman sachs");
        assert_eq!(normalize_name("AT&T"), "at&t");
        assert_eq!(normalize_name("Coca-Cola Co"), "coca-cola");
    }

    #[test]
    fn test_normalization_never_empty() {
        assert_eq!(normalize_name("Holdings Inc."), "holdings inc");
        assert_eq!(normalize_name("!!!"), "!!!");
    }

    #[test]
    fn test_alias_resolution() {
        let normalizer = EntityNormalizer::default();
        let mut index = NormalizationIndex::new();

        let first = normalizer.resolve(&mut index, "Apple Inc.", EntityType::Company);
        let second = normalizer.resolve(&mut index, "Apple Corporation", EntityType::Company);

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
        assert_eq!(index.len(), 1);

        let entity = index.get(first.id).unwrap();
        assert_eq!(entity.name, "Apple Inc.");
        assert!(entity.aliases.contains("Apple Corporation"));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let normalizer = EntityNormalizer::default();
        let mut index = NormalizationIndex::new();

        let first = normalizer.resolve(&mut index, "Lehman Brothers", EntityType::Company);
        let again = normalizer.resolve(&mut index, "Lehman Brothers", EntityType::Company);

        assert_eq!(first.id, again.id);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(first.id).unwrap().aliases.len(), 1);
    }

    #[test]
    fn test_identical_keys_merge_for_any_threshold() {
        for threshold in [0.01, 0.5, 0.95, 1.0] {
            let normalizer = EntityNormalizer::new(threshold);
            let mut index = NormalizationIndex::new();
            let a = normalizer.resolve(&mut index, "Enron Corp", EntityType::Company);
            let b = normalizer.resolve(&mut index, "ENRON", EntityType::Company);
            assert_eq!(a.id, b.id, "threshold {}", threshold);
        }
    }

    #[test]
    fn test_fuzzy_match_above_threshold() {
        let normalizer = EntityNormalizer::new(0.9);
        let mut index = NormalizationIndex::new();

        let a = normalizer.resolve(&mut index, "Berkshire Hathaway", EntityType::Company);
        let b = normalizer.resolve(&mut index, "Berkshire Hathway", EntityType::Company);
        let c = normalizer.resolve(&mut index, "Bank of America", EntityType::Company);

        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_first_registered_match_wins() {
        let normalizer = EntityNormalizer::new(0.5);
        let mut index = NormalizationIndex::new();

        let abcd = normalizer.resolve(&mut index, "abcd", EntityType::Product);
        let abce = normalizer.resolve(&mut index, "abce", EntityType::Product);
        assert_eq!(abcd.id, abce.id);

        let abcf = normalizer.resolve(&mut index, "abcf", EntityType::Product);
        assert_eq!(abcf.id, abcd.id);
        assert_eq!(index.iter().next().unwrap().key, "abcd");
    }
}
