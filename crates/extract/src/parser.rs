//! Parse and validate model output into an [`ExtractionResult`].

use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::{ExtractError, Result};
use crate::schema::{
    BankruptcyLevel, Entity, EntityType, ExtractionResult, Relation, RelationType, mention_key,
};

const REQUIRED_FIELDS: [&str; 4] = ["summary", "bankruptcy_level", "entities", "relations"];

/// A validated response plus what validation threw away.
#[derive(Debug, Clone)]
pub struct Validated {
    pub result: ExtractionResult,
    pub dropped_relations: Vec<Relation>,
    pub dropped_entities: usize,
}

pub fn parse_extraction(response: &str) -> Result<Validated> {
    let json_str = extract_json_object(response)?;
    let json: Value = serde_json::from_str(json_str)?;

    let obj = json
        .as_object()
        .ok_or_else(|| schema_error("expected a JSON object"))?;

    if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !obj.contains_key(**f)) {
        return Err(schema_error(format!("missing field `{}`", missing)));
    }

    let summary = obj["summary"]
        .as_str()
        .ok_or_else(|| schema_error("`summary` must be a string"))?
        .trim()
        .to_string();

    let level = parse_level(&obj["bankruptcy_level"])?;

    let entities_json = obj["entities"]
        .as_array()
        .ok_or_else(|| schema_error("`entities` must be an array"))?;
    let relations_json = obj["relations"]
        .as_array()
        .ok_or_else(|| schema_error("`relations` must be an array"))?;

    let mut entities = Vec::with_capacity(entities_json.len());
    let mut dropped_entities = 0;
    for (idx, entity_json) in entities_json.iter().enumerate() {
        match parse_entity(entity_json) {
            Ok(entity) => entities.push(entity),
            Err(e) => {
                warn!("Skipping entity {}: {}", idx, e);
                dropped_entities += 1;
            }
        }
    }

    let declared: HashSet<String> = entities.iter().map(|e| mention_key(&e.name)).collect();

    let mut relations = Vec::with_capacity(relations_json.len());
    let mut dropped_relations = Vec::new();
    for (idx, relation_json) in relations_json.iter().enumerate() {
        let relation = match parse_relation(relation_json) {
            Ok(relation) => relation,
            Err(e) => {
                warn!("Skipping relation {}: {}", idx, e);
                continue;
            }
        };

        if declared.contains(&mention_key(&relation.source))
            && declared.contains(&mention_key(&relation.target))
        {
            relations.push(relation);
        } else {
            debug!(
                source = %relation.source,
                target = %relation.target,
                "Dropping relation with undeclared endpoint"
            );
            dropped_relations.push(relation);
        }
    }

    Ok(Validated {
        result: ExtractionResult {
            summary,
            bankruptcy_level: BankruptcyLevel::clamped(level),
            entities,
            relations,
        },
        dropped_relations,
        dropped_entities,
    })
}

/// Slice from the first `{` to the last `}`, tolerating prose or code
/// fences around the object.
pub fn extract_json_object(response: &str) -> Result<&str> {
    match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&response[start..=end]),
        _ => Err(schema_error("no JSON object in response")),
    }
}

fn schema_error(msg: impl Into<String>) -> ExtractError {
    ExtractError::SchemaValidation(msg.into())
}

/// Accepts `{"level": n}` as well as a bare level; `n` may be a number or a
/// numeric string.
fn parse_level(value: &Value) -> Result<f64> {
    let raw = match value {
        Value::Object(obj) => obj
            .get("level")
            .ok_or_else(|| schema_error("missing field `bankruptcy_level.level`"))?,
        other => other,
    };

    match raw {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| schema_error("bankruptcy level is not a finite number")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| schema_error(format!("bankruptcy level {:?} is not a number", s))),
        _ => Err(schema_error("bankruptcy level must be a number")),
    }
}

fn parse_entity(json: &Value) -> std::result::Result<Entity, String> {
    let obj = json
        .as_object()
        .ok_or_else(|| "Entity is not a JSON object".to_string())?;

    let name = obj
        .get("entity")
        .or_else(|| obj.get("name"))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "Missing or invalid 'entity'".to_string())?
        .to_string();

    let type_str = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "Missing or invalid 'type'".to_string())?;

    let entity_type =
        EntityType::parse(type_str).ok_or_else(|| format!("Unknown entity type '{}'", type_str))?;

    Ok(Entity { name, entity_type })
}

fn parse_relation(json: &Value) -> std::result::Result<Relation, String> {
    let obj = json
        .as_object()
        .ok_or_else(|| "Relation is not a JSON object".to_string())?;

    let field = |name: &str| {
        obj.get(name)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| format!("Missing or invalid '{}'", name))
    };

    let source = field("source")?;
    let target = field("target")?;
    let relation = field("relation")?;

    if RelationType::parse(&relation).is_none() {
        debug!(relation = %relation, "Relation type outside the taxonomy");
    }

    let mut properties = Map::new();
    for (key, value) in obj {
        match key.as_str() {
            "source" | "target" | "relation" => {}
            // some models nest the properties instead of inlining them
            "properties" if value.is_object() => {
                if let Value::Object(nested) = value {
                    properties.extend(nested.clone());
                }
            }
            _ => {
                properties.insert(key.clone(), value.clone());
            }
        }
    }

    Ok(Relation {
        source,
        target,
        relation,
        properties,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "summary": "Acme Corp faces a liquidity crisis.",
        "bankruptcy_level": {"level": "0.65"},
        "entities": [
            {"entity": "Acme Corp", "type": "COMPANY"},
            {"entity": "Debt default", "type": "EVENT"}
        ],
        "relations": [
            {"source": "Debt default", "target": "Acme Corp", "relation": "HAD_NEGATIVE_IMPACT_ON",
             "impact_level": 0.9, "impact_type": "Financial", "reason": "missed coupon"}
        ]
    }"#;

    #[test]
    fn test_parse_valid_json() {
        let validated = parse_extraction(VALID).unwrap();
        let result = validated.result;
        assert_eq!(result.summary, "Acme Corp faces a liquidity crisis.");
        assert_eq!(result.bankruptcy_level.level, 0.65);
        assert_eq!(result.entities.len(), 2);
        assert_eq!(result.relations.len(), 1);
        assert_eq!(result.relations[0].properties["impact_type"], "Financial");
        assert!(validated.dropped_relations.is_empty());
    }

    #[test]
    fn test_parse_json_embedded_in_prose() {
        let response = format!("Here is the extraction:\n```json\n{}\n```\nDone.", VALID);
        let validated = parse_extraction(&response).unwrap();
        assert_eq!(validated.result.entities.len(), 2);
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(matches!(
            parse_extraction("This is not JSON"),
            Err(ExtractError::SchemaValidation(_))
        ));
        // truncated mid-object
        assert!(matches!(
            parse_extraction(r#"{"summary": "x", "entities": [ }"#),
            Err(ExtractError::SchemaValidation(_))
        ));
    }

    #[test]
    fn test_missing_required_field() {
        let response = r#"{"summary": "x", "bankruptcy_level": {"level": 0}, "entities": []}"#;
        match parse_extraction(response) {
            Err(ExtractError::SchemaValidation(msg)) => assert!(msg.contains("relations")),
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_relation_with_undeclared_entity_is_dropped() {
        let response = r#"{
            "summary": "s",
            "bankruptcy_level": {"level": 0.1},
            "entities": [{"entity": "Acme", "type": "COMPANY"}],
            "relations": [
                {"source": "Acme", "target": "Globex", "relation": "COMPETES_WITH"},
                {"source": "acme ", "target": "ACME", "relation": "OWNS"}
            ]
        }"#;
        let validated = parse_extraction(response).unwrap();
        assert_eq!(validated.result.relations.len(), 1);
        assert_eq!(validated.result.relations[0].relation, "OWNS");
        assert_eq!(validated.dropped_relations.len(), 1);
        assert_eq!(validated.dropped_relations[0].target, "Globex");
    }

    #[test]
    fn test_level_is_clamped() {
        let high = r#"{"summary": "", "bankruptcy_level": {"level": 1.7}, "entities": [], "relations": []}"#;
        let low = r#"{"summary": "", "bankruptcy_level": {"level": "-5"}, "entities": [], "relations": []}"#;
        assert_eq!(parse_extraction(high).unwrap().result.bankruptcy_level.level, 1.0);
        assert_eq!(parse_extraction(low).unwrap().result.bankruptcy_level.level, -1.0);
    }

    #[test]
    fn test_non_numeric_level_is_schema_error() {
        let response = r#"{"summary": "", "bankruptcy_level": {"level": "high"}, "entities": [], "relations": []}"#;
        assert!(matches!(
            parse_extraction(response),
            Err(ExtractError::SchemaValidation(_))
        ));
    }

    #[test]
    fn test_unknown_entity_type_is_skipped() {
        let response = r#"{
            "summary": "",
            "bankruptcy_level": {"level": 0},
            "entities": [
                {"entity": "Jane Doe", "type": "PERSON"},
                {"entity": "Widget", "type": "product"}
            ],
            "relations": []
        }"#;
        let validated = parse_extraction(response).unwrap();
        assert_eq!(validated.dropped_entities, 1);
        assert_eq!(validated.result.entities[0].entity_type, EntityType::Product);
    }

    #[test]
    fn test_nested_properties_are_flattened() {
        let response = r#"{
            "summary": "",
            "bankruptcy_level": {"level": 0},
            "entities": [{"entity": "A", "type": "COMPANY"}, {"entity": "B", "type": "COMPANY"}],
            "relations": [{"source": "A", "target": "B", "relation": "OWNS",
                           "properties": {"ownership_percentage": 40}}]
        }"#;
        let relation = &parse_extraction(response).unwrap().result.relations[0];
        assert_eq!(relation.properties["ownership_percentage"], 40);
        assert!(!relation.properties.contains_key("properties"));
    }

    #[test]
    fn test_extract_json_object_bounds() {
        assert_eq!(extract_json_object("xx {\"a\": {}} yy").unwrap(), "{\"a\": {}}");
        assert!(extract_json_object("} backwards {").is_err());
    }
}
