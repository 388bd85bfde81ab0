use crate::schema::{EntityType, RelationType};

pub fn build_extraction_prompt(chunk_text: &str) -> String {
    format!(
        r#"You are a financial Summarization and Knowledge Extraction System. Summarize the text below and extract entities and relations from it, formatted exactly according to the JSON structure given. Only output the JSON structure, nothing else.

ENTITY TYPES:
{entity_types}

RELATION TYPES:
{relation_types}

SUMMARY:
- Cover the main content of the whole text.
- Include the company's name and its bankruptcy level.
- Include the reason for any bankruptcy risk and its impact on the company.
- Include the company's financial status and future prospects.

BANKRUPTCY LEVEL (-1 to 1):
- Conclude it from the sentiment of the company's financial status and future prospects.
- A healthy company that will not go bankrupt is -1.
- A company in a critical situation is between 0 and 0.4.
- A company that will go bankrupt is between 0.4 and 1.

RULES:
1. Use full company names consistently.
2. Do not repeat content.
3. Normalize company names (if "Apple Inc." and "Apple Corporation" are the same company, use one name).
4. Use only the entity and relation types listed above.
5. Every relation source and target must first be listed as an entity.
6. Focus relations on the impact of events on the company.
7. Impact level is between 0 (no impact) and 1 (highest impact) for positive and negative impacts.
8. Fill in relation properties from information in the text.

{format}

TEXT:
{chunk_text}

JSON OUTPUT:"#,
        entity_types = render_entity_types(),
        relation_types = render_relation_types(),
        format = FORMAT_INSTRUCTIONS,
        chunk_text = chunk_text,
    )
}

/// Re-prompt after an unparseable answer. Restates the format and quotes
/// what was wrong with the previous attempt.
pub fn build_retry_prompt(chunk_text: &str, validation_error: &str) -> String {
    format!(
        r#"Your previous answer could not be used: {validation_error}

Answer again. Output a single raw JSON object, no markdown formatting, no code blocks, no explanations. All four top-level fields are required and every relation must reference entities you listed.

{extraction}"#,
        validation_error = validation_error,
        extraction = build_extraction_prompt(chunk_text),
    )
}

const FORMAT_INSTRUCTIONS: &str = r#"OUTPUT FORMAT (a single JSON object, no markdown):
{
  "summary": "string",
  "bankruptcy_level": {"level": -1.0},
  "entities": [
    {"entity": "Entity name", "type": "COMPANY|EVENT|PRODUCT"}
  ],
  "relations": [
    {"source": "Entity name", "target": "Entity name", "relation": "RELATION_TYPE", "property_name": "value"}
  ]
}
List entities before relations."#;

fn render_entity_types() -> String {
    EntityType::ALL
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{}. {}", i + 1, t.as_str()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_relation_types() -> String {
    RelationType::ALL
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let properties = r
                .properties()
                .iter()
                .map(|(name, range)| format!("{} ({})", name, range))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "{}. {} ({})\n   - Properties: {}",
                i + 1,
                r.as_str(),
                r.direction(),
                properties
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
