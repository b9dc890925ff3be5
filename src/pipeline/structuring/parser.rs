use std::collections::HashSet;

use serde_json::{Map, Value};

use super::types::ModelCodeSuggestions;
use super::StructuringError;

/// Parse the model's reply into code suggestions.
///
/// Tolerates Markdown fences and prose around the object. Fields that are
/// missing or not arrays read as empty.
pub fn parse_code_suggestions(response: &str) -> Result<ModelCodeSuggestions, StructuringError> {
    let json_str = extract_json_object(response)?;

    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| StructuringError::JsonParsing(e.to_string()))?;

    let Value::Object(obj) = value else {
        return Err(StructuringError::MalformedResponse(
            "Top-level JSON is not an object".to_string(),
        ));
    };

    Ok(ModelCodeSuggestions {
        icd10: string_list(&obj, "ICD-10"),
        cpt: string_list(&obj, "CPT"),
        hcpcs: string_list(&obj, "HCPCS"),
        clinical_terms: string_list(&obj, "Clinical_Terms"),
        anatomical_locations: string_list(&obj, "Anatomical_Locations"),
        diagnosis: string_list(&obj, "Diagnosis"),
        procedures: string_list(&obj, "Procedures"),
    })
}

/// Strip one leading fence (```` ```json ```` or ```` ``` ````) and one trailing
/// fence, then keep the span from the first `{` to the last `}`.
fn extract_json_object(response: &str) -> Result<&str, StructuringError> {
    let mut text = response.trim();

    if let Some(rest) = text.strip_prefix("```json") {
        text = rest.trim();
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest.trim();
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim();
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&text[start..=end]),
        _ => Err(StructuringError::MalformedResponse(
            "No JSON object found in model response".to_string(),
        )),
    }
}

/// Stringified, trimmed, non-empty items of an array field, first occurrence kept.
fn string_list(obj: &Map<String, Value>, key: &str) -> Vec<String> {
    let Some(Value::Array(items)) = obj.get(key) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(stringify)
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

fn stringify(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null | Value::Bool(false) => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Array(a) if a.is_empty() => return None,
        Value::Object(o) if o.is_empty() => return None,
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}
