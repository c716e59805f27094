use serde_json::Value;

use crate::json_extract::{JsonShape, extract_json, strip_code_fence};
use crate::json_repair::repair_json;

/// The model answered, but not with JSON we could read. Carries the raw text
/// so callers can log exactly what came back.
#[derive(Debug, thiserror::Error)]
#[error("model response is not valid JSON: {source}")]
pub struct ParseError {
    pub raw: String,
    #[source]
    pub source: serde_json::Error,
}

/// Parse a model response expected to hold a JSON value of `shape`.
///
/// The loose repair runs at most once, and only when the strict parse of the
/// extracted text fails. The error reported is the one from the repaired text.
pub fn parse_model_json(raw: &str, shape: JsonShape) -> Result<Value, ParseError> {
    let candidate = extract_json(raw, shape);
    if let Ok(value) = serde_json::from_str(candidate) {
        return Ok(value);
    }

    tracing::debug!("strict JSON parse failed, attempting loose repair");
    serde_json::from_str(&repair_json(candidate)).map_err(|source| ParseError {
        raw: raw.to_string(),
        source,
    })
}

/// Strict parse of a fence-stripped response, with no bracket slicing and no
/// repair. Photo analysis answers are short flat arrays; anything else is
/// treated as unreadable.
pub fn parse_fenced_json(raw: &str) -> Result<Value, ParseError> {
    serde_json::from_str(strip_code_fence(raw)).map_err(|source| ParseError {
        raw: raw.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_json_is_not_repaired() {
        // Repair would quote these numbers; a strict parse must win first.
        let raw = "[\n  1,\n  2\n]";
        assert_eq!(parse_model_json(raw, JsonShape::Array).unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_fenced_and_broken_is_repaired() {
        let raw = "```json\n{\n  \"shopping_list\": [\n    \"卵\"\n    \"ねぎ\"\n  ]\n}\n```";
        let value = parse_model_json(raw, JsonShape::Object).unwrap();
        assert_eq!(value["shopping_list"], json!(["卵", "ねぎ"]));
    }

    #[test]
    fn test_unrepairable_keeps_raw_text() {
        let raw = "I'm sorry, I can't do that.";
        let err = parse_model_json(raw, JsonShape::Object).unwrap_err();
        assert_eq!(err.raw, raw);
        assert!(err.to_string().starts_with("model response is not valid JSON"));
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n[{\"name\": \"卵\"}]\n```";
        assert_eq!(parse_fenced_json(raw).unwrap(), json!([{ "name": "卵" }]));
        assert!(parse_fenced_json("here: [1]").is_err());
    }
}
