use std::sync::LazyLock;

use regex::Regex;

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```(?:json)?\s*(.*?)```").expect("fence pattern is valid")
});

/// Expected top-level JSON shape of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonShape {
    Object,
    Array,
}

impl JsonShape {
    fn brackets(self) -> (char, char) {
        match self {
            Self::Object => ('{', '}'),
            Self::Array => ('[', ']'),
        }
    }
}

/// Return the candidate JSON substring of `raw`.
///
/// A fenced block (optionally tagged `json`, any case) wins. Otherwise the
/// text from the first opening bracket of `shape` to the last closing one,
/// inclusive.
#[must_use]
pub fn extract_json(raw: &str, shape: JsonShape) -> &str {
    if let Some(inner) = FENCE.captures(raw).and_then(|c| c.get(1)) {
        return inner.as_str().trim();
    }

    let (open, close) = shape.brackets();
    if let (Some(start), Some(end)) = (raw.find(open), raw.rfind(close)) {
        if end > start {
            return raw[start..=end].trim();
        }
    }
    raw.trim()
}

/// Fence-only variant used for photo analysis, where the model is trusted to
/// answer with a bare array when it does not fence.
#[must_use]
pub fn strip_code_fence(raw: &str) -> &str {
    FENCE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map_or(raw, |m| m.as_str())
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_json_block() {
        let raw = "Here you go:\n```json\n[{\"menu_name\": \"親子丼\"}]\n```\nEnjoy!";
        assert_eq!(
            extract_json(raw, JsonShape::Array),
            "[{\"menu_name\": \"親子丼\"}]"
        );
    }

    #[test]
    fn test_fence_tag_is_case_insensitive() {
        let raw = "```JSON\n{\"a\": 1}\n```";
        assert_eq!(extract_json(raw, JsonShape::Object), "{\"a\": 1}");
    }

    #[test]
    fn test_untagged_fence() {
        let raw = "```\n  {\"a\": 1}  \n```";
        assert_eq!(extract_json(raw, JsonShape::Object), "{\"a\": 1}");
    }

    #[test]
    fn test_object_inside_prose() {
        let raw = "Sure! {\"shopping_list\": [\"卵\"], \"x\": {\"y\": 2}} Hope that helps.";
        assert_eq!(
            extract_json(raw, JsonShape::Object),
            "{\"shopping_list\": [\"卵\"], \"x\": {\"y\": 2}}"
        );
    }

    #[test]
    fn test_array_inside_prose() {
        let raw = "Result: [1, [2, 3]] done";
        assert_eq!(extract_json(raw, JsonShape::Array), "[1, [2, 3]]");
    }

    #[test]
    fn test_no_brackets_returns_trimmed_input() {
        let raw = "  sorry, I cannot help with that  ";
        assert_eq!(
            extract_json(raw, JsonShape::Object),
            "sorry, I cannot help with that"
        );
    }

    #[test]
    fn test_closing_before_opening_returns_trimmed_input() {
        let raw = " } oops { ";
        assert_eq!(extract_json(raw, JsonShape::Object), "} oops {");
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("  [1]\n"), "[1]");
    }
}
