use std::sync::LazyLock;

use regex::Regex;

static ADJACENT_STRINGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(\s*\n\s*)""#).expect("pattern is valid"));

static ORPHAN_QUOTE_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\n(\s*)",\s*\n"#).expect("pattern is valid"));

static QUOTE_BEFORE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""\s*(\n\s*)([^\]},\s])"#).expect("pattern is valid"));

/// Apply every repair rule in order and return the rewritten text.
///
/// Line-oriented rewrites, not a parser. Not idempotent (numeric list items
/// get quoted), so run it once and only after a strict parse has failed.
#[must_use]
pub fn repair_json(text: &str) -> String {
    let t = neutralize_control_chars(text);
    let t = quote_bare_lines(&t);
    let t = ADJACENT_STRINGS.replace_all(&t, "\",${1}\"");
    let t = ORPHAN_QUOTE_COMMA.replace_all(&t, "\n${1},\n");
    let t = QUOTE_BEFORE_LINE.replace_all(&t, "\",${1}${2}");
    t.into_owned()
}

/// Rule 1: control characters other than `\n`, `\t` and `\r` become a space.
fn neutralize_control_chars(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{00}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}' => ' ',
            other => other,
        })
        .collect()
}

/// Rule 2: a line holding a bare value (not starting with a quote, bracket,
/// brace or comma) gets the value wrapped in quotes. The value runs to the
/// first `,` or `]` on the line; a value that runs to the end of the line must
/// be followed by another line.
fn quote_bare_lines(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let last = lines.len().saturating_sub(1);

    let rewritten: Vec<String> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                return (*line).to_string();
            }
            quote_bare_line(line, i < last).unwrap_or_else(|| (*line).to_string())
        })
        .collect();
    rewritten.join("\n")
}

fn quote_bare_line(line: &str, has_next_line: bool) -> Option<String> {
    let body = line.trim_start();
    let indent = &line[..line.len() - body.len()];

    let first = body.chars().next()?;
    if matches!(first, '"' | '[' | ']' | '{' | '}' | ',') {
        return None;
    }

    let value_end = body.find([',', ']']).unwrap_or(body.len());
    let (value, rest) = body.split_at(value_end);
    if rest.is_empty() && !has_next_line {
        return None;
    }

    let value = value.trim().replace('"', "\\\"");
    Some(format!("{indent}\"{value}\"{rest}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn repaired(text: &str) -> Value {
        serde_json::from_str(&repair_json(text)).unwrap()
    }

    #[test]
    fn test_missing_comma_between_array_items() {
        assert_eq!(repaired("[\"a\"\n\"b\"]"), json!(["a", "b"]));
    }

    #[test]
    fn test_missing_comma_with_indentation() {
        let text = "{\n  \"shopping_list\": [\n    \"卵 (2個)\"\n    \"牛乳 (200ml)\"\n  ]\n}";
        assert_eq!(
            repaired(text),
            json!({ "shopping_list": ["卵 (2個)", "牛乳 (200ml)"] })
        );
    }

    #[test]
    fn test_bare_list_items_are_quoted() {
        let text = "{\n  \"shopping_list\": [\n    卵 (2個)\n    牛乳 (200ml)\n  ]\n}";
        assert_eq!(
            repaired(text),
            json!({ "shopping_list": ["卵 (2個)", "牛乳 (200ml)"] })
        );
    }

    #[test]
    fn test_bare_item_before_closing_bracket() {
        let text = "{\"items\": [\n  \"豚肉\",\n  玉ねぎ]\n}";
        assert_eq!(repaired(text), json!({ "items": ["豚肉", "玉ねぎ"] }));
    }

    #[test]
    fn test_missing_comma_between_object_members() {
        let text = "{\n  \"time\": \"5分\"\n  \"heat\": \"中火\"\n}";
        assert_eq!(repaired(text), json!({ "time": "5分", "heat": "中火" }));
    }

    #[test]
    fn test_control_characters_become_spaces() {
        let text = "[\"a\u{0007}b\"]";
        assert_eq!(repair_json(text), "[\"a b\"]");
    }

    #[test]
    fn test_newlines_and_tabs_survive() {
        let text = "{\n\t\"a\": \"b\"\n}";
        assert_eq!(repair_json(text), text);
    }

    #[test]
    fn test_orphan_quote_comma_collapses() {
        assert_eq!(repair_json("x\n  \",\n  y"), "x\n  ,\n  y");
    }

    #[test]
    fn test_embedded_quote_in_bare_value_is_escaped() {
        let text = "[\n  しょうゆ \"濃口\"\n]";
        assert_eq!(repaired(text), json!(["しょうゆ \"濃口\""]));
    }

    #[test]
    fn test_hopeless_input_still_fails() {
        let out = repair_json("{{{ not json");
        assert!(serde_json::from_str::<Value>(&out).is_err());
    }
}
