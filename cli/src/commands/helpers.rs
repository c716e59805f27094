use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::process;

use kondate_core::store::RowStore;

/// Resolve an account email to a user id. Unknown accounts exit with status 2.
pub(crate) fn resolve_user(store: &dyn RowStore, email: &str, json: bool) -> Result<String> {
    let email = email.trim().to_lowercase();
    if let Some(credentials) = store.find_user_by_email(&email)? {
        return Ok(credentials.user.id);
    }

    let message = format!("No account for '{email}'");
    if json {
        println!("{}", json_error(&message));
    } else {
        eprintln!("{message}");
    }
    process::exit(2);
}

/// Dish names of a suggestion, joined for a table cell.
pub(crate) fn dish_names(recipe: &Value) -> String {
    let mut names = Vec::new();
    if let Some(dishes) = recipe.get("dishes").and_then(Value::as_object) {
        for value in dishes.values() {
            match value {
                Value::String(s) if !s.trim().is_empty() => names.push(s.trim().to_string()),
                Value::Array(items) => names.extend(
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .filter(|s| !s.trim().is_empty())
                        .map(|s| s.trim().to_string()),
                ),
                _ => {}
            }
        }
    }
    names.join(" / ")
}

pub(crate) fn text_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world this is long", 10), "hello w...");
        assert_eq!(truncate("鶏むね肉のみぞれ煮と小松菜のおひたし", 8), "鶏むね肉の...");
    }

    #[test]
    fn test_dish_names_full_meal() {
        let recipe = json!({
            "dishes": { "main": "肉じゃが", "side": "", "soup": "味噌汁" }
        });
        assert_eq!(dish_names(&recipe), "肉じゃが / 味噌汁");
    }

    #[test]
    fn test_dish_names_bento() {
        let recipe = json!({ "dishes": { "items": ["唐揚げ", "卵焼き", 3] } });
        assert_eq!(dish_names(&recipe), "唐揚げ / 卵焼き");
        assert_eq!(dish_names(&json!({})), "");
    }

    #[test]
    fn test_text_field() {
        let v = json!({ "menu_name": "親子丼", "n": 1 });
        assert_eq!(text_field(&v, "menu_name"), "親子丼");
        assert_eq!(text_field(&v, "n"), "");
    }

    #[test]
    fn test_json_error() {
        assert_eq!(json_error("boom"), r#"{"error":"boom"}"#);
    }
}
