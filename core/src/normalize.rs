use serde_json::{Map, Value, json};

use crate::models::{IngredientCategory, PhotoCandidate, PhotoCandidates};
use crate::pattern::Pattern;

/// Absent, null, `false`, `0` and `""` all count as "not provided".
fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => !b,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(_) => false,
    }
}

fn present(obj: &Map<String, Value>, key: &str) -> Option<Value> {
    let value = obj.get(key);
    if is_blank(value) { None } else { value.cloned() }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Normalize a batch of suggestions for `requested`. Anything other than an
/// array yields no suggestions; non-object entries are dropped.
#[must_use]
pub fn normalize_suggestions(batch: Value, requested: Pattern) -> Vec<Value> {
    let Value::Array(items) = batch else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(obj) => Some(Value::Object(normalize_suggestion(obj, requested))),
            _ => None,
        })
        .collect()
}

fn normalize_suggestion(mut recipe: Map<String, Value>, requested: Pattern) -> Map<String, Value> {
    if is_blank(recipe.get("pattern")) {
        recipe.insert("pattern".into(), json!(requested.code()));
    }
    let pattern = recipe
        .get("pattern")
        .and_then(Value::as_str)
        .and_then(Pattern::from_code)
        .unwrap_or(requested);

    let nutrition_info = present(&recipe, "nutrition_info");
    let estimated_calories = present(&recipe, "estimated_calories");

    if is_blank(recipe.get("comment")) {
        let comment = nutrition_info
            .as_ref()
            .map(|info| format!("栄養ポイント: {} ✨", as_text(info)))
            .unwrap_or_default();
        recipe.insert("comment".into(), json!(comment));
    }

    if is_blank(recipe.get("cooking_time")) {
        recipe.insert("cooking_time".into(), json!(""));
    }

    if is_blank(recipe.get("nutrients")) {
        recipe.insert(
            "nutrients".into(),
            json!({
                "summary": nutrition_info.unwrap_or_else(|| json!("")),
                "energy": estimated_calories.unwrap_or_else(|| json!("")),
                "protein": "",
                "fat": "",
                "carbohydrates": "",
                "salt_equivalent": "",
            }),
        );
    } else if let Some(Value::Object(nutrients)) = recipe.get_mut("nutrients") {
        if is_blank(nutrients.get("energy")) {
            if let Some(energy) = estimated_calories {
                nutrients.insert("energy".into(), energy);
            }
        }
        if is_blank(nutrients.get("summary")) {
            if let Some(summary) = nutrition_info {
                nutrients.insert("summary".into(), summary);
            }
        }
    }

    let dishes = recipe
        .entry("dishes")
        .or_insert_with(|| Value::Object(Map::new()));
    if !dishes.is_object() {
        *dishes = Value::Object(Map::new());
    }
    if let Value::Object(dishes) = dishes {
        (pattern.spec().normalize_dishes)(dishes);
    }

    recipe
}

/// Normalize a detail object for `pattern`. Non-object values pass through.
#[must_use]
pub fn normalize_details(details: Value, pattern: Pattern, servings: &str) -> Value {
    let Value::Object(mut obj) = details else {
        return details;
    };
    let key = pattern.spec().detail_key;

    if !obj.get("shopping_list").is_some_and(Value::is_array) {
        obj.insert("shopping_list".into(), json!([]));
    }

    for section in ["ingredients", "cooking_steps"] {
        match obj.get_mut(section) {
            Some(Value::Object(groups)) => {
                groups.entry(key).or_insert_with(|| json!([]));
            }
            _ => {
                let mut groups = Map::new();
                groups.insert(key.into(), json!([]));
                obj.insert(section.into(), Value::Object(groups));
            }
        }
    }

    if is_blank(obj.get("servings")) {
        obj.insert("servings".into(), json!(servings));
    }

    Value::Object(obj)
}

/// Turn the model's photo answer into grouped, deduplicated candidates.
///
/// Entries are keyed by normalized category and trimmed name; a later
/// duplicate replaces the earlier one but keeps its position.
#[must_use]
pub fn normalize_photo_candidates(items: &Value) -> PhotoCandidates {
    let mut unique: Vec<PhotoCandidate> = Vec::new();

    for item in items.as_array().into_iter().flatten() {
        let name = item
            .get("name")
            .filter(|v| !is_blank(Some(*v)))
            .map(as_text)
            .unwrap_or_default()
            .trim()
            .to_string();
        if name.is_empty() {
            continue;
        }
        let category = item
            .get("category")
            .filter(|v| !is_blank(Some(*v)))
            .map_or(IngredientCategory::Other, |c| {
                IngredientCategory::from_loose(&as_text(c))
            });
        let maybe = !is_blank(item.get("maybe"));

        let candidate = PhotoCandidate {
            name,
            category,
            maybe,
        };
        match unique
            .iter_mut()
            .find(|c| c.category == candidate.category && c.name == candidate.name)
        {
            Some(existing) => *existing = candidate,
            None => unique.push(candidate),
        }
    }

    let mut grouped = PhotoCandidates::default();
    for candidate in unique {
        grouped.push(candidate);
    }
    grouped
}
