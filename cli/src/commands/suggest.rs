use std::sync::Mutex;

use anyhow::{Result, bail};
use serde_json::Value;
use tabled::{
    Table, Tabled,
    settings::{Modify, Style, Width, object::Columns},
};

use kondate_core::pattern::Pattern;
use kondate_core::service::RecipePlanner;
use kondate_core::store::{RowStore, lock};

use super::helpers::{dish_names, resolve_user, text_field, truncate};

#[derive(Tabled)]
struct SuggestionRow {
    #[tabled(rename = "#")]
    idx: usize,
    #[tabled(rename = "Menu")]
    menu: String,
    #[tabled(rename = "Dishes")]
    dishes: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Energy")]
    energy: String,
}

fn parse_pattern(code: Option<&str>) -> Result<Pattern> {
    let Some(code) = code else {
        return Ok(Pattern::default());
    };
    match Pattern::from_code(code) {
        Some(p) => Ok(p),
        None => {
            let known: Vec<&str> = Pattern::ALL.iter().map(|p| p.code()).collect();
            bail!("Unknown pattern '{code}'. Use one of: {}", known.join(", "))
        }
    }
}

fn print_suggestions(suggestions: &[Value]) {
    let rows: Vec<SuggestionRow> = suggestions
        .iter()
        .enumerate()
        .map(|(i, s)| SuggestionRow {
            idx: i + 1,
            menu: truncate(&text_field(s, "menu_name"), 24),
            dishes: dish_names(s),
            time: text_field(s, "cooking_time"),
            energy: s
                .get("nutrients")
                .map(|n| text_field(n, "energy"))
                .unwrap_or_default(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(2)).with(Width::wrap(40)))
        .to_string();
    println!("{table}");

    for (i, s) in suggestions.iter().enumerate() {
        let comment = text_field(s, "comment");
        if !comment.is_empty() {
            println!("  {}. {comment}", i + 1);
        }
    }
}

pub(crate) async fn cmd_suggest(
    store: &Mutex<dyn RowStore>,
    planner: &RecipePlanner,
    email: &str,
    pattern: Option<&str>,
    request: Option<&str>,
    json: bool,
) -> Result<()> {
    let pattern = parse_pattern(pattern)?;
    let user_id = resolve_user(&*lock(store), email, json)?;

    let suggestions = planner
        .suggest_for_user(store, &user_id, request.unwrap_or_default(), pattern)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&suggestions)?);
    } else if suggestions.is_empty() {
        eprintln!("The model returned no suggestions");
    } else {
        println!("=== {} ===\n", pattern.spec().title);
        print_suggestions(&suggestions);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pattern() {
        assert_eq!(parse_pattern(None).unwrap(), Pattern::FullMeal);
        assert_eq!(parse_pattern(Some("bento")).unwrap(), Pattern::Bento);
        let err = parse_pattern(Some("buffet")).unwrap_err().to_string();
        assert!(err.contains("one_plate"));
    }
}
