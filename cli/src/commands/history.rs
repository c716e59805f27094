use anyhow::Result;
use serde_json::Value;
use tabled::{
    Table, Tabled,
    settings::{Modify, Style, Width, object::Columns},
};

use kondate_core::store::RowStore;

use super::helpers::{dish_names, resolve_user, text_field, truncate};

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "When")]
    created_at: String,
    #[tabled(rename = "Request")]
    request: String,
    #[tabled(rename = "Suggestions")]
    menus: String,
}

fn menu_summary(response: &Value) -> String {
    response
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|s| {
                    let name = text_field(s, "menu_name");
                    if name.is_empty() { dish_names(s) } else { name }
                })
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

pub(crate) fn cmd_history(
    store: &dyn RowStore,
    email: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let user_id = resolve_user(store, email, json)?;
    let rows = store.list_history(&user_id, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No suggestion history yet.");
        return Ok(());
    }

    let table_rows: Vec<HistoryRow> = rows
        .iter()
        .map(|h| HistoryRow {
            id: h.id,
            created_at: h.created_at.chars().take(16).collect::<String>().replace('T', " "),
            request: truncate(&h.user_request, 30),
            menus: menu_summary(&h.ai_response),
        })
        .collect();

    let table = Table::new(&table_rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(3)).with(Width::wrap(50)))
        .to_string();
    println!("{table}");

    Ok(())
}
