use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use kondate_core::models::INGREDIENT_CATEGORIES;
use kondate_core::store::RowStore;

use super::helpers::{resolve_user, truncate};

pub(crate) fn cmd_family(store: &dyn RowStore, email: &str, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct MemberRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Age")]
        age: i64,
        #[tabled(rename = "Gender")]
        gender: String,
        #[tabled(rename = "Height")]
        height: String,
        #[tabled(rename = "Weight")]
        weight: String,
        #[tabled(rename = "Dislikes")]
        dislikes: String,
    }

    let user_id = resolve_user(store, email, json)?;
    let members = store.list_family(&user_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&members)?);
        return Ok(());
    }

    if members.is_empty() {
        println!("No family members registered.");
        return Ok(());
    }

    let rows: Vec<MemberRow> = members
        .iter()
        .map(|m| MemberRow {
            id: m.id,
            name: truncate(&m.name, 20),
            age: m.age,
            gender: m.gender.clone(),
            height: format!("{:.1} cm", m.height),
            weight: format!("{:.1} kg", m.weight),
            dislikes: truncate(&m.dislikes, 30),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .with(Modify::new(Columns::new(4..6)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_ingredients(store: &dyn RowStore, email: &str, json: bool) -> Result<()> {
    let user_id = resolve_user(store, email, json)?;
    let ingredients = store.list_ingredients(&user_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ingredients)?);
        return Ok(());
    }

    if ingredients.is_empty() {
        println!("No ingredients on hand.");
        return Ok(());
    }

    for category in INGREDIENT_CATEGORIES {
        let names: Vec<&str> = ingredients
            .iter()
            .filter(|i| i.category == category)
            .map(|i| i.name.as_str())
            .collect();
        if names.is_empty() {
            continue;
        }
        println!("  {category} ({})", names.len());
        println!("    {}", names.join("、"));
    }

    Ok(())
}
