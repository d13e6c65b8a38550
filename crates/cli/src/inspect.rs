//! Read-only views over a synchronized database.

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use uuid::Uuid;

use treesync_core::config::AppConfig;
use treesync_core::db::Database;

use crate::style;

fn open_database(config: &AppConfig, database: &str) -> Result<Database> {
    let path = config.database_path(database);
    if !path.exists() {
        anyhow::bail!(
            "database '{}' has not been synchronized yet ({} does not exist)",
            database,
            path.display()
        );
    }
    let db = Database::new(&path).context("failed to open database")?;
    db.initialize().context("failed to migrate database")?;
    Ok(db)
}

/// `treesync show <id>`
pub fn show_item(config: &AppConfig, database: &str, id: &str) -> Result<()> {
    let id = Uuid::parse_str(id).with_context(|| format!("'{}' is not a valid item ID", id))?;
    let db = open_database(config, database)?;

    let item = match db.get_item(id).context("failed to read item")? {
        Some(item) => item,
        None => anyhow::bail!("item {} not found in database '{}'", id, database),
    };
    let path = db.item_path(id).context("failed to resolve item path")?;

    println!();
    println!("{}", style::header(&item.name));
    println!("  ID        : {}", item.id);
    println!("  Path      : {}", path.as_deref().unwrap_or("(detached)"));
    println!("  Template  : {}", item.template_id);
    println!("  Branch    : {}", item.branch_id);
    println!("  Parent    : {}", item.parent_id);
    println!("  Created   : {}", item.created_at);
    println!("  Updated   : {}", item.updated_at);

    let children = db.children(id).context("failed to list children")?;
    if !children.is_empty() {
        println!("  Children  : {}", children.len());
    }

    let fields = db.list_fields(id).context("failed to list fields")?;
    println!();
    if fields.is_empty() {
        println!("{}", style::dim("  No stored fields."));
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Scope", "Field", "Language", "Version", "Value"]);
    for field in &fields {
        table.add_row(vec![
            Cell::new(&field.scope),
            Cell::new(field.field_id),
            Cell::new(&field.language),
            Cell::new(field.version),
            Cell::new(truncate(&field.value, 60)),
        ]);
    }
    println!("{}", table);
    Ok(())
}

/// `treesync history`
pub fn show_history(config: &AppConfig, database: &str, limit: u32) -> Result<()> {
    let db = open_database(config, database)?;
    let entries = db.list_history(limit).context("failed to read history")?;

    if entries.is_empty() {
        println!("{}", style::dim("No history entries found."));
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["#", "When", "Action", "Path", "User"]);
    for entry in &entries {
        table.add_row(vec![
            Cell::new(entry.id),
            Cell::new(&entry.created_at),
            Cell::new(style::action(entry.action.as_str())),
            Cell::new(truncate(&entry.item_path, 70)),
            Cell::new(&entry.user_name),
        ]);
    }

    println!("{}", table);
    let total = db.count_history().unwrap_or(entries.len() as i64);
    println!(
        "{}",
        style::dim(&format!("Showing {} of {} entries", entries.len(), total))
    );
    Ok(())
}

/// Truncate a string to `max_len` characters, appending "..." if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    let single_line = s.replace('\n', " ");
    if single_line.chars().count() <= max_len {
        single_line
    } else {
        let cut: String = single_line.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
