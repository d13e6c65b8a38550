//! Typed query helpers for the content store and its ledgers.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::{uuid_column, Database};
use crate::errors::DatabaseError;
use crate::item::{ChangeKind, FieldKey};

fn change_kind_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<ChangeKind> {
    let text: String = row.get(idx)?;
    ChangeKind::from_str_val(&text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown change action '{}'", text).into(),
        )
    })
}

// ---------------------------------------------------------------------------
// Domain structs returned by queries
// ---------------------------------------------------------------------------

/// A row from the `items` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItem {
    pub id: Uuid,
    pub name: String,
    pub template_id: Uuid,
    pub branch_id: Uuid,
    pub parent_id: Uuid,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from the `fields` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredField {
    pub scope: String,
    pub field_id: Uuid,
    pub language: String,
    pub version: u32,
    pub value: String,
}

/// A row from the `history` table.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub id: i64,
    pub category: String,
    pub action: ChangeKind,
    pub item_id: String,
    pub item_path: String,
    pub user_name: String,
    pub created_at: String,
}

/// A row from the `publish_queue` table.
#[derive(Debug, Clone)]
pub struct PublishQueueEntry {
    pub id: i64,
    pub item_id: String,
    pub action: String,
    pub path_depth: u32,
    pub queued_at: String,
}

const ITEM_COLUMNS: &str =
    "id, name, template_id, branch_id, parent_id, created_at, updated_at";

fn stored_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredItem> {
    Ok(StoredItem {
        id: uuid_column(row, 0)?,
        name: row.get(1)?,
        template_id: uuid_column(row, 2)?,
        branch_id: uuid_column(row, 3)?,
        parent_id: uuid_column(row, 4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

// ---------------------------------------------------------------------------
// Query implementations
// ---------------------------------------------------------------------------

impl Database {
    // -- items --------------------------------------------------------------

    /// Get an item by ID, returning `None` when it does not exist.
    pub fn get_item(&self, id: Uuid) -> Result<Option<StoredItem>, DatabaseError> {
        let conn = self.conn();
        let item = conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
                params![id.to_string()],
                stored_item,
            )
            .optional()?;
        Ok(item)
    }

    pub fn item_exists(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM items WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Direct children of `parent_id`, ordered by name.
    pub fn children(&self, parent_id: Uuid) -> Result<Vec<StoredItem>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE parent_id = ?1 ORDER BY name, id"
        ))?;
        let items = stmt
            .query_map(params![parent_id.to_string()], stored_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Full path of an item, built by walking its ancestors.
    pub fn item_path(&self, id: Uuid) -> Result<Option<String>, DatabaseError> {
        let conn = self.conn();
        let path: Option<String> = conn
            .query_row(
                "WITH RECURSIVE ancestry(id, parent_id, path, hops) AS (
                     SELECT id, parent_id, '/' || name, 0 FROM items WHERE id = ?1
                     UNION ALL
                     SELECT i.id, i.parent_id, '/' || i.name || a.path, a.hops + 1
                     FROM items i JOIN ancestry a ON i.id = a.parent_id
                     WHERE a.hops < 256
                 )
                 SELECT path FROM ancestry ORDER BY hops DESC LIMIT 1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(path)
    }

    pub fn count_items(&self) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count)
    }

    // -- fields -------------------------------------------------------------

    /// All stored fields of an item, ordered by key.
    pub fn list_fields(&self, item_id: Uuid) -> Result<Vec<StoredField>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT scope, field_id, language, version, value FROM fields
             WHERE item_id = ?1
             ORDER BY scope, language, version, field_id",
        )?;
        let fields = stmt
            .query_map(params![item_id.to_string()], |row| {
                Ok(StoredField {
                    scope: row.get(0)?,
                    field_id: uuid_column(row, 1)?,
                    language: row.get(2)?,
                    version: row.get(3)?,
                    value: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(fields)
    }

    /// Stored value of one field, if present.
    pub fn field_value(&self, item_id: Uuid, key: &FieldKey) -> Result<Option<String>, DatabaseError> {
        let conn = self.conn();
        let value = conn
            .query_row(
                "SELECT value FROM fields
                 WHERE item_id = ?1 AND scope = ?2 AND field_id = ?3 AND language = ?4 AND version = ?5",
                params![
                    item_id.to_string(),
                    key.scope.as_str(),
                    key.field_id.to_string(),
                    key.language,
                    key.version
                ],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn count_fields(&self) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM fields", [], |row| row.get(0))?;
        Ok(count)
    }

    // -- blobs --------------------------------------------------------------

    pub fn get_blob(&self, blob_id: Uuid) -> Result<Option<Vec<u8>>, DatabaseError> {
        let conn = self.conn();
        let data = conn
            .query_row(
                "SELECT data FROM blobs WHERE blob_id = ?1",
                params![blob_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data)
    }

    // -- history ------------------------------------------------------------

    /// Return the most recent N history rows, newest first.
    pub fn list_history(&self, limit: u32) -> Result<Vec<HistoryEntry>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, category, action, item_id, item_path, user_name, created_at
             FROM history ORDER BY id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit], |row| {
                Ok(HistoryEntry {
                    id: row.get(0)?,
                    category: row.get(1)?,
                    action: change_kind_column(row, 2)?,
                    item_id: row.get(3)?,
                    item_path: row.get(4)?,
                    user_name: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn count_history(&self) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;
        Ok(count)
    }

    // -- publish queue ------------------------------------------------------

    /// Return queued items in insertion order.
    pub fn list_publish_queue(&self, limit: u32) -> Result<Vec<PublishQueueEntry>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, item_id, action, path_depth, queued_at
             FROM publish_queue ORDER BY id LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit], |row| {
                Ok(PublishQueueEntry {
                    id: row.get(0)?,
                    item_id: row.get(1)?,
                    action: row.get(2)?,
                    path_depth: row.get(3)?,
                    queued_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
