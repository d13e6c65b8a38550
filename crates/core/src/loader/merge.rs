//! Set-based diff of the staged tables against the store.
//!
//! Everything here runs on the caller's write transaction. Load action codes
//! in the SQL are those of [`LoadAction::code`](crate::item::LoadAction::code):
//! 0 revert tree, 1 revert, 2 add item only, 3 add only.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::debug;

use crate::db::uuid_column;
use crate::errors::DatabaseError;
use crate::item::{ChangeKind, ItemChange};

const CLASSIFY: &str = "UPDATE staged_items
     SET item_exists = EXISTS (SELECT 1 FROM items i WHERE i.id = staged_items.id),
         original_parent_id = (SELECT i.parent_id FROM items i WHERE i.id = staged_items.id)";

const SKIP_EXISTING_ADDS: &str =
    "UPDATE staged_items SET skip = 1 WHERE item_exists = 1 AND load_action IN (2, 3)";

const MARK_NEW: &str = "UPDATE staged_items SET changed = 1 WHERE skip = 0 AND item_exists = 0";

/// An existing reverted item is changed when its header differs, an
/// ungated staged field is missing or different (blob payloads included),
/// or a stored field has no staged counterpart.
const MARK_UPDATED: &str = "UPDATE staged_items SET changed = 1
     WHERE skip = 0 AND item_exists = 1 AND (
         ?1 = 1
         OR EXISTS (
             SELECT 1 FROM items i WHERE i.id = staged_items.id
               AND (i.name <> staged_items.name OR i.template_id <> staged_items.template_id
                    OR i.branch_id <> staged_items.branch_id OR i.parent_id <> staged_items.parent_id))
         OR EXISTS (
             SELECT 1 FROM staged_fields s
             WHERE s.item_id = staged_items.id AND s.on_create = 0 AND s.on_update = 0
               AND NOT EXISTS (
                   SELECT 1 FROM fields f
                   WHERE f.item_id = s.item_id AND f.scope = s.scope AND f.field_id = s.field_id
                     AND f.language = s.language AND f.version = s.version AND f.value = s.value))
         OR EXISTS (
             SELECT 1 FROM staged_fields s JOIN staged_blobs b ON b.field_row = s.row_id
             WHERE s.item_id = staged_items.id AND s.on_create = 0 AND s.on_update = 0
               AND NOT EXISTS (SELECT 1 FROM blobs x WHERE x.blob_id = s.value AND x.data = b.data))
         OR EXISTS (
             SELECT 1 FROM fields f
             WHERE f.item_id = staged_items.id
               AND NOT EXISTS (
                   SELECT 1 FROM staged_fields s
                   WHERE s.item_id = f.item_id AND s.scope = f.scope AND s.field_id = f.field_id
                     AND s.language = f.language AND s.version = f.version)))";

/// Target-only descendants of every revert-tree item, with their paths
/// rebuilt from the staged ancestor.
const FIND_DOOMED: &str = "WITH RECURSIVE doomed(id, parent_id, path, depth) AS (
         SELECT i.id, i.parent_id, s.path || '/' || i.name, s.depth + 1
         FROM items i JOIN staged_items s ON i.parent_id = s.id
         WHERE s.load_action = 0
           AND NOT EXISTS (SELECT 1 FROM staged_items x WHERE x.id = i.id)
         UNION ALL
         SELECT i.id, i.parent_id, d.path || '/' || i.name, d.depth + 1
         FROM items i JOIN doomed d ON i.parent_id = d.id
         WHERE NOT EXISTS (SELECT 1 FROM staged_items x WHERE x.id = i.id)
     )
     INSERT OR IGNORE INTO doomed_items (id, parent_id, path, depth)
     SELECT id, parent_id, path, depth FROM doomed";

/// Gates: a created item takes ungated and create-gated fields, an updated
/// item takes ungated and update-gated fields.
const MARK_APPLY: &str = "UPDATE staged_fields SET apply = 1
     WHERE item_id IN (SELECT id FROM staged_items WHERE changed = 1 AND load_action <> 2)
       AND (
           (on_create = 0 AND on_update = 0)
           OR (on_create = 1 AND item_id IN (SELECT id FROM staged_items WHERE item_exists = 0))
           OR (on_update = 1 AND item_id IN (SELECT id FROM staged_items WHERE item_exists = 1))
       )";

const COLLECT_CHANGES: &str = "SELECT id, parent_id, COALESCE(original_parent_id, parent_id), path, depth, item_exists
     FROM staged_items WHERE changed = 1
     UNION ALL
     SELECT id, parent_id, parent_id, path, depth, 2 FROM doomed_items
     ORDER BY 5, 4";

const DELETE_DOOMED_FIELDS: &str =
    "DELETE FROM fields WHERE item_id IN (SELECT id FROM doomed_items)";

const DELETE_DOOMED_ITEMS: &str = "DELETE FROM items WHERE id IN (SELECT id FROM doomed_items)";

const INSERT_ITEMS: &str = "INSERT INTO items (id, name, template_id, branch_id, parent_id, created_at, updated_at)
     SELECT id, name, template_id, branch_id, parent_id, ?1, ?1
     FROM staged_items WHERE changed = 1 AND item_exists = 0";

const UPDATE_ITEMS: &str = "UPDATE items
     SET name = s.name, template_id = s.template_id, branch_id = s.branch_id,
         parent_id = s.parent_id, updated_at = ?1
     FROM staged_items s
     WHERE s.id = items.id AND s.changed = 1 AND s.item_exists = 1";

const REMOVE_UNSTAGED_FIELDS: &str = "DELETE FROM fields
     WHERE item_id IN (
             SELECT id FROM staged_items
             WHERE changed = 1 AND item_exists = 1 AND load_action IN (0, 1))
       AND NOT EXISTS (
             SELECT 1 FROM staged_fields s
             WHERE s.item_id = fields.item_id AND s.scope = fields.scope
               AND s.field_id = fields.field_id AND s.language = fields.language
               AND s.version = fields.version)";

const WRITE_FIELDS: &str = "INSERT INTO fields (item_id, scope, field_id, language, version, value, updated_at)
     SELECT item_id, scope, field_id, language, version, value, ?1
     FROM staged_fields WHERE apply = 1
     ON CONFLICT (item_id, scope, field_id, language, version)
     DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at";

const WRITE_BLOBS: &str = "INSERT INTO blobs (blob_id, data, created_at)
     SELECT s.value, b.data, ?1
     FROM staged_blobs b JOIN staged_fields s ON s.row_id = b.field_row
     WHERE s.apply = 1 AND s.value <> ''
     ON CONFLICT (blob_id) DO UPDATE SET data = excluded.data";

/// Counters reported by the diff.
#[derive(Debug, Default, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct MergeStats {
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    /// Existing items left alone by an add-only action.
    pub skipped: u64,
    pub field_writes: u64,
    pub fields_removed: u64,
    pub blob_writes: u64,
}

pub(crate) struct MergeOutcome {
    pub stats: MergeStats,
    pub changes: Vec<ItemChange>,
}

/// Diff the staged set against the store and write the result.
///
/// Returns the change set ordered by path depth, then path.
pub(crate) fn merge(conn: &Connection, force_update: bool) -> Result<MergeOutcome, DatabaseError> {
    let mut stats = MergeStats::default();

    conn.execute(CLASSIFY, [])?;
    stats.skipped = conn.execute(SKIP_EXISTING_ADDS, [])? as u64;
    conn.execute(MARK_NEW, [])?;
    conn.execute(MARK_UPDATED, params![force_update])?;
    conn.execute(FIND_DOOMED, [])?;
    conn.execute(MARK_APPLY, [])?;

    let changes = collect_changes(conn)?;
    for change in &changes {
        match change.kind {
            ChangeKind::Created => stats.created += 1,
            ChangeKind::Updated => stats.updated += 1,
            ChangeKind::Deleted => stats.deleted += 1,
        }
    }
    debug!(
        created = stats.created,
        updated = stats.updated,
        deleted = stats.deleted,
        skipped = stats.skipped,
        "diff classified"
    );

    let now = Utc::now().to_rfc3339();
    conn.execute(DELETE_DOOMED_FIELDS, [])?;
    conn.execute(DELETE_DOOMED_ITEMS, [])?;
    conn.execute(INSERT_ITEMS, params![now])?;
    conn.execute(UPDATE_ITEMS, params![now])?;
    stats.fields_removed = conn.execute(REMOVE_UNSTAGED_FIELDS, [])? as u64;
    stats.field_writes = conn.execute(WRITE_FIELDS, params![now])? as u64;
    stats.blob_writes = conn.execute(WRITE_BLOBS, params![now])? as u64;

    Ok(MergeOutcome { stats, changes })
}

fn collect_changes(conn: &Connection) -> Result<Vec<ItemChange>, DatabaseError> {
    let mut stmt = conn.prepare(COLLECT_CHANGES)?;
    let rows = stmt.query_map([], |row| {
        let code: i64 = row.get(5)?;
        let kind = match code {
            0 => ChangeKind::Created,
            1 => ChangeKind::Updated,
            _ => ChangeKind::Deleted,
        };
        Ok(ItemChange {
            item_id: uuid_column(row, 0)?,
            parent_id: uuid_column(row, 1)?,
            original_parent_id: uuid_column(row, 2)?,
            item_path: row.get(3)?,
            path_depth: row.get(4)?,
            kind,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
