//! Bulk staging of the item stream into TEMP tables.
//!
//! Staging tables live in the connection's `temp` schema, so they are
//! invisible to other connections and survive until the next load on the
//! same connection. That keeps them inspectable after a stage-only run.

use rusqlite::{params, CachedStatement, Connection};
use serde::Serialize;
use uuid::Uuid;

use crate::context::LoadContext;
use crate::errors::{DatabaseError, LoadError};
use crate::item::{Field, Item};
use crate::processors::ItemStream;

/// `load_action` holds [`LoadAction::code`](crate::item::LoadAction::code).
const STAGING_DDL: &str = r#"
CREATE TEMP TABLE IF NOT EXISTS staged_items (
    row_id               INTEGER PRIMARY KEY,
    id                   TEXT    NOT NULL,
    name                 TEXT    NOT NULL,
    template_id          TEXT    NOT NULL,
    branch_id            TEXT    NOT NULL,
    parent_id            TEXT    NOT NULL,
    path                 TEXT    NOT NULL,
    depth                INTEGER NOT NULL,
    source_info          TEXT,
    load_action          INTEGER NOT NULL,
    item_exists          INTEGER NOT NULL DEFAULT 0,
    original_parent_id   TEXT,
    skip                 INTEGER NOT NULL DEFAULT 0,
    changed              INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS temp.idx_staged_items_id ON staged_items (id);

CREATE TEMP TABLE IF NOT EXISTS staged_fields (
    row_id         INTEGER PRIMARY KEY,
    item_id        TEXT    NOT NULL,
    scope          TEXT    NOT NULL,
    field_id       TEXT    NOT NULL,
    language       TEXT    NOT NULL,
    version        INTEGER NOT NULL,
    value          TEXT    NOT NULL,
    name           TEXT,
    is_blob        INTEGER NOT NULL,
    needs_blob_id  INTEGER NOT NULL DEFAULT 0,
    on_create      INTEGER NOT NULL,
    on_update      INTEGER NOT NULL,
    apply          INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS temp.idx_staged_fields_key
    ON staged_fields (item_id, scope, field_id, language, version);

CREATE TEMP TABLE IF NOT EXISTS staged_blobs (
    field_row  INTEGER PRIMARY KEY,
    data       BLOB NOT NULL
);

CREATE TEMP TABLE IF NOT EXISTS doomed_items (
    id         TEXT PRIMARY KEY,
    parent_id  TEXT    NOT NULL,
    path       TEXT    NOT NULL,
    depth      INTEGER NOT NULL
);
"#;

const CLEAR_STAGING: &str = "DELETE FROM staged_items;
     DELETE FROM staged_fields;
     DELETE FROM staged_blobs;
     DELETE FROM doomed_items;";

const INSERT_ITEM: &str = "INSERT INTO staged_items
     (id, name, template_id, branch_id, parent_id, path, depth, source_info, load_action)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

const INSERT_FIELD: &str = "INSERT INTO staged_fields
     (item_id, scope, field_id, language, version, value, name, is_blob, needs_blob_id, on_create, on_update)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

const INSERT_BLOB: &str = "INSERT INTO staged_blobs (field_row, data) VALUES (?1, ?2)";

const LOOKUP_BLOB_IDS: &str = "UPDATE staged_fields
     SET value = (
             SELECT f.value FROM fields f
             WHERE f.item_id = staged_fields.item_id AND f.scope = staged_fields.scope
               AND f.field_id = staged_fields.field_id AND f.language = staged_fields.language
               AND f.version = staged_fields.version),
         needs_blob_id = 0
     WHERE needs_blob_id = 1
       AND EXISTS (
             SELECT 1 FROM fields f
             WHERE f.item_id = staged_fields.item_id AND f.scope = staged_fields.scope
               AND f.field_id = staged_fields.field_id AND f.language = staged_fields.language
               AND f.version = staged_fields.version AND f.value <> '')";

/// Counters reported by staging.
#[derive(Debug, Default, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StageStats {
    pub items: u64,
    pub fields: u64,
    pub blobs: u64,
    pub blob_errors: u64,
    pub blob_ids_reused: u64,
}

/// Create the staging tables if needed and empty them.
pub(crate) fn prepare_staging(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(STAGING_DDL)?;
    conn.execute_batch(CLEAR_STAGING)?;
    Ok(())
}

/// Drain `items` into the staging tables inside one transaction.
///
/// An error yielded by the stream aborts staging and rolls back the staged
/// rows. Blob payloads that fail to open are logged and staged empty.
pub(crate) fn stage_items(
    conn: &Connection,
    ctx: &LoadContext,
    items: ItemStream<'_>,
) -> Result<StageStats, LoadError> {
    prepare_staging(conn)?;

    let mut stats = StageStats::default();
    let tx = conn.unchecked_transaction()?;
    {
        let mut writer = StageWriter {
            ctx,
            insert_item: tx.prepare_cached(INSERT_ITEM)?,
            insert_field: tx.prepare_cached(INSERT_FIELD)?,
            insert_blob: tx.prepare_cached(INSERT_BLOB)?,
            stats: &mut stats,
        };
        for item in items {
            writer.stage(&item?)?;
        }
    }
    tx.commit()?;

    stats.blob_ids_reused = resolve_blob_ids(conn, ctx.options().lookup_blob_ids)?;
    Ok(stats)
}

struct StageWriter<'c, 's> {
    ctx: &'c LoadContext,
    insert_item: CachedStatement<'c>,
    insert_field: CachedStatement<'c>,
    insert_blob: CachedStatement<'c>,
    stats: &'s mut StageStats,
}

impl StageWriter<'_, '_> {
    fn stage(&mut self, item: &Item) -> Result<(), DatabaseError> {
        self.insert_item.execute(params![
            item.id.to_string(),
            item.name(),
            item.template_id.to_string(),
            item.branch_id.to_string(),
            item.parent_id.to_string(),
            item.path,
            item.depth(),
            item.source_info,
            item.load_action.code(),
        ])?;
        self.stats.items += 1;

        for field in item.fields() {
            self.stage_field(item, field)?;
        }
        Ok(())
    }

    fn stage_field(&mut self, item: &Item, field: &Field) -> Result<(), DatabaseError> {
        let data = field.data();
        let gate = data.gate.unwrap_or_default();

        let (value, needs_blob_id) = if data.is_blob {
            match Uuid::parse_str(data.value.trim()) {
                Ok(id) => (id.to_string(), false),
                Err(_) if self.ctx.options().lookup_blob_ids => (String::new(), true),
                Err(_) => (Uuid::new_v4().to_string(), false),
            }
        } else {
            (data.value.clone(), false)
        };

        let row_id = self.insert_field.insert(params![
            item.id.to_string(),
            field.scope().as_str(),
            data.id.to_string(),
            field.language().unwrap_or(""),
            field.version().unwrap_or(0),
            value,
            data.name,
            data.is_blob,
            needs_blob_id,
            gate.applies_on_create,
            gate.applies_on_update,
        ])?;
        self.stats.fields += 1;

        if let Some(blob) = &data.blob {
            let payload = match blob.read_all() {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.ctx.log().error(format!(
                        "Unable to read blob from field '{}' in item '{}' ({}), defaulting to empty value: {}",
                        data.id,
                        item.id,
                        item.source_info.as_deref().unwrap_or(&item.path),
                        e
                    ));
                    self.stats.blob_errors += 1;
                    Vec::new()
                }
            };
            self.insert_blob.execute(params![row_id, payload])?;
            self.stats.blobs += 1;
        }
        Ok(())
    }
}

/// Fill in blob ids for binary fields staged without one: reuse the stored
/// id for the same key when `lookup` is set, otherwise mint a new one.
/// Returns how many stored ids were reused.
fn resolve_blob_ids(conn: &Connection, lookup: bool) -> Result<u64, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let reused = if lookup {
        tx.execute(LOOKUP_BLOB_IDS, [])? as u64
    } else {
        0
    };

    let pending: Vec<i64> = {
        let mut stmt = tx.prepare("SELECT row_id FROM staged_fields WHERE needs_blob_id = 1")?;
        let ids = stmt.query_map([], |row| row.get(0))?;
        ids.collect::<Result<Vec<_>, _>>()?
    };
    {
        let mut assign =
            tx.prepare_cached("UPDATE staged_fields SET value = ?2, needs_blob_id = 0 WHERE row_id = ?1")?;
        for row_id in pending {
            assign.execute(params![row_id, Uuid::new_v4().to_string()])?;
        }
    }
    tx.commit()?;
    Ok(reused)
}
