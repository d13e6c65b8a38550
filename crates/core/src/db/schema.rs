//! Database schema definitions and migration runner.
//!
//! Migrations are simple SQL strings applied in order. The SQLite
//! `user_version` pragma tracks which migrations have already been applied.
//! Staging tables are not part of the schema; the loader creates them as
//! TEMP tables on its own connection.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::DatabaseError;

/// All migrations, in order. Each entry is `(version, description, sql)`.
static MIGRATIONS: &[(u32, &str, &str)] = &[
    (
        1,
        "content store",
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            template_id TEXT NOT NULL,
            branch_id   TEXT NOT NULL,
            parent_id   TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_items_parent_id ON items (parent_id);

        CREATE TABLE IF NOT EXISTS fields (
            item_id     TEXT    NOT NULL,
            scope       TEXT    NOT NULL CHECK (scope IN ('shared', 'unversioned', 'versioned')),
            field_id    TEXT    NOT NULL,
            language    TEXT    NOT NULL DEFAULT '',
            version     INTEGER NOT NULL DEFAULT 0,
            value       TEXT    NOT NULL,
            updated_at  TEXT    NOT NULL,
            PRIMARY KEY (item_id, scope, field_id, language, version)
        );

        CREATE TABLE IF NOT EXISTS blobs (
            blob_id     TEXT PRIMARY KEY,
            data        BLOB NOT NULL,
            created_at  TEXT NOT NULL
        );
        "#,
    ),
    (
        2,
        "history ledger and publish queue",
        r#"
        CREATE TABLE IF NOT EXISTS history (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            category    TEXT NOT NULL DEFAULT 'item',
            action      TEXT NOT NULL CHECK (action IN ('created', 'updated', 'deleted')),
            item_id     TEXT NOT NULL,
            item_path   TEXT NOT NULL,
            user_name   TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_history_item_id ON history (item_id);
        CREATE INDEX IF NOT EXISTS idx_history_created_at ON history (created_at);

        CREATE TABLE IF NOT EXISTS publish_queue (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id     TEXT    NOT NULL,
            action      TEXT    NOT NULL,
            path_depth  INTEGER NOT NULL,
            queued_at   TEXT    NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_publish_queue_queued_at ON publish_queue (queued_at);
        "#,
    ),
];

/// Run all pending migrations against `conn`.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_schema_version(conn)?;
    info!(
        current_version,
        target_version = MIGRATIONS.last().map(|m| m.0).unwrap_or(0),
        "checking database migrations"
    );

    for &(version, description, sql) in MIGRATIONS {
        if version > current_version {
            info!(version, description, "applying migration");
            conn.execute_batch(sql)
                .map_err(|e| DatabaseError::MigrationFailed {
                    version,
                    detail: e.to_string(),
                })?;
            set_schema_version(conn, version)?;
            debug!(version, "migration applied successfully");
        }
    }

    Ok(())
}

/// Read the current schema version from the SQLite `user_version` pragma.
fn get_schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

/// Set the schema version via the SQLite `user_version` pragma.
fn set_schema_version(conn: &Connection, version: u32) -> Result<(), DatabaseError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}
