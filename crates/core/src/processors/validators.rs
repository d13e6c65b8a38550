//! Stock validators run against the staged set before the write transaction.
//!
//! Each validator logs up to [`REPORT_LIMIT`] offending rows to the run log
//! and returns `false`; the engine turns that into a single run failure.

use rusqlite::params;
use uuid::Uuid;

use super::ValidateStagedData;
use crate::context::LoadContext;
use crate::db::TxHandle;
use crate::errors::{DatabaseError, LoadError};
use crate::item::LoadAction;

/// Maximum offending rows reported per validator.
pub const REPORT_LIMIT: u32 = 20;

fn collect_rows(
    tx: &TxHandle<'_>,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Vec<String>>, DatabaseError> {
    let conn = tx.connection();
    let mut stmt = conn.prepare_cached(sql)?;
    let width = stmt.column_count();
    let rows = stmt
        .query_map(params, |row| {
            (0..width)
                .map(|i| row.get::<_, String>(i))
                .collect::<Result<Vec<_>, _>>()
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Rejects a staged set containing the same item id, or the same field key
/// on one item, more than once.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValidateNoDuplicates;

impl ValidateStagedData for ValidateNoDuplicates {
    fn validate(&self, ctx: &LoadContext, tx: &TxHandle<'_>) -> Result<bool, LoadError> {
        let items = collect_rows(
            tx,
            "SELECT id, MIN(path), CAST(COUNT(*) AS TEXT) FROM staged_items
             GROUP BY id HAVING COUNT(*) > 1 LIMIT ?1",
            params![REPORT_LIMIT],
        )?;
        for row in &items {
            ctx.log().error(format!(
                "Duplicate item id {} staged {} times (first path '{}')",
                row[0], row[2], row[1]
            ));
        }

        let fields = collect_rows(
            tx,
            "SELECT item_id, scope, field_id, language, CAST(version AS TEXT) FROM staged_fields
             GROUP BY item_id, scope, field_id, language, version
             HAVING COUNT(*) > 1 LIMIT ?1",
            params![REPORT_LIMIT],
        )?;
        for row in &fields {
            ctx.log().error(format!(
                "Duplicate {} field {} ({} #{}) staged on item {}",
                row[1], row[2], row[3], row[4], row[0]
            ));
        }

        Ok(items.is_empty() && fields.is_empty())
    }
}

/// Rejects template changes on existing items unless the run allows them.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValidateTemplateChanges;

impl ValidateStagedData for ValidateTemplateChanges {
    fn validate(&self, ctx: &LoadContext, tx: &TxHandle<'_>) -> Result<bool, LoadError> {
        if ctx.options().allow_template_changes {
            return Ok(true);
        }
        let rows = collect_rows(
            tx,
            "SELECT s.id, s.path, i.template_id, s.template_id
             FROM staged_items s JOIN items i ON i.id = s.id
             WHERE i.template_id <> s.template_id AND s.load_action IN (?1, ?2)
             LIMIT ?3",
            params![
                LoadAction::RevertTree.code(),
                LoadAction::Revert.code(),
                REPORT_LIMIT
            ],
        )?;
        for row in &rows {
            ctx.log().error(format!(
                "Template change on item {} ('{}') from {} to {} is not allowed",
                row[0], row[1], row[2], row[3]
            ));
        }
        Ok(rows.is_empty())
    }
}

/// Requires every staged item's parent to be staged, stored, or nil, and
/// rejects a staged item whose stored parent a revert-tree ancestor would
/// delete.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValidateParentsExist;

impl ValidateStagedData for ValidateParentsExist {
    fn validate(&self, ctx: &LoadContext, tx: &TxHandle<'_>) -> Result<bool, LoadError> {
        let missing = collect_rows(
            tx,
            "SELECT s.id, s.path, s.parent_id FROM staged_items s
             WHERE s.parent_id <> ?1
               AND NOT EXISTS (SELECT 1 FROM staged_items p WHERE p.id = s.parent_id)
               AND NOT EXISTS (SELECT 1 FROM items i WHERE i.id = s.parent_id)
             LIMIT ?2",
            params![Uuid::nil().to_string(), REPORT_LIMIT],
        )?;
        for row in &missing {
            ctx.log().error(format!(
                "Parent {} of item {} ('{}') exists neither in the source nor in the database",
                row[2], row[0], row[1]
            ));
        }

        let doomed = collect_rows(
            tx,
            "WITH RECURSIVE doomed(id) AS (
                 SELECT i.id FROM items i JOIN staged_items s ON i.parent_id = s.id
                 WHERE s.load_action = ?1
                   AND NOT EXISTS (SELECT 1 FROM staged_items x WHERE x.id = i.id)
                 UNION
                 SELECT i.id FROM items i JOIN doomed d ON i.parent_id = d.id
                 WHERE NOT EXISTS (SELECT 1 FROM staged_items x WHERE x.id = i.id)
             )
             SELECT s.id, s.path, s.parent_id FROM staged_items s
             WHERE s.parent_id IN (SELECT id FROM doomed)
             LIMIT ?2",
            params![LoadAction::RevertTree.code(), REPORT_LIMIT],
        )?;
        for row in &doomed {
            ctx.log().error(format!(
                "Parent {} of item {} ('{}') is missing from the source and would be deleted",
                row[2], row[0], row[1]
            ));
        }

        Ok(missing.is_empty() && doomed.is_empty())
    }
}
