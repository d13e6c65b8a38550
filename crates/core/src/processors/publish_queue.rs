//! In-transaction writer for the publish queue.

use chrono::Utc;
use rusqlite::params;

use super::SyncInTransaction;
use crate::context::LoadContext;
use crate::db::sql::UPDATE_PUBLISH_QUEUE;
use crate::db::TxHandle;
use crate::errors::LoadError;

/// Enqueues every changed item for publishing when `update_publish_queue`
/// is set. Rows are written parents first.
#[derive(Debug, Default, Clone, Copy)]
pub struct PublishQueueTable;

impl SyncInTransaction for PublishQueueTable {
    fn process(&self, ctx: &LoadContext, tx: &TxHandle<'_>) -> Result<(), LoadError> {
        if !ctx.options().update_publish_queue {
            return Ok(());
        }
        let mut changes: Vec<_> = ctx.item_changes().iter().collect();
        if changes.is_empty() {
            return Ok(());
        }
        changes.sort_by_key(|c| c.path_depth);

        let now = Utc::now().to_rfc3339();
        for change in &changes {
            tx.execute_template(
                UPDATE_PUBLISH_QUEUE,
                params![
                    change.item_id.to_string(),
                    change.kind.as_str(),
                    change.path_depth,
                    now
                ],
            )?;
        }
        ctx.log().info(format!("Queued {} items for publishing", changes.len()));
        Ok(())
    }
}
