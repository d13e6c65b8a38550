//! In-transaction writer for the item history ledger.

use chrono::Utc;
use rusqlite::params;

use super::SyncInTransaction;
use crate::context::LoadContext;
use crate::db::sql::UPDATE_HISTORY;
use crate::db::TxHandle;
use crate::errors::LoadError;

/// Appends one history row per item change when `update_history` is set.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncHistoryTable;

impl SyncInTransaction for SyncHistoryTable {
    fn process(&self, ctx: &LoadContext, tx: &TxHandle<'_>) -> Result<(), LoadError> {
        if !ctx.options().update_history {
            return Ok(());
        }
        let changes = ctx.item_changes();
        if changes.is_empty() {
            return Ok(());
        }

        let started = std::time::Instant::now();
        let now = Utc::now().to_rfc3339();
        for change in changes {
            tx.execute_template(
                UPDATE_HISTORY,
                params![
                    change.kind.as_str(),
                    change.item_id.to_string(),
                    change.item_path,
                    ctx.user(),
                    now
                ],
            )?;
        }
        ctx.log().info(format!(
            "Updated history: {} rows ({}ms)",
            changes.len(),
            started.elapsed().as_millis()
        ));
        Ok(())
    }
}
