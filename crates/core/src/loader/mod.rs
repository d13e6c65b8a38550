//! Staging / diff / commit engine.
//!
//! A [`BulkLoader`] drives one database's run through the stages of
//! [`LoadStage`]: the item stream is wrapped by pre-stage processors, drained
//! into TEMP staging tables, validated, and merged into the store inside a
//! single write transaction together with the in-transaction synchronizers.
//! Post-commit reactors see the committed change set afterwards.

pub mod merge;
pub mod stage;

use std::time::Instant;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::context::{LoadContext, LoadStage};
use crate::db::{Database, SqlTemplates, TxHandle};
use crate::errors::LoadError;
use crate::item::{Item, ItemChange};
use crate::processors::{ItemStream, Pipeline};

pub use merge::MergeStats;
pub use stage::StageStats;

/// Outcome of one successful [`BulkLoader::load_items`] call.
#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub database: String,
    pub staged: StageStats,
    pub merged: MergeStats,
    /// True when the run stopped after staging.
    pub stage_only: bool,
    pub elapsed_ms: u128,
    pub changes: Vec<ItemChange>,
}

/// Bulk loader for one or more databases.
///
/// The pipeline is fixed at construction; a loader can be reused for any
/// number of runs, each with its own [`LoadContext`]. The default loader
/// runs [`Pipeline::standard`].
#[derive(Debug)]
pub struct BulkLoader {
    pipeline: Pipeline,
    templates: SqlTemplates,
}

impl Default for BulkLoader {
    fn default() -> Self {
        Self::new(Pipeline::standard())
    }
}

impl BulkLoader {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            templates: SqlTemplates::default(),
        }
    }

    /// Replace the SQL templates used by synchronizers.
    pub fn with_templates(mut self, templates: SqlTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn templates(&self) -> &SqlTemplates {
        &self.templates
    }

    /// Load `items` into `db`.
    ///
    /// On any failure the context is marked failed with the triggering
    /// message and the error is returned; nothing after the failing stage
    /// runs. Failures before the write transaction leave the store untouched.
    pub fn load_items<'a, I>(
        &'a self,
        db: &Database,
        ctx: &mut LoadContext,
        items: I,
    ) -> Result<LoadSummary, LoadError>
    where
        I: IntoIterator<Item = Result<Item, LoadError>>,
        I::IntoIter: 'a,
    {
        let started = Instant::now();
        let result = self.run(db, ctx, Box::new(items.into_iter()), started);
        if let Err(e) = &result {
            ctx.fail(e.to_string());
        }
        result
    }

    fn run(
        &self,
        db: &Database,
        ctx: &mut LoadContext,
        items: ItemStream<'_>,
        started: Instant,
    ) -> Result<LoadSummary, LoadError> {
        ctx.ensure_active()?;
        let conn = db.conn();

        ctx.advance(LoadStage::PreStaged)?;
        let staged = {
            let view: &LoadContext = ctx;
            let mut stream: ItemStream<'_> = items;
            for processor in &self.pipeline.item_processors {
                stream = processor.process(view, stream);
            }
            stage::stage_items(&conn, view, stream)?
        };
        ctx.advance(LoadStage::Staged)?;
        ctx.log().info(format!(
            "Staged {} items with {} fields ({}ms)",
            staged.items,
            staged.fields,
            started.elapsed().as_millis()
        ));

        let mut summary = LoadSummary {
            database: ctx.database().to_string(),
            staged,
            merged: MergeStats::default(),
            stage_only: false,
            elapsed_ms: 0,
            changes: Vec::new(),
        };

        if ctx.options().stage_data_without_write {
            ctx.log().info("Staged data left unwritten, skipping validation and commit");
            ctx.advance(LoadStage::Done)?;
            summary.stage_only = true;
            summary.elapsed_ms = started.elapsed().as_millis();
            return Ok(summary);
        }

        self.validate(&conn, ctx)?;
        ctx.advance(LoadStage::Validated)?;

        ctx.advance(LoadStage::Committing)?;
        match self.commit(&conn, ctx) {
            Ok(merged) => summary.merged = merged,
            Err(e) => {
                ctx.discard_changes();
                return Err(e);
            }
        }
        ctx.advance(LoadStage::Committed)?;
        ctx.log().info(format!(
            "Committed {} created, {} updated, {} deleted, {} field writes",
            summary.merged.created,
            summary.merged.updated,
            summary.merged.deleted,
            summary.merged.field_writes
        ));
        drop(conn);

        for processor in &self.pipeline.change_processors {
            processor
                .process(ctx, ctx.item_changes())
                .map_err(|e| LoadError::Processor {
                    processor: processor.name().to_string(),
                    detail: e.to_string(),
                })?;
        }
        ctx.advance(LoadStage::PostProcessed)?;
        ctx.advance(LoadStage::Done)?;

        summary.changes = ctx.item_changes().to_vec();
        summary.elapsed_ms = started.elapsed().as_millis();
        info!(
            database = %summary.database,
            changes = summary.changes.len(),
            elapsed_ms = summary.elapsed_ms as u64,
            "bulk load complete"
        );
        Ok(summary)
    }

    /// Run every validator; any rejection fails the run.
    fn validate(&self, conn: &Connection, ctx: &LoadContext) -> Result<(), LoadError> {
        let tx = TxHandle::new(conn, &self.templates);
        let mut rejected = Vec::new();
        for validator in &self.pipeline.validators {
            if !validator.validate(ctx, &tx)? {
                warn!(database = ctx.database(), validator = validator.name(), "staged data rejected");
                rejected.push(validator.name());
            }
        }
        if rejected.is_empty() {
            Ok(())
        } else {
            Err(LoadError::ValidationFailed(format!(
                "staged data rejected by {}",
                rejected.join(", ")
            )))
        }
    }

    /// Diff, write, and run synchronizers in one transaction. Dropping the
    /// transaction on an early return rolls everything back.
    fn commit(&self, conn: &Connection, ctx: &mut LoadContext) -> Result<MergeStats, LoadError> {
        let tx = conn.unchecked_transaction()?;
        let outcome = merge::merge(&tx, ctx.options().force_update_all_fields)?;
        ctx.record_changes(outcome.changes);

        let handle = TxHandle::new(&tx, &self.templates);
        for synchronizer in &self.pipeline.synchronizers {
            synchronizer
                .process(ctx, &handle)
                .map_err(|e| LoadError::Processor {
                    processor: synchronizer.name().to_string(),
                    detail: e.to_string(),
                })?;
        }
        drop(handle);

        tx.commit()?;
        Ok(outcome.stats)
    }
}
