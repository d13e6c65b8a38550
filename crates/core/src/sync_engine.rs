//! Multi-database synchronization orchestrator.
//!
//! The [`SyncEngine`] drives one sync over every database named by the
//! configured roots:
//!
//! 1. Open (and migrate) the database's SQLite file.
//! 2. Open the serialized source of every root targeting the database.
//! 3. Extract and map items lazily, and hand the stream to the bulk loader.
//! 4. Apply the failure policy when the run fails.
//! 5. Collect publish candidates from the committed changes.
//!
//! A lock flag prevents overlapping syncs on one engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, FailurePolicy};
use crate::context::{LoadContext, LogEntry, LogLevel};
use crate::db::Database;
use crate::errors::{LoadError, SyncError};
use crate::item::ItemChange;
use crate::loader::{BulkLoader, LoadSummary};
use crate::processors::Pipeline;
use crate::source::{ItemExtractor, ItemMapper, JsonTreeSource, SourceRoot};

/// Database whose changes are never queued for publishing.
pub const CORE_DATABASE: &str = "core";

/// Outcome of one database's run.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseReport {
    pub database: String,
    pub summary: Option<LoadSummary>,
    pub failure: Option<String>,
    pub errors_logged: usize,
    pub log: Vec<LogEntry>,
}

impl DatabaseReport {
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn changes(&self) -> &[ItemChange] {
        self.summary
            .as_ref()
            .map(|s| s.changes.as_slice())
            .unwrap_or_default()
    }
}

/// Statistics from a single sync.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    pub databases: Vec<DatabaseReport>,
    /// Changed item ids to publish, parents before children.
    pub publish_candidates: Vec<Uuid>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl SyncStats {
    pub fn total_changes(&self) -> usize {
        self.databases.iter().map(|d| d.changes().len()).sum()
    }

    pub fn failed_databases(&self) -> impl Iterator<Item = &DatabaseReport> {
        self.databases.iter().filter(|d| d.is_failed())
    }
}

/// Synchronizes serialized source trees into their databases.
pub struct SyncEngine {
    config: AppConfig,
    loader: BulkLoader,
    /// Atomic flag preventing concurrent syncs.
    running: Arc<AtomicBool>,
    /// Start time of the sync holding the lock.
    current_run: Mutex<Option<DateTime<Utc>>>,
}

impl SyncEngine {
    /// Create an engine using the standard pipeline.
    pub fn new(config: AppConfig) -> Self {
        Self::with_loader(config, BulkLoader::new(Pipeline::standard()))
    }

    /// Create an engine with a caller-assembled loader.
    pub fn with_loader(config: AppConfig, loader: BulkLoader) -> Self {
        info!(roots = config.roots.len(), "initializing sync engine");
        Self {
            config,
            loader,
            running: Arc::new(AtomicBool::new(false)),
            current_run: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn loader(&self) -> &BulkLoader {
        &self.loader
    }

    /// Check if a sync is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Main entry point
    // -----------------------------------------------------------------------

    /// Synchronize every configured database, or only `only` when given.
    ///
    /// With [`FailurePolicy::Abort`] the first failed database ends the sync
    /// with [`SyncError::DatabaseFailed`]; databases already committed stay
    /// committed. With [`FailurePolicy::Continue`] failures are recorded in
    /// the returned stats.
    pub fn run_sync(&self, only: Option<&str>) -> Result<SyncStats, SyncError> {
        let (_guard, started_at) = self.begin_run()?;

        let mut stats = SyncStats {
            started_at: started_at.to_rfc3339(),
            ..Default::default()
        };

        let databases: Vec<String> = self
            .config
            .database_names()
            .into_iter()
            .filter(|db| only.map_or(true, |o| o.eq_ignore_ascii_case(db)))
            .collect();
        if databases.is_empty() {
            warn!(only, "no configured roots match; nothing to sync");
        }

        let mut candidates: Vec<(u32, Uuid)> = Vec::new();
        for database in databases {
            let report = self.sync_database(&database);

            if let Some(message) = &report.failure {
                match self.config.general.failure_policy {
                    FailurePolicy::Abort => {
                        return Err(SyncError::DatabaseFailed {
                            database: report.database,
                            message: message.clone(),
                        });
                    }
                    FailurePolicy::Continue => {
                        warn!(database = %report.database, %message, "database sync failed, continuing");
                    }
                }
            } else if self.config.general.publish_after_sync
                && !report.database.eq_ignore_ascii_case(CORE_DATABASE)
            {
                candidates.extend(report.changes().iter().map(|c| (c.path_depth, c.item_id)));
            }

            stats.databases.push(report);
        }

        candidates.sort_by_key(|(depth, _)| *depth);
        stats.publish_candidates = candidates.into_iter().map(|(_, id)| id).collect();
        stats.completed_at = Some(Utc::now().to_rfc3339());

        info!(
            databases = stats.databases.len(),
            changes = stats.total_changes(),
            publish = stats.publish_candidates.len(),
            "sync complete"
        );
        Ok(stats)
    }

    /// Take the sync lock and record when this run started.
    fn begin_run(&self) -> Result<(SyncLockGuard, DateTime<Utc>), SyncError> {
        let mut current = self
            .current_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::AlreadyRunning {
                started_at: (*current).map(|t| t.to_rfc3339()).unwrap_or_default(),
            });
        }
        let now = Utc::now();
        *current = Some(now);
        Ok((SyncLockGuard(self.running.clone()), now))
    }

    /// Run one database. Every failure is captured in the report.
    pub fn sync_database(&self, database: &str) -> DatabaseReport {
        info!(database, "starting database sync");
        let mut ctx = LoadContext::new(database, self.config.options.clone())
            .with_user(self.config.general.user.clone());

        let summary = match self.load_database(database, &mut ctx) {
            Ok(summary) => Some(summary),
            Err(e) => {
                ctx.fail(e.to_string());
                None
            }
        };

        DatabaseReport {
            database: database.to_string(),
            summary,
            failure: ctx.failure().map(str::to_string),
            errors_logged: ctx.log().count(LogLevel::Error),
            log: ctx.log().entries(),
        }
    }

    fn load_database(&self, database: &str, ctx: &mut LoadContext) -> Result<LoadSummary, SyncError> {
        let db = Database::new(self.config.database_path(database))?;
        db.initialize()?;

        let mut roots = Vec::new();
        for root in self.config.roots_for(database) {
            let source = JsonTreeSource::open(&root.source).map_err(LoadError::from)?;
            ctx.log().info(format!(
                "Root '{}' ({}) read {} serialized items from {}",
                root.name,
                root.strategy,
                source.len(),
                root.source.display()
            ));
            roots.push(SourceRoot {
                config: root,
                source: Box::new(source),
            });
        }

        let extractor = ItemExtractor::new(ItemMapper::new(ctx.user()));
        let summary = self.loader.load_items(&db, ctx, extractor.extract(&roots))?;
        Ok(summary)
    }
}

/// Drop guard that resets the `running` flag to `false`.
///
/// This ensures the sync lock is always released, even if a sync panics.
struct SyncLockGuard(Arc<AtomicBool>);

impl Drop for SyncLockGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
