//! Per-database run context.
//!
//! A [`LoadContext`] is created once per database per run. It carries the
//! read-only [`LoadOptions`], a readable [`RunLog`], the item changes
//! emitted by the commit, and the terminal outcome of the run.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::LoadOptions;
use crate::errors::LoadError;
use crate::item::ItemChange;

// ---------------------------------------------------------------------------
// Stage machine
// ---------------------------------------------------------------------------

/// Stages of one database run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadStage {
    Created,
    PreStaged,
    Staged,
    Validated,
    Committing,
    Committed,
    PostProcessed,
    Done,
    Failed,
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::PreStaged => write!(f, "pre_staged"),
            Self::Staged => write!(f, "staged"),
            Self::Validated => write!(f, "validated"),
            Self::Committing => write!(f, "committing"),
            Self::Committed => write!(f, "committed"),
            Self::PostProcessed => write!(f, "post_processed"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Run log
// ---------------------------------------------------------------------------

/// Severity of a run log entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One entry in a [`RunLog`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Log sink for one run.
///
/// Every entry is forwarded to `tracing` with the database name attached and
/// also retained so the caller can render the run's log afterwards.
pub struct RunLog {
    database: String,
    entries: Mutex<Vec<LogEntry>>,
}

impl RunLog {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.push(LogLevel::Debug, message.into());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(LogLevel::Info, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.push(LogLevel::Warn, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(LogLevel::Error, message.into());
    }

    /// Snapshot of all entries so far.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.lock().iter().filter(|e| e.level == level).count()
    }

    fn push(&self, level: LogLevel, message: String) {
        let db = self.database.as_str();
        match level {
            LogLevel::Debug => debug!(database = db, "{}", message),
            LogLevel::Info => info!(database = db, "{}", message),
            LogLevel::Warn => warn!(database = db, "{}", message),
            LogLevel::Error => error!(database = db, "{}", message),
        }
        self.lock().push(LogEntry {
            level,
            message,
            at: Utc::now(),
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// State of one database's synchronization run.
pub struct LoadContext {
    database: String,
    options: LoadOptions,
    user: String,
    log: RunLog,
    item_changes: Vec<ItemChange>,
    stage: LoadStage,
    failure: Option<String>,
}

impl LoadContext {
    pub fn new(database: impl Into<String>, options: LoadOptions) -> Self {
        let database = database.into();
        Self {
            log: RunLog::new(database.clone()),
            database,
            options,
            user: "treesync".into(),
            item_changes: Vec::new(),
            stage: LoadStage::Created,
            failure: None,
        }
    }

    /// Set the user recorded in history rows.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    /// Changes emitted by the commit so far.
    pub fn item_changes(&self) -> &[ItemChange] {
        &self.item_changes
    }

    pub fn stage(&self) -> LoadStage {
        self.stage
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Failure message, once the run has failed.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Return an error when the run has already failed.
    pub fn ensure_active(&self) -> Result<(), LoadError> {
        match &self.failure {
            Some(message) => Err(LoadError::AlreadyFailed(message.clone())),
            None => Ok(()),
        }
    }

    /// Mark the run failed. The first message wins and the flag is never
    /// cleared.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.log.error(message.clone());
        if self.failure.is_none() {
            self.failure = Some(message);
        }
        self.stage = LoadStage::Failed;
    }

    /// Move to `stage` unless the run has failed.
    pub(crate) fn advance(&mut self, stage: LoadStage) -> Result<(), LoadError> {
        self.ensure_active()?;
        debug!(database = %self.database, from = %self.stage, to = %stage, "load stage");
        self.stage = stage;
        Ok(())
    }

    pub(crate) fn record_changes(&mut self, changes: Vec<ItemChange>) {
        self.item_changes.extend(changes);
    }

    pub(crate) fn discard_changes(&mut self) {
        self.item_changes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_is_sticky() {
        let mut ctx = LoadContext::new("master", LoadOptions::default());
        assert!(!ctx.is_failed());
        ctx.advance(LoadStage::PreStaged).unwrap();

        ctx.fail("first problem");
        ctx.fail("second problem");

        assert!(ctx.is_failed());
        assert_eq!(ctx.failure(), Some("first problem"));
        assert_eq!(ctx.stage(), LoadStage::Failed);
        assert!(matches!(
            ctx.advance(LoadStage::Staged),
            Err(LoadError::AlreadyFailed(_))
        ));
        assert_eq!(ctx.stage(), LoadStage::Failed);
    }

    #[test]
    fn test_run_log_retains_entries() {
        let ctx = LoadContext::new("web", LoadOptions::default());
        ctx.log().info("staged 3 items");
        ctx.log().error("bad blob");
        let entries = ctx.log().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].level, LogLevel::Error);
        assert_eq!(ctx.log().count(LogLevel::Error), 1);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(LoadStage::PreStaged.to_string(), "pre_staged");
        assert_eq!(LoadStage::PostProcessed.to_string(), "post_processed");
    }
}
