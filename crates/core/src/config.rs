//! TOML-based configuration for treesync.
//!
//! A configuration names the tree roots to synchronize, the database each
//! root belongs to, and the [`LoadOptions`] applied to every database run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::action::SyncStrategy;
use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Logging, storage and orchestration settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Flags applied to every database run.
    #[serde(default)]
    pub options: LoadOptions,

    /// Tree roots to synchronize, in order.
    #[serde(default)]
    pub roots: Vec<RootConfig>,
}

// ---------------------------------------------------------------------------
// General
// ---------------------------------------------------------------------------

/// What to do when one database's run fails.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the whole multi-database sync at the first failed database.
    #[default]
    Abort,
    /// Record the failure and move on to the next database.
    Continue,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory holding one SQLite file per database.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Behaviour when a database run fails.
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// User name recorded in the history ledger and statistics fields.
    #[serde(default = "default_user")]
    pub user: String,

    /// Queue changed items for publishing after a successful run.
    #[serde(default = "default_true")]
    pub publish_after_sync: bool,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_user() -> String {
    "treesync".into()
}
fn default_true() -> bool {
    true
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            failure_policy: FailurePolicy::default(),
            user: default_user(),
            publish_after_sync: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Load options
// ---------------------------------------------------------------------------

/// Flags read by the loader and its processors during one database run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadOptions {
    /// Evict changed items from item caches after commit. Read only when the
    /// pipeline registers a cache clearer.
    #[serde(default)]
    pub remove_items_from_caches: bool,

    /// Treat every existing staged item as updated and rewrite its fields.
    #[serde(default)]
    pub force_update_all_fields: bool,

    /// Stop after staging; nothing is diffed or written. Debugging aid.
    #[serde(default)]
    pub stage_data_without_write: bool,

    /// Write the history ledger inside the commit transaction.
    #[serde(default)]
    pub update_history: bool,

    /// Write the publish queue inside the commit transaction.
    #[serde(default)]
    pub update_publish_queue: bool,

    /// Refresh link database entries for changed items after commit. Read
    /// only when the pipeline registers a link database updater.
    #[serde(default = "default_true")]
    pub update_link_database: bool,

    /// Refresh search index entries for changed items after commit. Read
    /// only when the pipeline registers an index updater.
    #[serde(default = "default_true")]
    pub update_search_index: bool,

    /// Allow existing items to change template.
    #[serde(default = "default_true")]
    pub allow_template_changes: bool,

    /// Resolve missing blob ids from the store before writing.
    #[serde(default = "default_true")]
    pub lookup_blob_ids: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            remove_items_from_caches: false,
            force_update_all_fields: false,
            stage_data_without_write: false,
            update_history: false,
            update_publish_queue: false,
            update_link_database: true,
            update_search_index: true,
            allow_template_changes: true,
            lookup_blob_ids: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Roots
// ---------------------------------------------------------------------------

/// One tree root read from a serialized source directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootConfig {
    /// Display name used in logs.
    pub name: String,

    /// Target database name.
    #[serde(default = "default_database")]
    pub database: String,

    /// Directory holding the serialized items.
    pub source: PathBuf,

    /// Content path of the root item, e.g. `/sitecore/content/Home`.
    pub path: String,

    /// Synchronization strategy.
    #[serde(default = "default_strategy")]
    pub strategy: SyncStrategy,

    /// Paths below the root that are not synchronized.
    #[serde(default)]
    pub exclusions: Vec<String>,
}

fn default_database() -> String {
    "master".into()
}
fn default_strategy() -> SyncStrategy {
    SyncStrategy::MirrorExact
}

impl RootConfig {
    /// Whether `path` is excluded by this root (the path itself or below it).
    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclusions.iter().any(|ex| {
            let ex = ex.trim_end_matches('/');
            path.eq_ignore_ascii_case(ex)
                || (path.len() > ex.len()
                    && path.as_bytes()[..ex.len()].eq_ignore_ascii_case(ex.as_bytes())
                    && path.as_bytes()[ex.len()] == b'/')
        })
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!(roots = config.roots.len(), "configuration parsed");
        Ok(config)
    }

    /// Validate that required fields are present and values are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.general.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".into(),
                detail: format!("expected one of {}", LEVELS.join(", ")),
            });
        }

        let mut names = HashSet::new();
        for (i, root) in self.roots.iter().enumerate() {
            if root.name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("roots[{}].name", i),
                    detail: "must not be empty".into(),
                });
            }
            if !names.insert(root.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("roots[{}].name", i),
                    detail: format!("duplicate root name '{}'", root.name),
                });
            }
            if root.database.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("roots[{}].database", i),
                    detail: "must not be empty".into(),
                });
            }
            if !root.path.starts_with('/') {
                return Err(ConfigError::InvalidValue {
                    field: format!("roots[{}].path", i),
                    detail: "must be an absolute content path starting with '/'".into(),
                });
            }
        }

        Ok(())
    }

    /// Load and validate in one step.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Distinct database names in the order roots first mention them.
    pub fn database_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.roots
            .iter()
            .filter(|r| seen.insert(r.database.to_ascii_lowercase()))
            .map(|r| r.database.clone())
            .collect()
    }

    /// Roots targeting `database`.
    pub fn roots_for(&self, database: &str) -> Vec<&RootConfig> {
        self.roots
            .iter()
            .filter(|r| r.database.eq_ignore_ascii_case(database))
            .collect()
    }

    /// SQLite file backing `database`.
    pub fn database_path(&self, database: &str) -> PathBuf {
        self.general
            .data_dir
            .join(format!("{}.db", database.to_ascii_lowercase()))
    }
}
