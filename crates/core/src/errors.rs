//! Error types for the treesync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

// ---------------------------------------------------------------------------
// Model errors
// ---------------------------------------------------------------------------

/// Errors raised while building items and fields.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A constructor argument was missing or out of range.
    #[error("invalid argument '{argument}': {detail}")]
    InvalidArgument {
        argument: &'static str,
        detail: String,
    },

    /// Two fields of the same variant share a key within one item.
    #[error("duplicate field {key} on item {item_id}")]
    DuplicateField {
        item_id: Uuid,
        key: String,
    },
}

/// Errors raised while opening a lazy binary payload.
#[derive(Debug, Error)]
pub enum BlobError {
    /// The encoded payload could not be decoded.
    #[error("blob decode failed: {0}")]
    Decode(String),

    /// Reading the payload failed.
    #[error("blob I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Action resolution errors
// ---------------------------------------------------------------------------

/// Errors from mapping a synchronization strategy onto a load action.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The strategy name is not one the resolver knows.
    #[error("unsupported synchronization strategy: '{0}'")]
    UnsupportedStrategy(String),
}

// ---------------------------------------------------------------------------
// Source errors
// ---------------------------------------------------------------------------

/// Errors from reading serialized items out of a source tree.
#[derive(Debug, Error)]
pub enum SourceError {
    /// A file or directory could not be read.
    #[error("source I/O error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A serialized item could not be parsed.
    #[error("failed to parse serialized item '{path}': {detail}")]
    Parse {
        path: String,
        detail: String,
    },

    /// No serialized item exists at a configured root path.
    #[error("root path '{path}' not found in source '{source_dir}'")]
    RootNotFound {
        path: String,
        source_dir: String,
    },

    /// Mapping a serialized item into the field model failed.
    #[error("failed to map item '{path}': {detail}")]
    Mapping {
        path: String,
        detail: String,
    },
}

// ---------------------------------------------------------------------------
// Bulk load errors
// ---------------------------------------------------------------------------

/// Errors from the staging / diff / commit engine.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The run context was already failed when a stage was entered.
    #[error("run already failed: {0}")]
    AlreadyFailed(String),

    /// A staged-data validator rejected the staged set.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// A processor reported an error.
    #[error("processor '{processor}' failed: {detail}")]
    Processor {
        processor: String,
        detail: String,
    },

    /// Model construction failed while items were flowing to staging.
    #[error("load model error: {0}")]
    Model(#[from] ModelError),

    /// The item source failed while items were flowing to staging.
    #[error("load source error: {0}")]
    Source(#[from] SourceError),

    /// Database error during any stage.
    #[error("load database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for LoadError {
    fn from(e: rusqlite::Error) -> Self {
        LoadError::Database(DatabaseError::SqliteError(e))
    }
}

// ---------------------------------------------------------------------------
// Orchestration errors
// ---------------------------------------------------------------------------

/// Errors from the multi-database sync orchestrator.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Another sync is already in progress on this engine.
    #[error("sync already in progress (started at {started_at})")]
    AlreadyRunning { started_at: String },

    /// A database's run failed and the failure policy is `abort`.
    #[error("stage failed during bulk load of database '{database}': {message}")]
    DatabaseFailed {
        database: String,
        message: String,
    },

    /// Configuration was unusable.
    #[error("sync configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// A root's strategy could not be resolved.
    #[error("sync action error: {0}")]
    ActionError(#[from] ActionError),

    /// Database error outside a load run (open / migrate).
    #[error("sync database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    /// Error raised by a load run that escaped the run context.
    #[error("sync load error: {0}")]
    LoadError(#[from] LoadError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Database errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite persistence layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed {
        version: u32,
        detail: String,
    },

    /// A named SQL template has no registered text.
    #[error("sql template not found: {0}")]
    TemplateNotFound(String),

    /// Generic I/O error (e.g. file permissions).
    #[error("database I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
