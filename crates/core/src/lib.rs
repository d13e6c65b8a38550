//! treesync core library.
//!
//! This crate synchronizes serialized content trees into SQLite-backed
//! content databases: the field and item model, load action resolution,
//! configuration, persistence, the staging / diff / commit bulk loader with
//! its processor pipeline, serialized sources, and the multi-database sync
//! engine.

pub mod action;
pub mod config;
pub mod context;
pub mod db;
pub mod errors;
pub mod item;
pub mod loader;
pub mod processors;
pub mod source;
pub mod sync_engine;

// Re-exports for convenience.
pub use action::{resolve_action, SyncStrategy};
pub use config::{AppConfig, FailurePolicy, LoadOptions};
pub use context::{LoadContext, LoadStage};
pub use db::Database;
pub use item::{Field, FieldData, FieldGate, Item, ItemChange, LoadAction};
pub use loader::{BulkLoader, LoadSummary};
pub use processors::Pipeline;
pub use sync_engine::SyncEngine;
