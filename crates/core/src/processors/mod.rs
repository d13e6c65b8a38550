//! Extension points of the bulk load pipeline.
//!
//! Four kinds of processor run at fixed points of a load:
//!
//! 1. [`ItemProcessor`] wraps the lazy item stream before staging.
//! 2. [`ValidateStagedData`] inspects the staged set before anything is written.
//! 3. [`SyncInTransaction`] runs inside the write transaction after the diff.
//! 4. [`ChangeProcessor`] reacts to the committed change set.

pub mod cache_clearer;
pub mod history;
pub mod index;
pub mod publish_queue;
pub mod validators;
pub mod version_ensurer;

use crate::context::LoadContext;
use crate::db::TxHandle;
use crate::errors::LoadError;
use crate::item::{Item, ItemChange};

pub use cache_clearer::{cache_clear_entries, CacheClearEntry, ChangeCacheClearer, ItemCache, MemoryItemCache};
pub use history::SyncHistoryTable;
pub use index::{IndexUpdater, LinkDatabase, LinkDatabaseUpdater, SearchIndex};
pub use publish_queue::PublishQueueTable;
pub use validators::{ValidateNoDuplicates, ValidateParentsExist, ValidateTemplateChanges};
pub use version_ensurer::{add_statistics_fields, ItemVersionEnsurer};

/// Lazy, single-pass stream of items flowing towards staging.
pub type ItemStream<'a> = Box<dyn Iterator<Item = Result<Item, LoadError>> + 'a>;

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

/// Transforms the item stream before it is staged. Must stay lazy.
pub trait ItemProcessor: Send + Sync {
    fn process<'a>(&'a self, ctx: &'a LoadContext, items: ItemStream<'a>) -> ItemStream<'a>;

    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }
}

/// Checks the staged set. Returning `Ok(false)` fails the run before any
/// durable write.
pub trait ValidateStagedData: Send + Sync {
    fn validate(&self, ctx: &LoadContext, tx: &TxHandle<'_>) -> Result<bool, LoadError>;

    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }
}

/// Runs inside the write transaction, after the change set is known.
pub trait SyncInTransaction: Send + Sync {
    fn process(&self, ctx: &LoadContext, tx: &TxHandle<'_>) -> Result<(), LoadError>;

    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }
}

/// Reacts to committed changes.
pub trait ChangeProcessor: Send + Sync {
    fn process(&self, ctx: &LoadContext, changes: &[ItemChange]) -> Result<(), LoadError>;

    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }
}

/// Ordered processor registrations for a [`BulkLoader`](crate::loader::BulkLoader).
#[derive(Default)]
pub struct Pipeline {
    pub item_processors: Vec<Box<dyn ItemProcessor>>,
    pub validators: Vec<Box<dyn ValidateStagedData>>,
    pub synchronizers: Vec<Box<dyn SyncInTransaction>>,
    pub change_processors: Vec<Box<dyn ChangeProcessor>>,
}

impl Pipeline {
    /// Empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Version ensurer, the three stock validators, and the history and
    /// publish queue synchronizers. Each synchronizer checks its own option.
    pub fn standard() -> Self {
        Self::new()
            .with_item_processor(ItemVersionEnsurer)
            .with_validator(ValidateNoDuplicates)
            .with_validator(ValidateParentsExist)
            .with_validator(ValidateTemplateChanges)
            .with_synchronizer(SyncHistoryTable)
            .with_synchronizer(PublishQueueTable)
    }

    pub fn with_item_processor(mut self, processor: impl ItemProcessor + 'static) -> Self {
        self.item_processors.push(Box::new(processor));
        self
    }

    pub fn with_validator(mut self, validator: impl ValidateStagedData + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    pub fn with_synchronizer(mut self, synchronizer: impl SyncInTransaction + 'static) -> Self {
        self.synchronizers.push(Box::new(synchronizer));
        self
    }

    pub fn with_change_processor(mut self, processor: impl ChangeProcessor + 'static) -> Self {
        self.change_processors.push(Box::new(processor));
        self
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field(
                "item_processors",
                &self.item_processors.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field(
                "validators",
                &self.validators.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field(
                "synchronizers",
                &self.synchronizers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field(
                "change_processors",
                &self.change_processors.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
