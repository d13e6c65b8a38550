//! Post-commit reactors that forward the change set to external indexes.

use std::sync::Arc;

use super::ChangeProcessor;
use crate::context::LoadContext;
use crate::errors::LoadError;
use crate::item::ItemChange;

/// Full-text search index refreshed after a load.
pub trait SearchIndex: Send + Sync {
    fn refresh(&self, database: &str, changes: &[ItemChange]) -> Result<(), LoadError>;
}

/// Store of item-to-item references rebuilt after a load.
pub trait LinkDatabase: Send + Sync {
    fn update_links(&self, database: &str, changes: &[ItemChange]) -> Result<(), LoadError>;
}

/// Refreshes a [`SearchIndex`] when `update_search_index` is set.
pub struct IndexUpdater {
    index: Arc<dyn SearchIndex>,
}

impl IndexUpdater {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }
}

impl ChangeProcessor for IndexUpdater {
    fn process(&self, ctx: &LoadContext, changes: &[ItemChange]) -> Result<(), LoadError> {
        if !ctx.options().update_search_index || changes.is_empty() {
            return Ok(());
        }
        let started = std::time::Instant::now();
        self.index.refresh(ctx.database(), changes)?;
        ctx.log().info(format!(
            "Search index refreshed for {} items ({}ms)",
            changes.len(),
            started.elapsed().as_millis()
        ));
        Ok(())
    }
}

/// Updates a [`LinkDatabase`] when `update_link_database` is set.
pub struct LinkDatabaseUpdater {
    links: Arc<dyn LinkDatabase>,
}

impl LinkDatabaseUpdater {
    pub fn new(links: Arc<dyn LinkDatabase>) -> Self {
        Self { links }
    }
}

impl ChangeProcessor for LinkDatabaseUpdater {
    fn process(&self, ctx: &LoadContext, changes: &[ItemChange]) -> Result<(), LoadError> {
        if !ctx.options().update_link_database || changes.is_empty() {
            return Ok(());
        }
        self.links.update_links(ctx.database(), changes)?;
        ctx.log().info(format!("Link database updated for {} items", changes.len()));
        Ok(())
    }
}
