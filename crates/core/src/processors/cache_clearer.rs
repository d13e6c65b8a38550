//! Post-commit eviction of changed items from item caches.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use uuid::Uuid;

use super::ChangeProcessor;
use crate::context::LoadContext;
use crate::errors::LoadError;
use crate::item::ItemChange;

/// One cache eviction request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheClearEntry {
    pub item_id: Uuid,
    pub parent_id: Uuid,
    pub item_path: String,
}

/// Eviction entries for a change set: one per change, plus a second entry
/// under the original parent for moved items.
///
/// The iterator is lazy; call again for a fresh pass.
pub fn cache_clear_entries(changes: &[ItemChange]) -> impl Iterator<Item = CacheClearEntry> + '_ {
    changes.iter().flat_map(|change| {
        let current = CacheClearEntry {
            item_id: change.item_id,
            parent_id: change.parent_id,
            item_path: change.item_path.clone(),
        };
        let previous = change.is_move().then(|| CacheClearEntry {
            item_id: change.item_id,
            parent_id: change.original_parent_id,
            item_path: change.item_path.clone(),
        });
        std::iter::once(current).chain(previous)
    })
}

/// A cache of items that can drop entries by id, parent and path.
pub trait ItemCache: Send + Sync {
    /// Evict every entry, returning how many requests were processed.
    fn remove_items(&self, database: &str, entries: &mut dyn Iterator<Item = CacheClearEntry>) -> usize;
}

#[derive(Default)]
struct CacheState {
    items: HashMap<(String, Uuid), String>,
    children: HashMap<(String, Uuid), HashSet<Uuid>>,
    paths: HashMap<(String, String), Uuid>,
}

/// Process-local [`ItemCache`] keyed per database.
#[derive(Default)]
pub struct MemoryItemCache {
    state: Mutex<CacheState>,
}

impl MemoryItemCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache an item and register it in its parent's child listing.
    pub fn insert(&self, database: &str, item_id: Uuid, parent_id: Uuid, path: &str) {
        let mut state = self.lock();
        state
            .items
            .insert((database.to_string(), item_id), path.to_string());
        state
            .children
            .entry((database.to_string(), parent_id))
            .or_default()
            .insert(item_id);
        state
            .paths
            .insert((database.to_string(), path.to_lowercase()), item_id);
    }

    pub fn contains_item(&self, database: &str, item_id: Uuid) -> bool {
        self.lock().items.contains_key(&(database.to_string(), item_id))
    }

    pub fn has_children_listing(&self, database: &str, parent_id: Uuid) -> bool {
        self.lock()
            .children
            .contains_key(&(database.to_string(), parent_id))
    }

    pub fn contains_path(&self, database: &str, path: &str) -> bool {
        self.lock()
            .paths
            .contains_key(&(database.to_string(), path.to_lowercase()))
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ItemCache for MemoryItemCache {
    fn remove_items(&self, database: &str, entries: &mut dyn Iterator<Item = CacheClearEntry>) -> usize {
        let mut state = self.lock();
        let mut processed = 0;
        for entry in entries {
            // A moved item is cached under its old path.
            if let Some(cached_path) = state.items.remove(&(database.to_string(), entry.item_id)) {
                state
                    .paths
                    .remove(&(database.to_string(), cached_path.to_lowercase()));
            }
            state.children.remove(&(database.to_string(), entry.parent_id));
            state
                .paths
                .remove(&(database.to_string(), entry.item_path.to_lowercase()));
            processed += 1;
        }
        processed
    }
}

/// Clears changed items from an [`ItemCache`] when
/// `remove_items_from_caches` is set.
pub struct ChangeCacheClearer {
    cache: Arc<dyn ItemCache>,
}

impl ChangeCacheClearer {
    pub fn new(cache: Arc<dyn ItemCache>) -> Self {
        Self { cache }
    }
}

impl ChangeProcessor for ChangeCacheClearer {
    fn process(&self, ctx: &LoadContext, changes: &[ItemChange]) -> Result<(), LoadError> {
        if !ctx.options().remove_items_from_caches || changes.is_empty() {
            return Ok(());
        }
        let started = Instant::now();
        let removed = self
            .cache
            .remove_items(ctx.database(), &mut cache_clear_entries(changes));
        ctx.log().info(format!(
            "Caches cleared: {} entries ({}ms)",
            removed,
            started.elapsed().as_millis()
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoadOptions;
    use crate::item::ChangeKind;

    fn change(parent: Uuid, original: Uuid, path: &str) -> ItemChange {
        ItemChange {
            item_id: Uuid::new_v4(),
            parent_id: parent,
            original_parent_id: original,
            item_path: path.into(),
            path_depth: crate::item::path_depth(path),
            kind: ChangeKind::Updated,
        }
    }

    #[test]
    fn test_moved_item_yields_two_entries() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let changes = vec![change(a, a, "/x"), change(b, a, "/y/z")];

        let entries: Vec<_> = cache_clear_entries(&changes).collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].parent_id, b);
        assert_eq!(entries[2].parent_id, a);
        assert_eq!(entries[2].item_id, changes[1].item_id);

        // A second pass sees the same entries.
        assert_eq!(cache_clear_entries(&changes).count(), 3);
    }

    #[test]
    fn test_clearer_evicts_both_parent_listings() {
        let cache = Arc::new(MemoryItemCache::new());
        let (old_parent, new_parent) = (Uuid::new_v4(), Uuid::new_v4());
        let moved = change(new_parent, old_parent, "/a/b");
        cache.insert("master", moved.item_id, old_parent, "/old/b");
        cache.insert("master", Uuid::new_v4(), new_parent, "/a/c");

        let options = LoadOptions {
            remove_items_from_caches: true,
            ..LoadOptions::default()
        };
        let ctx = LoadContext::new("master", options);
        ChangeCacheClearer::new(cache.clone())
            .process(&ctx, std::slice::from_ref(&moved))
            .unwrap();

        assert!(!cache.contains_item("master", moved.item_id));
        assert!(!cache.has_children_listing("master", old_parent));
        assert!(!cache.has_children_listing("master", new_parent));
        assert!(!cache.contains_path("master", "/old/b"));
        assert!(cache.contains_path("master", "/a/c"));
    }

    #[test]
    fn test_clearer_respects_option() {
        let cache = Arc::new(MemoryItemCache::new());
        let parent = Uuid::new_v4();
        let c = change(parent, parent, "/a");
        cache.insert("master", c.item_id, parent, "/a");

        let ctx = LoadContext::new("master", LoadOptions::default());
        ChangeCacheClearer::new(cache.clone())
            .process(&ctx, std::slice::from_ref(&c))
            .unwrap();
        assert!(cache.contains_item("master", c.item_id));
        assert!(cache.contains_path("master", "/A"));
    }
}
