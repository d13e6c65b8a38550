//! End-to-end tests for the bulk loader.
//!
//! These tests drive the real `BulkLoader` with the standard pipeline against
//! in-memory SQLite databases: staging, validation, the set-based diff, the
//! in-transaction synchronizers, and post-commit reactors.

use std::sync::{Arc, Mutex};

use uuid::Uuid;

use treesync_core::config::LoadOptions;
use treesync_core::context::{LoadContext, LoadStage, LogLevel};
use treesync_core::db::queries::{StoredField, StoredItem};
use treesync_core::db::{Database, TxHandle};
use treesync_core::errors::{BlobError, LoadError};
use treesync_core::item::field::well_known;
use treesync_core::item::{
    BlobSource, ChangeKind, Field, FieldData, FieldGate, FieldKey, FieldScope, Item, ItemChange,
    LoadAction,
};
use treesync_core::loader::{BulkLoader, LoadSummary};
use treesync_core::processors::{
    cache_clear_entries, ChangeCacheClearer, ChangeProcessor, MemoryItemCache, Pipeline,
    SyncInTransaction,
};

// ===========================================================================
// Helpers
// ===========================================================================

const TEMPLATE: Uuid = Uuid::from_u128(0x100);
const OTHER_TEMPLATE: Uuid = Uuid::from_u128(0x101);
const TITLE: Uuid = Uuid::from_u128(0x200);
const STAMP: Uuid = Uuid::from_u128(0x201);
const SUMMARY: Uuid = Uuid::from_u128(0x202);
const IMAGE: Uuid = Uuid::from_u128(0x300);

fn id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

fn setup_db() -> Database {
    let db = Database::in_memory().unwrap();
    db.initialize().unwrap();
    db
}

fn options() -> LoadOptions {
    LoadOptions {
        update_history: true,
        update_publish_queue: true,
        ..LoadOptions::default()
    }
}

fn item(action: LoadAction, n: u128, parent: Uuid, path: &str) -> Item {
    Item::new(action, id(n), TEMPLATE, Uuid::nil(), parent, path)
}

fn titled(action: LoadAction, n: u128, parent: Uuid, path: &str, title: &str) -> Item {
    let mut item = item(action, n, parent, path);
    item.add_field(Field::shared(FieldData::new(TITLE, title).with_name("Title")))
        .unwrap();
    item
}

fn shared_key(field_id: Uuid) -> FieldKey {
    FieldKey {
        scope: FieldScope::Shared,
        field_id,
        language: String::new(),
        version: 0,
    }
}

/// `/site` with children `a` and `b`, and `leaf` below `a`.
fn site_tree(action: LoadAction) -> Vec<Item> {
    vec![
        titled(action, 1, Uuid::nil(), "/site", "Site"),
        titled(action, 2, id(1), "/site/a", "A"),
        titled(action, 3, id(1), "/site/b", "B"),
        titled(action, 4, id(2), "/site/a/leaf", "Leaf"),
    ]
}

fn load(
    loader: &BulkLoader,
    db: &Database,
    ctx: &mut LoadContext,
    items: Vec<Item>,
) -> Result<LoadSummary, LoadError> {
    loader.load_items(db, ctx, items.into_iter().map(Ok))
}

fn load_fresh(
    loader: &BulkLoader,
    db: &Database,
    opts: LoadOptions,
    items: Vec<Item>,
) -> LoadSummary {
    let mut ctx = LoadContext::new("master", opts);
    load(loader, db, &mut ctx, items).unwrap()
}

fn snapshot(db: &Database, ids: &[u128]) -> Vec<(Option<StoredItem>, Vec<StoredField>)> {
    ids.iter()
        .map(|n| {
            (
                db.get_item(id(*n)).unwrap(),
                db.list_fields(id(*n)).unwrap(),
            )
        })
        .collect()
}

fn change_ids(changes: &[ItemChange]) -> Vec<Uuid> {
    changes.iter().map(|c| c.item_id).collect()
}

/// Synchronizer that always fails, to exercise rollback.
struct FailingSync;

impl SyncInTransaction for FailingSync {
    fn process(&self, _ctx: &LoadContext, _tx: &TxHandle<'_>) -> Result<(), LoadError> {
        Err(LoadError::ValidationFailed("synthetic failure".into()))
    }
}

/// Change processor recording every change set it sees.
#[derive(Clone, Default)]
struct Recorder {
    seen: Arc<Mutex<Vec<ItemChange>>>,
}

impl ChangeProcessor for Recorder {
    fn process(&self, _ctx: &LoadContext, changes: &[ItemChange]) -> Result<(), LoadError> {
        self.seen.lock().unwrap().extend_from_slice(changes);
        Ok(())
    }
}

// ===========================================================================
// Field gates and load actions
// ===========================================================================

#[test]
fn test_create_only_field_written_once() {
    let db = setup_db();
    let loader = BulkLoader::default();

    let with_stamp = |title: &str, stamp: &str| {
        let mut item = titled(LoadAction::Revert, 1, Uuid::nil(), "/site", title);
        item.add_field(Field::shared(
            FieldData::new(STAMP, stamp).with_gate(FieldGate::ON_CREATE),
        ))
        .unwrap();
        item
    };

    let first = load_fresh(&loader, &db, options(), vec![with_stamp("Home", "first")]);
    assert_eq!(first.merged.created, 1);
    assert_eq!(
        db.field_value(id(1), &shared_key(STAMP)).unwrap().as_deref(),
        Some("first")
    );

    let second = load_fresh(&loader, &db, options(), vec![with_stamp("Home 2", "second")]);
    assert_eq!(second.merged.updated, 1);
    assert_eq!(
        db.field_value(id(1), &shared_key(TITLE)).unwrap().as_deref(),
        Some("Home 2")
    );
    assert_eq!(
        db.field_value(id(1), &shared_key(STAMP)).unwrap().as_deref(),
        Some("first")
    );
}

#[test]
fn test_add_only_leaves_existing_item_alone() {
    let db = setup_db();
    let loader = BulkLoader::default();
    load_fresh(&loader, &db, options(), site_tree(LoadAction::Revert));
    let before = snapshot(&db, &[1, 2, 3, 4]);

    let mut changed = site_tree(LoadAction::AddOnly);
    changed[1] = titled(LoadAction::AddOnly, 2, id(1), "/site/a", "Rewritten");
    let summary = load_fresh(&loader, &db, options(), changed);

    assert!(summary.changes.is_empty());
    assert_eq!(summary.merged.skipped, 4);
    assert_eq!(summary.merged.field_writes, 0);
    assert_eq!(snapshot(&db, &[1, 2, 3, 4]), before);
}

#[test]
fn test_add_item_only_creates_bare_shell() {
    let db = setup_db();
    let loader = BulkLoader::default();

    let summary = load_fresh(
        &loader,
        &db,
        options(),
        vec![titled(LoadAction::AddItemOnly, 1, Uuid::nil(), "/shell", "Ignored")],
    );

    assert_eq!(summary.merged.created, 1);
    assert_eq!(summary.merged.field_writes, 0);
    assert_eq!(db.get_item(id(1)).unwrap().unwrap().name, "shell");
    assert!(db.list_fields(id(1)).unwrap().is_empty());
}

#[test]
fn test_revert_tree_deletes_target_only_descendants() {
    let db = setup_db();
    let loader = BulkLoader::default();
    load_fresh(&loader, &db, options(), site_tree(LoadAction::RevertTree));
    assert_eq!(db.count_items().unwrap(), 4);

    // Plain revert never deletes.
    let revert = load_fresh(
        &loader,
        &db,
        options(),
        vec![titled(LoadAction::Revert, 1, Uuid::nil(), "/site", "Site")],
    );
    assert!(revert.changes.is_empty());
    assert_eq!(db.count_items().unwrap(), 4);

    let tree = load_fresh(
        &loader,
        &db,
        options(),
        vec![
            titled(LoadAction::RevertTree, 1, Uuid::nil(), "/site", "Site"),
            titled(LoadAction::RevertTree, 3, id(1), "/site/b", "B"),
        ],
    );

    assert_eq!(tree.merged.deleted, 2);
    assert_eq!(change_ids(&tree.changes), vec![id(2), id(4)]);
    assert!(tree.changes.iter().all(|c| c.kind == ChangeKind::Deleted));
    assert_eq!(tree.changes[0].item_path, "/site/a");
    assert_eq!(tree.changes[1].item_path, "/site/a/leaf");
    assert_eq!(tree.changes[1].path_depth, 3);

    assert!(db.get_item(id(2)).unwrap().is_none());
    assert!(db.get_item(id(4)).unwrap().is_none());
    assert!(db.list_fields(id(4)).unwrap().is_empty());
    assert_eq!(db.count_items().unwrap(), 2);
}

// ===========================================================================
// Change set ordering and post-commit reactors
// ===========================================================================

#[test]
fn test_changes_ordered_by_depth_and_moves_clear_both_parents() {
    let db = setup_db();
    let cache = Arc::new(MemoryItemCache::new());
    let recorder = Recorder::default();
    let loader = BulkLoader::new(
        Pipeline::standard()
            .with_change_processor(ChangeCacheClearer::new(cache.clone()))
            .with_change_processor(recorder.clone()),
    );
    load_fresh(&loader, &db, options(), site_tree(LoadAction::Revert));
    recorder.seen.lock().unwrap().clear();

    cache.insert("master", id(4), id(2), "/site/a/leaf");
    cache.insert("master", id(7), id(3), "/site/b/other");

    let mut items = vec![
        titled(LoadAction::Revert, 1, Uuid::nil(), "/site", "Site"),
        titled(LoadAction::Revert, 2, id(1), "/site/a", "A"),
        titled(LoadAction::Revert, 3, id(1), "/site/b", "B"),
        titled(LoadAction::Revert, 4, id(3), "/site/b/leaf", "Leaf"),
    ];
    // Deepest first in the source order; the change set must not care.
    items.insert(0, titled(LoadAction::Revert, 5, id(4), "/site/b/leaf/deep", "Deep"));
    items.push(titled(LoadAction::Revert, 6, id(1), "/site/c", "C"));

    let opts = LoadOptions {
        remove_items_from_caches: true,
        ..options()
    };
    let summary = load_fresh(&loader, &db, opts, items);

    assert_eq!(change_ids(&summary.changes), vec![id(6), id(4), id(5)]);
    let depths: Vec<u32> = summary.changes.iter().map(|c| c.path_depth).collect();
    assert_eq!(depths, vec![2, 3, 4]);

    let moved = &summary.changes[1];
    assert_eq!(moved.kind, ChangeKind::Updated);
    assert!(moved.is_move());
    assert_eq!(moved.original_parent_id, id(2));
    assert_eq!(moved.parent_id, id(3));
    assert_eq!(
        db.item_path(id(5)).unwrap().as_deref(),
        Some("/site/b/leaf/deep")
    );

    // One extra cache entry for the moved item's former parent.
    assert_eq!(cache_clear_entries(&summary.changes).count(), 4);
    assert!(!cache.contains_item("master", id(4)));
    assert!(!cache.has_children_listing("master", id(2)));
    assert!(!cache.has_children_listing("master", id(3)));
    assert!(cache.contains_item("master", id(7)));
    assert!(!cache.contains_path("master", "/site/a/leaf"));
    assert!(cache.contains_path("master", "/site/b/other"));

    assert_eq!(*recorder.seen.lock().unwrap(), summary.changes);
}

#[test]
fn test_identical_second_run_is_quiet() {
    let db = setup_db();
    let loader = BulkLoader::default();

    let tree = || {
        let mut items = site_tree(LoadAction::RevertTree);
        for item in &mut items {
            let about = format!("About {}", item.name());
            item.add_field(Field::unversioned("en", FieldData::new(SUMMARY, about)).unwrap())
                .unwrap();
        }
        items
    };

    let first = load_fresh(&loader, &db, options(), tree());
    assert_eq!(first.merged.created, 4);
    let fields_after_first = db.count_fields().unwrap();
    let history_after_first = db.count_history().unwrap();
    let before = snapshot(&db, &[1, 2, 3, 4]);

    let second = load_fresh(&loader, &db, options(), tree());
    assert!(second.changes.is_empty());
    assert_eq!(second.merged.field_writes, 0);
    assert_eq!(second.merged.fields_removed, 0);
    assert_eq!(db.count_fields().unwrap(), fields_after_first);
    assert_eq!(db.count_history().unwrap(), history_after_first);
    assert_eq!(snapshot(&db, &[1, 2, 3, 4]), before);
}

// ===========================================================================
// Failure handling
// ===========================================================================

#[test]
fn test_rejected_validation_leaves_store_untouched() {
    let db = setup_db();
    let loader = BulkLoader::default();
    load_fresh(&loader, &db, options(), site_tree(LoadAction::Revert));
    let before = snapshot(&db, &[1, 2, 3, 4]);

    let mut items = site_tree(LoadAction::Revert);
    items[1] = Item::new(LoadAction::Revert, id(2), OTHER_TEMPLATE, Uuid::nil(), id(1), "/site/a");
    items[3] = titled(LoadAction::Revert, 4, id(2), "/site/a/leaf", "Leaf changed");
    items.push(titled(LoadAction::Revert, 9, id(999), "/orphan", "Orphan"));

    let opts = LoadOptions {
        allow_template_changes: false,
        ..options()
    };
    let mut ctx = LoadContext::new("master", opts);
    let err = load(&loader, &db, &mut ctx, items).unwrap_err();

    match &err {
        LoadError::ValidationFailed(message) => {
            assert!(message.contains("ValidateParentsExist"), "{message}");
            assert!(message.contains("ValidateTemplateChanges"), "{message}");
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
    assert!(ctx.is_failed());
    assert_eq!(ctx.stage(), LoadStage::Failed);
    assert!(ctx.item_changes().is_empty());
    assert!(ctx.log().count(LogLevel::Error) >= 2);
    assert_eq!(snapshot(&db, &[1, 2, 3, 4]), before);
    assert!(db.get_item(id(9)).unwrap().is_none());

    // A failed context refuses further work.
    let again = load(&loader, &db, &mut ctx, site_tree(LoadAction::Revert));
    assert!(matches!(again, Err(LoadError::AlreadyFailed(_))));
}

#[test]
fn test_duplicate_items_rejected() {
    let db = setup_db();
    let loader = BulkLoader::default();

    let items = vec![
        titled(LoadAction::Revert, 1, Uuid::nil(), "/site", "Site"),
        titled(LoadAction::Revert, 2, id(1), "/site/a", "A"),
        titled(LoadAction::Revert, 2, id(1), "/site/a-copy", "A again"),
    ];
    let mut ctx = LoadContext::new("master", options());
    let err = load(&loader, &db, &mut ctx, items).unwrap_err();

    match &err {
        LoadError::ValidationFailed(message) => {
            assert!(message.contains("ValidateNoDuplicates"), "{message}")
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
    let logged: Vec<String> = ctx
        .log()
        .entries()
        .into_iter()
        .filter(|e| e.level == LogLevel::Error)
        .map(|e| e.message)
        .collect();
    let item_id = id(2).to_string();
    assert!(logged
        .iter()
        .any(|m| m.starts_with("Duplicate item id") && m.contains(&item_id)));
    assert!(logged
        .iter()
        .any(|m| m.starts_with("Duplicate shared field") && m.contains(&item_id)));
    assert_eq!(db.count_items().unwrap(), 0);
}

#[test]
fn test_revert_tree_cannot_delete_parent_of_staged_item() {
    let db = setup_db();
    let loader = BulkLoader::default();
    load_fresh(&loader, &db, options(), site_tree(LoadAction::RevertTree));
    let before = snapshot(&db, &[1, 2, 3, 4]);

    // `/site/a` is missing from the source, but its child `leaf` is staged.
    let items = vec![
        titled(LoadAction::RevertTree, 1, Uuid::nil(), "/site", "Site"),
        titled(LoadAction::RevertTree, 3, id(1), "/site/b", "B"),
        titled(LoadAction::RevertTree, 4, id(2), "/site/a/leaf", "Leaf"),
    ];
    let mut ctx = LoadContext::new("master", options());
    let err = load(&loader, &db, &mut ctx, items).unwrap_err();

    match &err {
        LoadError::ValidationFailed(message) => {
            assert!(message.contains("ValidateParentsExist"), "{message}")
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
    assert!(ctx
        .log()
        .entries()
        .iter()
        .any(|e| e.level == LogLevel::Error && e.message.contains("would be deleted")));
    assert_eq!(snapshot(&db, &[1, 2, 3, 4]), before);
}

#[test]
fn test_synchronizer_failure_rolls_back_commit() {
    let db = setup_db();
    let recorder = Recorder::default();
    let loader = BulkLoader::new(
        Pipeline::standard()
            .with_synchronizer(FailingSync)
            .with_change_processor(recorder.clone()),
    );

    let mut ctx = LoadContext::new("master", options());
    let err = load(&loader, &db, &mut ctx, site_tree(LoadAction::Revert)).unwrap_err();

    match err {
        LoadError::Processor { processor, .. } => assert_eq!(processor, "FailingSync"),
        other => panic!("expected processor failure, got {other:?}"),
    }
    assert!(ctx.is_failed());
    assert!(ctx.item_changes().is_empty());
    assert_eq!(db.count_items().unwrap(), 0);
    assert_eq!(db.count_fields().unwrap(), 0);
    // History was written before the failing synchronizer and rolled back with it.
    assert_eq!(db.count_history().unwrap(), 0);
    assert!(recorder.seen.lock().unwrap().is_empty());
}

#[test]
fn test_unreadable_blob_is_logged_and_run_continues() {
    let db = setup_db();
    let loader = BulkLoader::default();

    let mut broken = item(LoadAction::Revert, 1, Uuid::nil(), "/media/broken")
        .with_source_info("media/broken.json");
    broken
        .add_field(Field::shared(FieldData::new(IMAGE, "").with_blob(BlobSource::new(|| {
            Err(BlobError::Decode("truncated payload".into()))
        }))))
        .unwrap();
    let mut good = item(LoadAction::Revert, 2, Uuid::nil(), "/media/good");
    good.add_field(Field::shared(
        FieldData::new(IMAGE, "").with_blob(BlobSource::from_bytes(vec![1u8, 2, 3])),
    ))
    .unwrap();

    let mut ctx = LoadContext::new("master", options());
    let summary = load(&loader, &db, &mut ctx, vec![broken, good]).unwrap();

    assert!(!ctx.is_failed());
    assert_eq!(summary.staged.blob_errors, 1);
    assert_eq!(summary.merged.created, 2);
    let logged = ctx
        .log()
        .entries()
        .into_iter()
        .filter(|e| e.level == LogLevel::Error)
        .map(|e| e.message)
        .collect::<Vec<_>>();
    assert_eq!(logged.len(), 1);
    assert!(logged[0].contains("media/broken.json"), "{}", logged[0]);

    let broken_id = db.field_value(id(1), &shared_key(IMAGE)).unwrap().unwrap();
    let broken_id = Uuid::parse_str(&broken_id).unwrap();
    assert_eq!(db.get_blob(broken_id).unwrap(), Some(Vec::new()));

    let good_id = db.field_value(id(2), &shared_key(IMAGE)).unwrap().unwrap();
    let good_id = Uuid::parse_str(&good_id).unwrap();
    assert_eq!(db.get_blob(good_id).unwrap(), Some(vec![1, 2, 3]));
}

// ===========================================================================
// Options
// ===========================================================================

#[test]
fn test_stage_only_writes_nothing() {
    let db = setup_db();
    let loader = BulkLoader::default();
    let opts = LoadOptions {
        stage_data_without_write: true,
        ..options()
    };

    let mut ctx = LoadContext::new("master", opts);
    let summary = load(&loader, &db, &mut ctx, site_tree(LoadAction::RevertTree)).unwrap();

    assert!(summary.stage_only);
    assert_eq!(summary.staged.items, 4);
    assert_eq!(summary.staged.fields, 4);
    assert!(summary.changes.is_empty());
    assert_eq!(ctx.stage(), LoadStage::Done);
    assert_eq!(db.count_items().unwrap(), 0);
    assert_eq!(db.count_history().unwrap(), 0);
}

#[test]
fn test_blob_ids_reused_from_store() {
    let db = setup_db();
    let loader = BulkLoader::default();
    let image = |payload: &[u8]| {
        let mut item = item(LoadAction::Revert, 1, Uuid::nil(), "/media/logo");
        item.add_field(Field::shared(
            FieldData::new(IMAGE, "").with_blob(BlobSource::from_bytes(payload.to_vec())),
        ))
        .unwrap();
        item
    };

    load_fresh(&loader, &db, options(), vec![image(b"first")]);
    let stored = db.field_value(id(1), &shared_key(IMAGE)).unwrap().unwrap();

    let second = load_fresh(&loader, &db, options(), vec![image(b"second")]);
    assert_eq!(second.staged.blob_ids_reused, 1);
    assert_eq!(second.merged.updated, 1);
    let reused = db.field_value(id(1), &shared_key(IMAGE)).unwrap().unwrap();
    assert_eq!(reused, stored);
    assert_eq!(
        db.get_blob(Uuid::parse_str(&reused).unwrap()).unwrap(),
        Some(b"second".to_vec())
    );

    let no_lookup = LoadOptions {
        lookup_blob_ids: false,
        ..options()
    };
    let third = load_fresh(&loader, &db, no_lookup, vec![image(b"second")]);
    assert_eq!(third.staged.blob_ids_reused, 0);
    let fresh = db.field_value(id(1), &shared_key(IMAGE)).unwrap().unwrap();
    assert_ne!(fresh, stored);
}

#[test]
fn test_history_and_publish_queue_rows() {
    let db = setup_db();
    let loader = BulkLoader::default();

    let mut ctx = LoadContext::new("master", options()).with_user("sync-bot");
    load(&loader, &db, &mut ctx, site_tree(LoadAction::RevertTree)).unwrap();

    let history = db.list_history(10).unwrap();
    assert_eq!(history.len(), 4);
    assert!(history.iter().all(|h| h.action == ChangeKind::Created));
    assert!(history.iter().all(|h| h.user_name == "sync-bot"));
    assert!(history[0].id > history[3].id);

    let queue = db.list_publish_queue(10).unwrap();
    assert_eq!(queue.len(), 4);
    let depths: Vec<u32> = queue.iter().map(|q| q.path_depth).collect();
    assert_eq!(depths, vec![1, 2, 2, 3]);
    assert_eq!(queue[0].item_id, id(1).to_string());

    // Nothing is recorded when the options are off.
    let quiet = LoadOptions {
        update_history: false,
        update_publish_queue: false,
        ..options()
    };
    load_fresh(
        &loader,
        &db,
        quiet,
        vec![titled(LoadAction::RevertTree, 1, Uuid::nil(), "/site", "Renamed")],
    );
    assert_eq!(db.count_history().unwrap(), 4);
    assert_eq!(db.list_publish_queue(10).unwrap().len(), 4);
    assert_eq!(db.count_items().unwrap(), 1);

    let mut ctx = LoadContext::new("master", options());
    load(
        &loader,
        &db,
        &mut ctx,
        vec![
            titled(LoadAction::RevertTree, 1, Uuid::nil(), "/site", "Renamed"),
            titled(LoadAction::RevertTree, 8, id(1), "/site/new", "New"),
        ],
    )
    .unwrap();
    let latest = db.list_history(1).unwrap();
    assert_eq!(latest[0].action, ChangeKind::Created);
    assert_eq!(latest[0].item_path, "/site/new");
}

#[test]
fn test_forced_resync_rewrites_update_stamps_only() {
    let db = setup_db();
    let loader = BulkLoader::default();
    let localized = || {
        let mut item = titled(LoadAction::Revert, 1, Uuid::nil(), "/site", "Site");
        item.add_field(Field::unversioned("en", FieldData::new(SUMMARY, "About")).unwrap())
            .unwrap();
        item
    };
    let stamp = |field_id: Uuid| FieldKey {
        scope: FieldScope::Versioned,
        field_id,
        language: "en".into(),
        version: 1,
    };

    let mut ctx = LoadContext::new("master", options()).with_user("first-user");
    let first = load(&loader, &db, &mut ctx, vec![localized()]).unwrap();
    assert_eq!(first.merged.created, 1);
    let revision = db.field_value(id(1), &stamp(well_known::REVISION)).unwrap();

    // Unchanged content without force is a no-op.
    let mut ctx = LoadContext::new("master", options()).with_user("second-user");
    let quiet = load(&loader, &db, &mut ctx, vec![localized()]).unwrap();
    assert!(quiet.changes.is_empty());

    let forced = LoadOptions {
        force_update_all_fields: true,
        ..options()
    };
    let mut ctx = LoadContext::new("master", forced).with_user("second-user");
    let summary = load(&loader, &db, &mut ctx, vec![localized()]).unwrap();

    assert_eq!(summary.merged.updated, 1);
    assert_eq!(summary.changes[0].kind, ChangeKind::Updated);
    assert_eq!(
        db.field_value(id(1), &stamp(well_known::UPDATED_BY)).unwrap().as_deref(),
        Some("second-user")
    );
    assert_eq!(
        db.field_value(id(1), &stamp(well_known::CREATED_BY)).unwrap().as_deref(),
        Some("first-user")
    );
    assert_ne!(db.field_value(id(1), &stamp(well_known::REVISION)).unwrap(), revision);
}
