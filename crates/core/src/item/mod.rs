//! Content item model: items, their fields, load actions and change records.
//!
//! These are plain values. Nothing in this module touches the database; the
//! loader stages them and the processors read them.

pub mod change;
pub mod field;

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ModelError;

pub use change::{ChangeKind, ItemChange};
pub use field::{BlobSource, Field, FieldData, FieldGate, FieldKey, FieldScope};

// ---------------------------------------------------------------------------
// Load action
// ---------------------------------------------------------------------------

/// Per-item strategy controlling create / update / delete during commit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LoadAction {
    /// Mirror the subtree exactly, deleting target-only descendants.
    RevertTree,
    /// Mirror matched items but never delete unmatched target items.
    Revert,
    /// Ensure the item shell exists; never touch fields or existing items.
    AddItemOnly,
    /// Create item and fields only when the item does not exist yet.
    AddOnly,
}

impl LoadAction {
    /// Numeric code stored in the staging tables.
    pub fn code(&self) -> i64 {
        match self {
            Self::RevertTree => 0,
            Self::Revert => 1,
            Self::AddItemOnly => 2,
            Self::AddOnly => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::RevertTree),
            1 => Some(Self::Revert),
            2 => Some(Self::AddItemOnly),
            3 => Some(Self::AddOnly),
            _ => None,
        }
    }
}

impl std::fmt::Display for LoadAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RevertTree => write!(f, "revert_tree"),
            Self::Revert => write!(f, "revert"),
            Self::AddItemOnly => write!(f, "add_item_only"),
            Self::AddOnly => write!(f, "add_only"),
        }
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// A content node ready for staging.
///
/// An item exclusively owns its fields. Field keys are unique per variant;
/// [`Item::add_field`] rejects collisions.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: Uuid,
    pub template_id: Uuid,
    /// Branch template the item was created from, nil when none.
    pub branch_id: Uuid,
    /// Parent id, nil for a tree root.
    pub parent_id: Uuid,
    pub path: String,
    /// Locator of the serialized source, used in log messages.
    pub source_info: Option<String>,
    pub load_action: LoadAction,
    fields: Vec<Field>,
    keys: HashSet<FieldKey>,
}

impl Item {
    pub fn new(
        load_action: LoadAction,
        id: Uuid,
        template_id: Uuid,
        branch_id: Uuid,
        parent_id: Uuid,
        path: impl Into<String>,
    ) -> Self {
        Self {
            id,
            template_id,
            branch_id,
            parent_id,
            path: path.into(),
            source_info: None,
            load_action,
            fields: Vec::new(),
            keys: HashSet::new(),
        }
    }

    pub fn with_source_info(mut self, source_info: impl Into<String>) -> Self {
        self.source_info = Some(source_info.into());
        self
    }

    /// Last segment of the path.
    pub fn name(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    /// Number of segments in the path.
    pub fn depth(&self) -> u32 {
        path_depth(&self.path)
    }

    /// Add a field, rejecting a key that is already present.
    pub fn add_field(&mut self, field: Field) -> Result<(), ModelError> {
        let key = field.key();
        if !self.keys.insert(key.clone()) {
            return Err(ModelError::DuplicateField {
                item_id: self.id,
                key: key.to_string(),
            });
        }
        self.fields.push(field);
        Ok(())
    }

    /// Add a field unless its key already exists. Returns whether it was added.
    pub fn add_field_if_missing(&mut self, field: Field) -> bool {
        let key = field.key();
        if self.keys.contains(&key) {
            return false;
        }
        self.keys.insert(key);
        self.fields.push(field);
        true
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get_field(&self, key: &FieldKey) -> Option<&Field> {
        if !self.keys.contains(key) {
            return None;
        }
        self.fields.iter().find(|f| &f.key() == key)
    }

    /// Languages with at least one unversioned or versioned field.
    pub fn languages(&self) -> BTreeSet<&str> {
        self.fields.iter().filter_map(|f| f.language()).collect()
    }

    /// Version numbers present for `language`.
    pub fn versions(&self, language: &str) -> BTreeSet<u32> {
        self.fields
            .iter()
            .filter(|f| f.language() == Some(language))
            .filter_map(|f| f.version())
            .collect()
    }

    /// Copy this item under a new identity, deep-copying every field.
    pub fn copy_to(&self, id: Uuid, parent_id: Uuid, path: impl Into<String>) -> Item {
        Item {
            id,
            template_id: self.template_id,
            branch_id: self.branch_id,
            parent_id,
            path: path.into(),
            source_info: self.source_info.clone(),
            load_action: self.load_action,
            fields: self.fields.iter().map(Field::copy).collect(),
            keys: self.keys.clone(),
        }
    }
}

/// Number of non-empty segments in a slash separated path.
pub fn path_depth(path: &str) -> u32 {
    path.split('/').filter(|s| !s.is_empty()).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(path: &str) -> Item {
        Item::new(
            LoadAction::Revert,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::nil(),
            Uuid::new_v4(),
            path,
        )
    }

    #[test]
    fn test_name_and_depth() {
        let item = item("/sitecore/content/Home");
        assert_eq!(item.name(), "Home");
        assert_eq!(item.depth(), 3);
        assert_eq!(path_depth("/"), 0);
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let mut item = item("/a");
        let field_id = Uuid::new_v4();
        item.add_field(Field::versioned("en", 1, FieldData::new(field_id, "one")).unwrap())
            .unwrap();
        // Same id in a different version is a different key.
        item.add_field(Field::versioned("en", 2, FieldData::new(field_id, "two")).unwrap())
            .unwrap();

        let err = item
            .add_field(Field::versioned("en", 1, FieldData::new(field_id, "again")).unwrap())
            .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateField { .. }));
        assert_eq!(item.fields().len(), 2);
    }

    #[test]
    fn test_add_field_if_missing() {
        let mut item = item("/a");
        let field_id = Uuid::new_v4();
        assert!(item.add_field_if_missing(Field::shared(FieldData::new(field_id, "x"))));
        assert!(!item.add_field_if_missing(Field::shared(FieldData::new(field_id, "y"))));
        assert_eq!(item.fields()[0].value(), "x");
    }

    #[test]
    fn test_languages_and_versions() {
        let mut item = item("/a");
        let f = Uuid::new_v4();
        item.add_field(Field::unversioned("da", FieldData::new(f, "x")).unwrap()).unwrap();
        item.add_field(Field::versioned("en", 1, FieldData::new(f, "x")).unwrap()).unwrap();
        item.add_field(Field::versioned("en", 4, FieldData::new(f, "x")).unwrap()).unwrap();

        let languages: Vec<&str> = item.languages().into_iter().collect();
        assert_eq!(languages, vec!["da", "en"]);
        assert_eq!(item.versions("en").into_iter().collect::<Vec<_>>(), vec![1, 4]);
        assert!(item.versions("da").is_empty());
    }

    #[test]
    fn test_copy_to_is_independent() {
        let mut source = item("/templates/branch/$name");
        let f = Uuid::new_v4();
        source.add_field(Field::shared(FieldData::new(f, "template value"))).unwrap();

        let target_id = Uuid::new_v4();
        let copy = source.copy_to(target_id, Uuid::new_v4(), "/content/new");
        source
            .add_field(Field::shared(FieldData::new(Uuid::new_v4(), "later")))
            .unwrap();

        assert_eq!(copy.id, target_id);
        assert_eq!(copy.name(), "new");
        assert_eq!(copy.fields().len(), 1);
        assert_eq!(source.fields().len(), 2);
        assert_eq!(copy.fields()[0].value(), "template value");
    }

    #[test]
    fn test_load_action_codes_roundtrip() {
        for action in [
            LoadAction::RevertTree,
            LoadAction::Revert,
            LoadAction::AddItemOnly,
            LoadAction::AddOnly,
        ] {
            assert_eq!(LoadAction::from_code(action.code()), Some(action));
        }
        assert_eq!(LoadAction::from_code(9), None);
    }
}
