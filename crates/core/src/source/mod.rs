//! Serialized source trees and their conversion into loadable items.
//!
//! An [`ItemSource`] exposes serialized items by path and by parent. The
//! [`ItemExtractor`] walks each configured root breadth-first and the
//! [`ItemMapper`] turns every serialized item into an [`Item`].

pub mod json;

use std::collections::{HashSet, VecDeque};
use std::io::Cursor;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::action::resolve_action;
use crate::config::RootConfig;
use crate::errors::{BlobError, LoadError, ModelError, SourceError};
use crate::item::field::BlobReader;
use crate::item::{BlobSource, Field, FieldData, Item, LoadAction};
use crate::processors::{add_statistics_fields, ItemStream};

pub use json::JsonTreeSource;

// ---------------------------------------------------------------------------
// Serialized model
// ---------------------------------------------------------------------------

/// One item as stored in a source tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedItem {
    pub id: Uuid,
    #[serde(default)]
    pub parent_id: Uuid,
    pub template_id: Uuid,
    #[serde(default)]
    pub branch_id: Uuid,
    pub path: String,
    #[serde(default)]
    pub shared_fields: Vec<SerializedField>,
    #[serde(default)]
    pub languages: Vec<SerializedLanguage>,
    /// Where the item was read from. Filled in by the source.
    #[serde(skip)]
    pub source_info: Option<String>,
}

/// A field value. Binary values are base64 encoded in `value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedField {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub blob: bool,
    #[serde(default)]
    pub blob_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedLanguage {
    pub language: String,
    #[serde(default)]
    pub fields: Vec<SerializedField>,
    #[serde(default)]
    pub versions: Vec<SerializedVersion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedVersion {
    pub version: u32,
    #[serde(default)]
    pub fields: Vec<SerializedField>,
}

/// Read access to a tree of serialized items.
pub trait ItemSource {
    /// Items whose path equals `path`, compared case-insensitively.
    fn get_by_path(&self, path: &str) -> Result<Vec<SerializedItem>, SourceError>;

    /// Direct children of `item`.
    fn get_children(&self, item: &SerializedItem) -> Result<Vec<SerializedItem>, SourceError>;

    /// Human readable description used in log and error messages.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// Mapper
// ---------------------------------------------------------------------------

/// Converts serialized items into [`Item`]s.
///
/// Every version receives the statistics fields it does not carry already.
/// Binary values stay encoded until staging opens them.
#[derive(Debug, Clone)]
pub struct ItemMapper {
    user: String,
    now: DateTime<Utc>,
}

impl ItemMapper {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            now: Utc::now(),
        }
    }

    pub fn map(&self, data: &SerializedItem, action: LoadAction) -> Result<Item, ModelError> {
        let mut item = Item::new(
            action,
            data.id,
            data.template_id,
            data.branch_id,
            data.parent_id,
            data.path.clone(),
        );
        if let Some(info) = &data.source_info {
            item = item.with_source_info(info.clone());
        }

        for field in &data.shared_fields {
            item.add_field(Field::shared(field_data(field)))?;
        }
        for language in &data.languages {
            for field in &language.fields {
                item.add_field(Field::unversioned(language.language.clone(), field_data(field))?)?;
            }
            for version in &language.versions {
                for field in &version.fields {
                    item.add_field(Field::versioned(
                        language.language.clone(),
                        version.version,
                        field_data(field),
                    )?)?;
                }
                add_statistics_fields(
                    &mut item,
                    &language.language,
                    version.version,
                    &self.user,
                    self.now,
                    false,
                )?;
            }
        }
        Ok(item)
    }
}

fn field_data(field: &SerializedField) -> FieldData {
    let mut data = FieldData::new(field.id, "");
    if let Some(name) = &field.name {
        data = data.with_name(name.clone());
    }
    if field.blob {
        let encoded: Arc<str> = Arc::from(field.value.as_str());
        data = data.with_blob(BlobSource::new(move || {
            let bytes = STANDARD
                .decode(encoded.trim().as_bytes())
                .map_err(|e| BlobError::Decode(e.to_string()))?;
            Ok(Box::new(Cursor::new(bytes)) as BlobReader)
        }));
        data.value = field.blob_id.map(|id| id.to_string()).unwrap_or_default();
    } else {
        data.value = field.value.clone();
    }
    data
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// A configured root paired with the source that serves it.
pub struct SourceRoot<'a> {
    pub config: &'a RootConfig,
    pub source: Box<dyn ItemSource + 'a>,
}

/// Streams the items under every configured root.
///
/// Roots are walked in order, each breadth-first from the root item. Excluded
/// paths are pruned with their subtrees, and an id already produced by an
/// earlier root is skipped.
#[derive(Debug, Clone)]
pub struct ItemExtractor {
    mapper: ItemMapper,
}

impl ItemExtractor {
    pub fn new(mapper: ItemMapper) -> Self {
        Self { mapper }
    }

    pub fn extract<'a>(&'a self, roots: &'a [SourceRoot<'a>]) -> ItemStream<'a> {
        let mut seen = HashSet::new();
        let stream = roots
            .iter()
            .flat_map(move |root| {
                let action = resolve_action(root.config.strategy, !root.config.exclusions.is_empty());
                debug!(root = %root.config.name, path = %root.config.path, %action, "extracting root");
                BreadthFirst::new(root).map(move |item| item.map(|item| (item, action)))
            })
            .filter_map(move |entry| match entry {
                Ok((item, action)) => {
                    if seen.insert(item.id) {
                        Some(self.mapper.map(&item, action).map_err(|e| {
                            LoadError::Source(SourceError::Mapping {
                                path: item.path.clone(),
                                detail: e.to_string(),
                            })
                        }))
                    } else {
                        debug!(id = %item.id, path = %item.path, "skipping duplicate item");
                        None
                    }
                }
                Err(e) => Some(Err(LoadError::Source(e))),
            });
        Box::new(stream)
    }
}

/// Breadth-first walk of one root. An error ends the walk after it is
/// yielded.
struct BreadthFirst<'r, 'a> {
    root: &'r SourceRoot<'a>,
    queue: VecDeque<SerializedItem>,
    started: bool,
    done: bool,
}

impl<'r, 'a> BreadthFirst<'r, 'a> {
    fn new(root: &'r SourceRoot<'a>) -> Self {
        Self {
            root,
            queue: VecDeque::new(),
            started: false,
            done: false,
        }
    }

    fn seed(&mut self) -> Result<(), SourceError> {
        let path = &self.root.config.path;
        let found = self.root.source.get_by_path(path)?;
        if found.is_empty() {
            return Err(SourceError::RootNotFound {
                path: path.clone(),
                source_dir: self.root.source.describe(),
            });
        }
        self.queue.extend(found);
        Ok(())
    }
}

impl Iterator for BreadthFirst<'_, '_> {
    type Item = Result<SerializedItem, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            if let Err(e) = self.seed() {
                self.done = true;
                return Some(Err(e));
            }
        }

        let item = self.queue.pop_front()?;
        match self.root.source.get_children(&item) {
            Ok(children) => {
                let config = self.root.config;
                self.queue
                    .extend(children.into_iter().filter(|c| !config.is_excluded(&c.path)));
                Some(Ok(item))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
