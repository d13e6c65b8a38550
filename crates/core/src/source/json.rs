//! Directory of `*.json` serialized items.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use uuid::Uuid;

use super::{ItemSource, SerializedItem};
use crate::errors::SourceError;

/// Serialized items read from every `*.json` file below a directory.
///
/// Files are parsed once when the source is opened; children are served in
/// path order.
#[derive(Debug)]
pub struct JsonTreeSource {
    dir: PathBuf,
    items: HashMap<Uuid, SerializedItem>,
    children: HashMap<Uuid, Vec<Uuid>>,
    by_path: HashMap<String, Vec<Uuid>>,
}

impl JsonTreeSource {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, SourceError> {
        let dir = dir.as_ref().to_path_buf();
        let mut files = Vec::new();
        collect_json_files(&dir, &mut files)?;
        files.sort();

        let mut source = Self {
            dir,
            items: HashMap::new(),
            children: HashMap::new(),
            by_path: HashMap::new(),
        };
        for file in files {
            let item = read_item(&file)?;
            if source.items.contains_key(&item.id) {
                debug!(id = %item.id, file = %file.display(), "ignoring duplicate serialized item");
                continue;
            }
            source.insert(item);
        }

        let items = &source.items;
        for ids in source.children.values_mut() {
            ids.sort_by(|a, b| items[a].path.cmp(&items[b].path));
        }

        info!(dir = %source.dir.display(), items = source.items.len(), "serialized tree loaded");
        Ok(source)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn insert(&mut self, item: SerializedItem) {
        self.children.entry(item.parent_id).or_default().push(item.id);
        self.by_path
            .entry(item.path.to_lowercase())
            .or_default()
            .push(item.id);
        self.items.insert(item.id, item);
    }
}

impl ItemSource for JsonTreeSource {
    fn get_by_path(&self, path: &str) -> Result<Vec<SerializedItem>, SourceError> {
        let key = path.trim_end_matches('/').to_lowercase();
        Ok(self
            .by_path
            .get(&key)
            .into_iter()
            .flatten()
            .filter_map(|id| self.items.get(id).cloned())
            .collect())
    }

    fn get_children(&self, item: &SerializedItem) -> Result<Vec<SerializedItem>, SourceError> {
        Ok(self
            .children
            .get(&item.id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.items.get(id).cloned())
            .collect())
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), SourceError> {
    let io_err = |source: std::io::Error| SourceError::Io {
        path: dir.display().to_string(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let path = entry.path();
        // Symlinked directories are not followed; they can form cycles.
        if entry.file_type().map_err(io_err)?.is_dir() {
            collect_json_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "json") && path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

fn read_item(file: &Path) -> Result<SerializedItem, SourceError> {
    let text = fs::read_to_string(file).map_err(|source| SourceError::Io {
        path: file.display().to_string(),
        source,
    })?;
    let mut item: SerializedItem = serde_json::from_str(&text).map_err(|e| SourceError::Parse {
        path: file.display().to_string(),
        detail: e.to_string(),
    })?;
    item.source_info = Some(file.display().to_string());
    Ok(item)
}
