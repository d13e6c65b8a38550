//! Records of item mutations observed during a commit.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to an item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }

    pub fn from_str_val(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item's observed mutation after a commit.
///
/// `original_parent_id` differs from `parent_id` only when the item moved.
/// `path_depth` lets consumers process parents before children.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemChange {
    pub item_id: Uuid,
    pub parent_id: Uuid,
    pub original_parent_id: Uuid,
    pub item_path: String,
    pub path_depth: u32,
    pub kind: ChangeKind,
}

impl ItemChange {
    pub fn is_move(&self) -> bool {
        self.parent_id != self.original_parent_id
    }
}
