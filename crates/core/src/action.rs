//! Maps a tree root's synchronization strategy onto a [`LoadAction`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ActionError;
use crate::item::LoadAction;

/// How a configured tree root is synchronized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub enum SyncStrategy {
    /// The source is the master copy; the target mirrors it.
    MirrorExact,
    /// Only create missing item shells.
    AddNewItemsOnly,
    /// Create missing items with their fields, never overwrite.
    NeverOverwrite,
}

impl SyncStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MirrorExact => "mirror-exact",
            Self::AddNewItemsOnly => "add-new-items-only",
            Self::NeverOverwrite => "never-overwrite",
        }
    }
}

impl FromStr for SyncStrategy {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "mirror-exact" => Ok(Self::MirrorExact),
            "add-new-items-only" | "shell-only" => Ok(Self::AddNewItemsOnly),
            "never-overwrite" => Ok(Self::NeverOverwrite),
            other => Err(ActionError::UnsupportedStrategy(other.to_string())),
        }
    }
}

impl TryFrom<String> for SyncStrategy {
    type Error = ActionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SyncStrategy> for String {
    fn from(value: SyncStrategy) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve the load action for a tree root.
///
/// A mirrored root only reverts the whole tree (deleting target-only items)
/// when it declares no exclusions.
pub fn resolve_action(strategy: SyncStrategy, has_exclusions: bool) -> LoadAction {
    match strategy {
        SyncStrategy::MirrorExact if has_exclusions => LoadAction::Revert,
        SyncStrategy::MirrorExact => LoadAction::RevertTree,
        SyncStrategy::AddNewItemsOnly => LoadAction::AddItemOnly,
        SyncStrategy::NeverOverwrite => LoadAction::AddOnly,
    }
}

/// Parse a strategy name and resolve it in one step.
pub fn resolve_action_by_name(strategy: &str, has_exclusions: bool) -> Result<LoadAction, ActionError> {
    Ok(resolve_action(strategy.parse()?, has_exclusions))
}
