//! Actions produced by the planner and executed by the applier

use std::fmt;
use std::path::{Path, PathBuf};

use docmerge::{Format, Target};
use serde::Serialize;
use serde_json::Value;
use textpatch::Patch;

/// Why a file is being written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteReason {
    /// The path does not exist yet
    Create,
    /// The path exists with different content or permissions
    Replace,
}

/// A single filesystem mutation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    CreateDir {
        path: PathBuf,
    },
    WriteFile {
        path: PathBuf,
        contents: String,
        executable: bool,
        reason: WriteReason,
    },
    /// Remove a path; for directories, entries listed in `keep` survive
    DeletePath {
        path: PathBuf,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        keep: Vec<PathBuf>,
    },
    MergeDocument {
        path: PathBuf,
        format: Format,
        target: Target,
        fragment: Value,
    },
    UnmergeDocument {
        path: PathBuf,
        format: Format,
        target: Target,
    },
    PatchText {
        path: PathBuf,
        patch: Patch,
    },
    UnpatchText {
        path: PathBuf,
        patch: Patch,
    },
}

impl Action {
    pub fn path(&self) -> &Path {
        match self {
            Self::CreateDir { path }
            | Self::WriteFile { path, .. }
            | Self::DeletePath { path, .. }
            | Self::MergeDocument { path, .. }
            | Self::UnmergeDocument { path, .. }
            | Self::PatchText { path, .. }
            | Self::UnpatchText { path, .. } => path,
        }
    }

    /// Short verb naming the kind of mutation
    pub fn verb(&self) -> &'static str {
        match self {
            Self::CreateDir { .. } => "mkdir",
            Self::WriteFile {
                reason: WriteReason::Create,
                ..
            } => "create",
            Self::WriteFile {
                reason: WriteReason::Replace,
                ..
            } => "update",
            Self::DeletePath { .. } => "delete",
            Self::MergeDocument { .. } => "merge",
            Self::UnmergeDocument { .. } => "unmerge",
            Self::PatchText { .. } => "patch",
            Self::UnpatchText { .. } => "unpatch",
        }
    }

    /// Whether the action takes something away from the project
    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            Self::DeletePath { .. } | Self::UnmergeDocument { .. } | Self::UnpatchText { .. }
        )
    }

    pub fn is_creation(&self) -> bool {
        matches!(
            self,
            Self::CreateDir { .. }
                | Self::WriteFile {
                    reason: WriteReason::Create,
                    ..
                }
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb(), self.path().display())?;
        match self {
            Self::MergeDocument { target, .. } | Self::UnmergeDocument { target, .. } => {
                write!(f, " [{}]", target.display_key())
            }
            Self::DeletePath { keep, .. } if !keep.is_empty() => {
                write!(f, " (keeping {})", keep.len())
            }
            _ => Ok(()),
        }
    }
}
