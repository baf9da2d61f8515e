//! Error types for the reconcile crate

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

/// Broad class of a failure, used by callers to pick an exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The requested mode does not fit the project's current state
    Precondition,
    /// The schema itself is inconsistent
    Schema,
    /// A content generator failed
    Render,
    /// Reading or writing the project failed
    Io,
    /// Apply failed and restoring the backup failed too
    Rollback,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Precondition => "precondition",
            Self::Schema => "schema",
            Self::Render => "render",
            Self::Io => "io",
            Self::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while planning or applying an overlay
#[derive(Error, Debug)]
pub enum Error {
    #[error("project is already configured (overlay version {stored})")]
    AlreadyConfigured { stored: String },

    #[error("project is not configured, nothing to upgrade or remove")]
    NotConfigured,

    #[error("refusing to downgrade overlay {stored} with tool version {tool}")]
    Downgrade { stored: String, tool: String },

    #[error("invalid version `{value}` in {}: {reason}", path.display())]
    InvalidVersion {
        path: PathBuf,
        value: String,
        reason: String,
    },

    #[error("invalid schema entry {}: {reason}", path.display())]
    InvalidSchema { path: PathBuf, reason: String },

    #[error("cannot render {}: {message}", path.display())]
    Render { path: PathBuf, message: String },

    #[error("cannot {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot merge into {}: {source}", path.display())]
    MalformedDocument {
        path: PathBuf,
        #[source]
        source: docmerge::Error,
    },

    #[error("cannot patch {}: {source}", path.display())]
    Patch {
        path: PathBuf,
        #[source]
        source: textpatch::Error,
    },

    #[error("{} is not valid UTF-8", path.display())]
    NotUtf8 { path: PathBuf },

    #[error(
        "{original} (rollback failed for {} path(s), backup kept at {})",
        failures.len(),
        backup.display()
    )]
    RollbackFailed {
        original: Box<Error>,
        failures: Vec<(PathBuf, std::io::Error)>,
        backup: PathBuf,
    },
}

impl Error {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn schema(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidSchema {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyConfigured { .. }
            | Self::NotConfigured
            | Self::Downgrade { .. }
            | Self::InvalidVersion { .. } => ErrorKind::Precondition,
            Self::InvalidSchema { .. } => ErrorKind::Schema,
            Self::Render { .. } => ErrorKind::Render,
            Self::Io { .. }
            | Self::MalformedDocument { .. }
            | Self::Patch { .. }
            | Self::NotUtf8 { .. } => ErrorKind::Io,
            Self::RollbackFailed { .. } => ErrorKind::Rollback,
        }
    }

    /// The path the failure is about, when there is one
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::AlreadyConfigured { .. } | Self::NotConfigured | Self::Downgrade { .. } => None,
            Self::InvalidVersion { path, .. }
            | Self::InvalidSchema { path, .. }
            | Self::Render { path, .. }
            | Self::Io { path, .. }
            | Self::MalformedDocument { path, .. }
            | Self::Patch { path, .. }
            | Self::NotUtf8 { path } => Some(path),
            Self::RollbackFailed { original, .. } => original.path(),
        }
    }
}

/// Result type for reconcile operations
pub type Result<T> = std::result::Result<T, Error>;
