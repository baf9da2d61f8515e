//! Core types for reconciliation

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action::Action;

/// Lifecycle operation requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Lay the overlay into an unconfigured project
    Install,
    /// Bring an installed overlay up to the tool's version, healing drift
    Upgrade,
    /// Remove what the tool owns, keeping managed files and user content
    Uninstall,
    /// Like `Uninstall`, also removing managed files the user never changed
    UninstallFull,
}

impl Mode {
    pub fn is_uninstall(self) -> bool {
        matches!(self, Self::Uninstall | Self::UninstallFull)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Install => "install",
            Self::Upgrade => "upgrade",
            Self::Uninstall => "uninstall",
            Self::UninstallFull => "uninstall-full",
        };
        f.write_str(name)
    }
}

/// Options for [`crate::reconcile`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Plan only, never touch the filesystem
    pub dry_run: bool,
}

/// Outcome of one reconcile call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileResult {
    pub mode: Mode,
    pub actions: Vec<Action>,
    /// Whether the actions were executed
    pub applied: bool,
    pub packages_to_install: Vec<String>,
    pub packages_to_remove: Vec<String>,
}

impl ReconcileResult {
    /// Nothing to do on disk and no package changes
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
            && self.packages_to_install.is_empty()
            && self.packages_to_remove.is_empty()
    }

    /// Count of (creations, modifications, removals)
    pub fn summary(&self) -> (usize, usize, usize) {
        self.actions.iter().fold((0, 0, 0), |(c, m, r), a| {
            if a.is_creation() {
                (c + 1, m, r)
            } else if a.is_removal() {
                (c, m, r + 1)
            } else {
                (c, m + 1, r)
            }
        })
    }
}
