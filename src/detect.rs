//! Capability detection for a project directory

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Set when the project is a git checkout or worktree
pub const GIT: &str = "git";

/// Set when the overlay's package manifest exists
pub const PACKAGE_MANIFEST: &str = "package-manifest";

/// Detect capabilities of `root`.
///
/// `markers` maps extra capability names to a path that must exist for the
/// capability to be set.
pub fn capabilities(
    root: &Path,
    manifest: Option<&Path>,
    markers: &BTreeMap<String, PathBuf>,
) -> BTreeSet<String> {
    let mut found = BTreeSet::new();

    // .git is a directory in a checkout and a file in a worktree
    if root.join(".git").exists() {
        found.insert(GIT.to_string());
    }
    if manifest.is_some_and(|m| root.join(m).is_file()) {
        found.insert(PACKAGE_MANIFEST.to_string());
    }
    for (name, marker) in markers {
        if root.join(marker).exists() {
            found.insert(name.clone());
        }
    }

    log::debug!("Detected capabilities: {found:?}");
    found
}
