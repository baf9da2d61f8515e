//! Per-run backup of everything an action list is about to touch
//!
//! The backup is taken before the first mutation and lives in a sibling
//! directory of the overlay, `<root>/<prefix>-<timestamp>-<pid>`. Paths that
//! did not exist are recorded as absent, using their topmost missing
//! ancestor, so restoring also removes directories the run created.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};

#[derive(Debug)]
enum Entry {
    /// Existed before the run; a copy sits under the backup directory
    Saved(PathBuf),
    /// Did not exist before the run
    Absent(PathBuf),
}

/// Guard over a backup directory.
///
/// Call [`Backup::commit`] once every action succeeded or
/// [`Backup::restore`] on failure. Dropping an unfinished guard restores
/// best-effort.
#[derive(Debug)]
pub struct Backup {
    root: PathBuf,
    dir: PathBuf,
    entries: Vec<Entry>,
    finished: bool,
}

impl Backup {
    /// Copy `targets` (relative to `root`) into a fresh backup directory
    pub fn create(root: &Path, prefix: &str, targets: &BTreeSet<PathBuf>) -> Result<Self> {
        let dir = create_backup_dir(root, prefix)?;
        let mut backup = Self {
            root: root.to_path_buf(),
            dir,
            entries: Vec::new(),
            finished: false,
        };

        let mut absent = BTreeSet::new();
        for rel in targets {
            let abs = root.join(rel);
            if fs::symlink_metadata(&abs).is_ok() {
                let dest = backup.dir.join(rel);
                if let Err(e) = copy_path(&abs, &dest) {
                    // nothing has been mutated yet, so there is nothing to restore
                    backup.finished = true;
                    let _ = fs::remove_dir_all(&backup.dir);
                    return Err(Error::io("back up", &abs, e));
                }
                log::debug!("backed up {}", rel.display());
                backup.entries.push(Entry::Saved(rel.clone()));
            } else {
                absent.insert(topmost_missing(root, rel));
            }
        }
        backup.entries.extend(absent.into_iter().map(Entry::Absent));
        Ok(backup)
    }

    /// Directory holding the copies
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Discard the backup after a successful run
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        fs::remove_dir_all(&self.dir).map_err(|e| Error::io("remove backup", &self.dir, e))
    }

    /// Put every backed-up path back the way it was.
    ///
    /// On failure the backup directory is kept and every path that could not
    /// be restored is returned with its error.
    pub fn restore(&mut self) -> std::result::Result<(), Vec<(PathBuf, io::Error)>> {
        self.finished = true;
        let mut failures = Vec::new();
        for entry in &self.entries {
            let (rel, outcome) = match entry {
                Entry::Saved(rel) => (rel, self.restore_saved(rel)),
                Entry::Absent(rel) => (rel, remove_path(&self.root.join(rel))),
            };
            match outcome {
                Ok(()) => log::debug!("restored {}", rel.display()),
                Err(e) => {
                    log::error!("failed to restore {}: {e}", rel.display());
                    failures.push((rel.clone(), e));
                }
            }
        }
        if !failures.is_empty() {
            return Err(failures);
        }
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            log::warn!("could not remove backup {}: {e}", self.dir.display());
        }
        Ok(())
    }

    fn restore_saved(&self, rel: &Path) -> io::Result<()> {
        let target = self.root.join(rel);
        remove_path(&target)?;
        copy_path(&self.dir.join(rel), &target)
    }
}

impl Drop for Backup {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!("backup dropped before completion, restoring");
            let _ = self.restore();
        }
    }
}

fn create_backup_dir(root: &Path, prefix: &str) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let base = format!("{prefix}-{stamp}-{}", std::process::id());
    for attempt in 0..100u32 {
        let name = if attempt == 0 {
            base.clone()
        } else {
            format!("{base}-{attempt}")
        };
        let dir = root.join(name);
        match fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(Error::io("create backup", dir, e)),
        }
    }
    Err(Error::io(
        "create backup",
        root.join(base),
        io::Error::other("no free backup name"),
    ))
}

/// The highest ancestor of `rel` (or `rel` itself) that does not exist
fn topmost_missing(root: &Path, rel: &Path) -> PathBuf {
    let mut missing = rel.to_path_buf();
    for ancestor in rel.ancestors().skip(1) {
        if ancestor.as_os_str().is_empty() || root.join(ancestor).exists() {
            break;
        }
        missing = ancestor.to_path_buf();
    }
    missing
}

/// Remove a file, symlink or directory tree; missing paths are fine
pub(crate) fn remove_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Copy a file, symlink or directory tree, keeping permissions
fn copy_path(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    for entry in WalkDir::new(from) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(io::Error::other)?;
        let dest = if rel.as_os_str().is_empty() {
            to.to_path_buf()
        } else {
            to.join(rel)
        };
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&dest)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(from)?, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    fs::copy(from, to).map(|_| ())
}
