//! Action applier - the only component that mutates the project
//!
//! Actions run strictly in order behind a [`Backup`] guard. The first
//! failure restores every backed-up path and is returned unchanged; if the
//! restore fails too, both are reported.

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use docmerge::Document;

use crate::action::Action;
use crate::backup::{Backup, remove_path};
use crate::error::{Error, Result};
use crate::schema::Schema;

/// Receives progress updates while actions are applied
pub trait ApplyObserver {
    /// Called once before the first action
    fn on_start(&mut self, total: usize);

    /// Called before each action
    fn on_action_start(&mut self, index: usize, action: &Action);

    /// Called after each successful action
    fn on_action_complete(&mut self, index: usize, action: &Action);

    /// Called when a failure triggers rollback
    fn on_rollback(&mut self, error: &Error);

    /// Called after the last action succeeded
    fn on_finish(&mut self);
}

/// No-op observer
pub struct NoProgress;

impl ApplyObserver for NoProgress {
    fn on_start(&mut self, _total: usize) {}
    fn on_action_start(&mut self, _index: usize, _action: &Action) {}
    fn on_action_complete(&mut self, _index: usize, _action: &Action) {}
    fn on_rollback(&mut self, _error: &Error) {}
    fn on_finish(&mut self) {}
}

/// Execute `actions` against `root`
pub fn apply<O: ApplyObserver + ?Sized>(
    root: &Path,
    schema: &Schema,
    actions: &[Action],
    observer: &mut O,
) -> Result<()> {
    if actions.is_empty() {
        return Ok(());
    }

    let mut backup = Backup::create(root, &schema.backup_prefix, &backup_targets(schema, actions))?;
    observer.on_start(actions.len());

    for (index, action) in actions.iter().enumerate() {
        observer.on_action_start(index, action);
        if let Err(err) = execute(root, schema, action) {
            log::warn!("{err}; rolling back");
            observer.on_rollback(&err);
            return Err(match backup.restore() {
                Ok(()) => err,
                Err(failures) => Error::RollbackFailed {
                    original: Box::new(err),
                    failures,
                    backup: backup.dir().to_path_buf(),
                },
            });
        }
        log::info!("{action}");
        observer.on_action_complete(index, action);
    }

    if let Err(e) = backup.commit() {
        log::warn!("{e}");
    }
    observer.on_finish();
    Ok(())
}

/// Paths to back up: the outermost owned dir around each action path, or
/// the path itself, without nesting
fn backup_targets(schema: &Schema, actions: &[Action]) -> BTreeSet<PathBuf> {
    let candidates: BTreeSet<PathBuf> = actions
        .iter()
        .map(|a| {
            schema
                .enclosing_owned_dir(a.path())
                .unwrap_or(a.path())
                .to_path_buf()
        })
        .collect();
    candidates
        .iter()
        .filter(|p| {
            !candidates
                .iter()
                .any(|other| other != *p && p.starts_with(other))
        })
        .cloned()
        .collect()
}

fn execute(root: &Path, schema: &Schema, action: &Action) -> Result<()> {
    let abs = root.join(action.path());
    match action {
        Action::CreateDir { .. } => create_dir(&abs),
        Action::WriteFile {
            contents,
            executable,
            ..
        } => write_atomic(&abs, contents.as_bytes(), *executable),
        Action::DeletePath { keep, .. } => {
            let keep: Vec<PathBuf> = keep.iter().map(|k| root.join(k)).collect();
            delete(&abs, &keep).map_err(|e| Error::io("delete", &abs, e))
        }
        Action::MergeDocument {
            format,
            target,
            fragment,
            ..
        } => {
            let mut doc = match read_text(&abs)? {
                Some(text) => parse(&abs, &text, *format)?,
                None => Document::empty(*format),
            };
            let changed = doc
                .merge(&schema.marker, target, fragment)
                .map_err(|source| malformed(&abs, source))?;
            if changed || !abs.exists() {
                write_document(&abs, &doc)?;
            }
            Ok(())
        }
        Action::UnmergeDocument { format, target, .. } => {
            let Some(text) = read_text(&abs)? else {
                return Ok(());
            };
            let mut doc = parse(&abs, &text, *format)?;
            let changed = doc
                .unmerge(&schema.marker, target)
                .map_err(|source| malformed(&abs, source))?;
            if changed {
                write_document(&abs, &doc)?;
            }
            Ok(())
        }
        Action::PatchText { patch, .. } => {
            let current = read_text(&abs)?;
            let patched = patch
                .apply(current.as_deref())
                .map_err(|source| patch_error(&abs, source))?;
            if current.as_deref() != Some(patched.as_str()) {
                write_atomic(&abs, patched.as_bytes(), false)?;
            }
            Ok(())
        }
        Action::UnpatchText { patch, .. } => {
            let Some(current) = read_text(&abs)? else {
                return Ok(());
            };
            let reverted = patch
                .revert(&current)
                .map_err(|source| patch_error(&abs, source))?;
            if reverted != current {
                write_atomic(&abs, reverted.as_bytes(), false)?;
            }
            Ok(())
        }
    }
}

fn create_dir(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::io(
            "create directory",
            path,
            io::Error::new(io::ErrorKind::AlreadyExists, "exists and is not a directory"),
        )),
        Err(_) => fs::create_dir_all(path).map_err(|e| Error::io("create directory", path, e)),
    }
}

/// Delete `path`, leaving every path in `keep` (and its ancestors) in place
fn delete(path: &Path, keep: &[PathBuf]) -> io::Result<()> {
    if keep.is_empty() {
        return remove_path(path);
    }
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if !meta.is_dir() {
        return fs::remove_file(path);
    }
    for entry in fs::read_dir(path)? {
        let child = entry?.path();
        if keep.iter().any(|k| *k == child) {
            continue;
        }
        if keep.iter().any(|k| k.starts_with(&child)) {
            delete(&child, keep)?;
        } else {
            remove_path(&child)?;
        }
    }
    Ok(())
}

fn read_text(path: &Path) -> Result<Option<String>> {
    match fs::read(path) {
        Ok(bytes) => String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| Error::NotUtf8 {
                path: path.to_path_buf(),
            }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io("read", path, e)),
    }
}

fn parse(path: &Path, text: &str, format: docmerge::Format) -> Result<Document> {
    Document::parse(text, format).map_err(|source| malformed(path, source))
}

fn write_document(path: &Path, doc: &Document) -> Result<()> {
    let text = doc.render().map_err(|source| malformed(path, source))?;
    write_atomic(path, text.as_bytes(), false)
}

/// Replace `path` through a temporary file in the same directory
fn write_atomic(path: &Path, bytes: &[u8], executable: bool) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent).map_err(|e| Error::io("create directory", parent, e))?;

    let err = |e| Error::io("write", path, e);
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(err)?;
    tmp.write_all(bytes).map_err(err)?;
    tmp.as_file().sync_all().map_err(err)?;
    let permissions = match fs::metadata(path) {
        Ok(meta) => Some(meta.permissions()),
        Err(_) => None,
    };
    set_permissions(tmp.as_file(), permissions, executable).map_err(err)?;
    tmp.persist(path).map_err(|e| err(e.error))?;
    Ok(())
}

#[cfg(unix)]
fn set_permissions(file: &fs::File, existing: Option<fs::Permissions>, executable: bool) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut mode = existing.map_or(0o644, |p| p.mode() & 0o7777);
    if executable {
        mode |= 0o755;
    }
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_permissions(file: &fs::File, existing: Option<fs::Permissions>, _executable: bool) -> io::Result<()> {
    match existing {
        Some(permissions) => file.set_permissions(permissions),
        None => Ok(()),
    }
}

fn malformed(path: &Path, source: docmerge::Error) -> Error {
    Error::MalformedDocument {
        path: path.to_path_buf(),
        source,
    }
}

fn patch_error(path: &Path, source: textpatch::Error) -> Error {
    Error::Patch {
        path: path.to_path_buf(),
        source,
    }
}
