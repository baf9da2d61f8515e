//! Declarative description of the overlay
//!
//! A [`Schema`] says what should exist inside a project: which files and
//! directories the tool owns outright, which files it only seeds, which
//! directories hold user content, and which fragments it merges into
//! documents or patches into text files that users also edit.
//!
//! The schema never touches the filesystem. Content is either static or a
//! generator over the [`Context`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use docmerge::{Format, Marker, Target};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use textpatch::{Patch, Position, Strategy};

use crate::context::Context;
use crate::error::{Error, Result};

/// A function producing desired content from the project context
pub type Generator<T> = Arc<dyn Fn(&Context) -> anyhow::Result<T> + Send + Sync>;

/// Desired content: fixed, or computed from the context
#[derive(Clone)]
pub enum Content<T> {
    Static(T),
    Generated(Generator<T>),
}

impl<T: Clone> Content<T> {
    pub fn generated<F>(f: F) -> Self
    where
        F: Fn(&Context) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::Generated(Arc::new(f))
    }

    pub fn render(&self, ctx: &Context) -> anyhow::Result<T> {
        match self {
            Self::Static(value) => Ok(value.clone()),
            Self::Generated(f) => f(ctx),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Content<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Generated(_) => f.write_str("Generated(..)"),
        }
    }
}

impl From<&str> for Content<String> {
    fn from(s: &str) -> Self {
        Self::Static(s.to_string())
    }
}

impl From<String> for Content<String> {
    fn from(s: String) -> Self {
        Self::Static(s)
    }
}

impl From<Value> for Content<Value> {
    fn from(v: Value) -> Self {
        Self::Static(v)
    }
}

/// Predicate over the context deciding whether a rule applies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    #[default]
    Always,
    Capability(String),
    Package(String),
    Not(Box<Condition>),
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

impl Condition {
    pub fn eval(&self, ctx: &Context) -> bool {
        match self {
            Self::Always => true,
            Self::Capability(name) => ctx.has_capability(name),
            Self::Package(name) => ctx.is_installed(name),
            Self::Not(inner) => !inner.eval(ctx),
            Self::All(all) => all.iter().all(|c| c.eval(ctx)),
            Self::Any(any) => any.iter().any(|c| c.eval(ctx)),
        }
    }
}

/// Rule for an owned or managed file
#[derive(Debug, Clone)]
pub struct FileRule {
    pub content: Content<String>,
    pub when: Condition,
    pub executable: bool,
}

impl FileRule {
    pub fn new(content: impl Into<Content<String>>) -> Self {
        Self {
            content: content.into(),
            when: Condition::Always,
            executable: false,
        }
    }

    pub fn when(mut self, when: Condition) -> Self {
        self.when = when;
        self
    }

    pub fn executable(mut self) -> Self {
        self.executable = true;
        self
    }
}

/// One container inside a document and the fragment merged into it
#[derive(Debug, Clone)]
pub struct MergeTarget {
    pub target: Target,
    pub fragment: Content<Value>,
}

/// Fragments merged into one structured document
#[derive(Debug, Clone)]
pub struct MergeSpec {
    /// Defaults to the format implied by the file extension
    pub format: Option<Format>,
    /// Create the document when it does not exist
    pub create: bool,
    pub when: Condition,
    pub targets: Vec<MergeTarget>,
}

impl MergeSpec {
    pub fn new() -> Self {
        Self {
            format: None,
            create: true,
            when: Condition::Always,
            targets: Vec::new(),
        }
    }

    pub fn target(mut self, target: Target, fragment: impl Into<Content<Value>>) -> Self {
        self.targets.push(MergeTarget {
            target,
            fragment: fragment.into(),
        });
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn existing_only(mut self) -> Self {
        self.create = false;
        self
    }

    pub fn when(mut self, when: Condition) -> Self {
        self.when = when;
        self
    }

    pub(crate) fn format_for(&self, path: &Path) -> Result<Format> {
        match self.format {
            Some(format) => Ok(format),
            None => Format::from_path(path).map_err(|source| Error::MalformedDocument {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl Default for MergeSpec {
    fn default() -> Self {
        Self::new()
    }
}

/// A fragment patched into a free-form text file
#[derive(Debug, Clone)]
pub struct PatchSpec {
    pub strategy: Strategy,
    pub position: Position,
    pub header: Option<String>,
    pub fragment: Content<String>,
    pub when: Condition,
}

impl PatchSpec {
    pub fn block(
        start: impl Into<String>,
        end: impl Into<String>,
        fragment: impl Into<Content<String>>,
    ) -> Self {
        Self {
            strategy: Strategy::Block {
                start: start.into(),
                end: end.into(),
            },
            position: Position::Append,
            header: None,
            fragment: fragment.into(),
            when: Condition::Always,
        }
    }

    pub fn lines(fragment: impl Into<Content<String>>) -> Self {
        Self {
            strategy: Strategy::Lines,
            position: Position::Prepend,
            header: None,
            fragment: fragment.into(),
            when: Condition::Always,
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn when(mut self, when: Condition) -> Self {
        self.when = when;
        self
    }

    /// Render the fragment into a concrete patch
    pub fn to_patch(&self, ctx: &Context) -> anyhow::Result<Patch> {
        Ok(Patch {
            strategy: self.strategy.clone(),
            position: self.position,
            fragment: self.fragment.render(ctx)?,
            header: self.header.clone(),
        })
    }
}

/// A package required while `when` holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRule {
    pub name: String,
    #[serde(default)]
    pub when: Condition,
}

impl PackageRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            when: Condition::Always,
        }
    }

    pub fn when(mut self, when: Condition) -> Self {
        self.when = when;
        self
    }
}

/// The complete desired overlay
#[derive(Debug, Clone)]
pub struct Schema {
    pub owned_files: BTreeMap<PathBuf, FileRule>,
    pub managed_files: BTreeMap<PathBuf, FileRule>,
    pub owned_dirs: BTreeSet<PathBuf>,
    pub preserved_dirs: BTreeSet<PathBuf>,
    pub shared_dirs: BTreeSet<PathBuf>,
    pub document_merges: BTreeMap<PathBuf, MergeSpec>,
    pub text_patches: BTreeMap<PathBuf, PatchSpec>,
    pub package_rules: Vec<PackageRule>,
    /// File holding the version of the overlay currently installed
    pub version_file: PathBuf,
    /// Tag identifying tool-owned entries in merged documents
    pub marker: Marker,
    /// Package manifest read for installed dependencies
    pub manifest: Option<PathBuf>,
    /// Name prefix of the per-run backup directory
    pub backup_prefix: String,
}

impl Schema {
    pub fn new(version_file: impl Into<PathBuf>, marker: Marker) -> Self {
        Self {
            owned_files: BTreeMap::new(),
            managed_files: BTreeMap::new(),
            owned_dirs: BTreeSet::new(),
            preserved_dirs: BTreeSet::new(),
            shared_dirs: BTreeSet::new(),
            document_merges: BTreeMap::new(),
            text_patches: BTreeMap::new(),
            package_rules: Vec::new(),
            version_file: version_file.into(),
            marker,
            manifest: None,
            backup_prefix: ".overlay-backup".to_string(),
        }
    }

    pub fn owned_file(mut self, path: impl Into<PathBuf>, rule: FileRule) -> Self {
        self.owned_files.insert(path.into(), rule);
        self
    }

    pub fn managed_file(mut self, path: impl Into<PathBuf>, rule: FileRule) -> Self {
        self.managed_files.insert(path.into(), rule);
        self
    }

    pub fn owned_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.owned_dirs.insert(path.into());
        self
    }

    pub fn preserved_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.preserved_dirs.insert(path.into());
        self
    }

    pub fn shared_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.shared_dirs.insert(path.into());
        self
    }

    pub fn merge(mut self, path: impl Into<PathBuf>, spec: MergeSpec) -> Self {
        self.document_merges.insert(path.into(), spec);
        self
    }

    pub fn patch(mut self, path: impl Into<PathBuf>, spec: PatchSpec) -> Self {
        self.text_patches.insert(path.into(), spec);
        self
    }

    pub fn package(mut self, rule: PackageRule) -> Self {
        self.package_rules.push(rule);
        self
    }

    pub fn with_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest = Some(path.into());
        self
    }

    pub fn with_backup_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.backup_prefix = prefix.into();
        self
    }

    /// Every directory the overlay creates, parents before children
    pub fn all_dirs(&self) -> BTreeSet<&PathBuf> {
        self.owned_dirs
            .iter()
            .chain(&self.preserved_dirs)
            .chain(&self.shared_dirs)
            .collect()
    }

    /// The outermost owned directory containing `path` (or equal to it)
    pub fn enclosing_owned_dir(&self, path: &Path) -> Option<&Path> {
        self.owned_dirs
            .iter()
            .filter(|d| path.starts_with(d))
            .min_by_key(|d| d.components().count())
            .map(PathBuf::as_path)
    }

    /// Every path the planner needs to know the state of
    pub fn referenced_paths(&self) -> BTreeSet<&Path> {
        let mut paths: BTreeSet<&Path> = BTreeSet::new();
        paths.extend(self.owned_files.keys().map(PathBuf::as_path));
        paths.extend(self.managed_files.keys().map(PathBuf::as_path));
        paths.extend(self.all_dirs().into_iter().map(PathBuf::as_path));
        paths.extend(self.document_merges.keys().map(PathBuf::as_path));
        paths.extend(self.text_patches.keys().map(PathBuf::as_path));
        paths.insert(&self.version_file);
        if let Some(manifest) = &self.manifest {
            paths.insert(manifest);
        }
        paths
    }

    /// Check that the schema is internally consistent
    pub fn validate(&self) -> Result<()> {
        for path in self.referenced_paths() {
            check_relative(path)?;
        }

        let mut claimed: BTreeMap<&Path, &'static str> = BTreeMap::new();
        let collections: [(&'static str, Vec<&PathBuf>); 7] = [
            ("owned file", self.owned_files.keys().collect()),
            ("managed file", self.managed_files.keys().collect()),
            ("owned dir", self.owned_dirs.iter().collect()),
            ("preserved dir", self.preserved_dirs.iter().collect()),
            ("shared dir", self.shared_dirs.iter().collect()),
            ("version file", vec![&self.version_file]),
            ("merge target", self.document_merges.keys().collect()),
        ];
        for (what, paths) in collections {
            for path in paths {
                if let Some(other) = claimed.insert(path.as_path(), what) {
                    return Err(Error::schema(
                        path,
                        format!("declared as both {other} and {what}"),
                    ));
                }
            }
        }
        for path in self.text_patches.keys() {
            if let Some(other) = claimed.get(path.as_path())
                && matches!(*other, "owned file" | "version file" | "merge target")
            {
                return Err(Error::schema(
                    path,
                    format!("declared as both {other} and patch target"),
                ));
            }
        }

        if self.enclosing_owned_dir(&self.version_file).is_none() {
            return Err(Error::schema(
                &self.version_file,
                "version file must live inside an owned dir",
            ));
        }
        if self.marker.key.is_empty() {
            return Err(Error::schema(&self.version_file, "marker key is empty"));
        }
        if self.backup_prefix.is_empty() || self.backup_prefix.contains('/') {
            return Err(Error::schema(
                &self.backup_prefix,
                "backup prefix must be a plain file name",
            ));
        }
        Ok(())
    }
}

fn check_relative(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::schema(path, "empty path"));
    }
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            Component::CurDir => return Err(Error::schema(path, "`.` components are not allowed")),
            Component::ParentDir => {
                return Err(Error::schema(path, "parent components are not allowed"));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::schema(path, "paths must be relative to the project root"));
            }
        }
    }
    Ok(())
}
