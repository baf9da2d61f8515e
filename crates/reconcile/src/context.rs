//! Context snapshot
//!
//! Everything the planner is allowed to know about the project, read once
//! per invocation. After [`Context::snapshot`] returns, planning never
//! touches the filesystem.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use docmerge::{Document, Format};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::version::Version;

/// Manifest sections whose keys count as installed packages
const DEPENDENCY_SECTIONS: [&str; 4] = [
    "dependencies",
    "devDependencies",
    "optionalDependencies",
    "peerDependencies",
];

static MISSING: PathState = PathState::Missing;

/// What a path held when the snapshot was taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathState {
    Missing,
    File {
        bytes: Vec<u8>,
        hash: blake3::Hash,
        executable: bool,
    },
    Dir,
    /// Sockets, fifos and the like
    Other,
}

impl PathState {
    pub fn file(bytes: impl Into<Vec<u8>>, executable: bool) -> Self {
        let bytes = bytes.into();
        let hash = blake3::hash(&bytes);
        Self::File {
            bytes,
            hash,
            executable,
        }
    }

    /// Read the state of `path`, following symlinks
    pub fn read(path: &Path) -> Result<Self> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::Missing),
            Err(e) => return Err(Error::io("inspect", path, e)),
        };
        if meta.is_dir() {
            return Ok(Self::Dir);
        }
        if !meta.is_file() {
            return Ok(Self::Other);
        }
        let bytes = fs::read(path).map_err(|e| Error::io("read", path, e))?;
        Ok(Self::file(bytes, is_executable(&meta)))
    }

    pub fn exists(&self) -> bool {
        !matches!(self, Self::Missing)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Dir)
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::File { bytes, .. } => Some(bytes),
            _ => None,
        }
    }

    /// Whether this is a file whose content hashes the same as `bytes`
    pub fn same_content(&self, bytes: &[u8]) -> bool {
        match self {
            Self::File { hash, .. } => *hash == blake3::hash(bytes),
            _ => false,
        }
    }

    pub fn is_executable(&self) -> bool {
        matches!(self, Self::File { executable: true, .. })
    }
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    false
}

/// Inputs to a snapshot that come from outside the project directory
#[derive(Debug, Clone, Default)]
pub struct SnapshotOptions {
    pub tool_version: String,
    pub capabilities: BTreeSet<String>,
    pub vars: BTreeMap<String, String>,
}

/// The project as seen by the planner
#[derive(Debug, Clone)]
pub struct Context {
    root: PathBuf,
    tool_version: Version,
    stored_version: Option<Version>,
    capabilities: BTreeSet<String>,
    installed_packages: BTreeMap<String, String>,
    manifest: Option<Value>,
    vars: BTreeMap<String, String>,
    paths: BTreeMap<PathBuf, PathState>,
}

impl Context {
    /// Read every path the schema refers to
    pub fn snapshot(root: impl Into<PathBuf>, schema: &Schema, opts: SnapshotOptions) -> Result<Self> {
        let root = root.into();
        let tool_version = parse_version(Path::new("tool version"), &opts.tool_version)?;

        let mut paths = BTreeMap::new();
        for rel in schema.referenced_paths() {
            let state = PathState::read(&root.join(rel))?;
            log::trace!("snapshot {}: {}", rel.display(), describe(&state));
            paths.insert(rel.to_path_buf(), state);
        }

        let stored_version = match paths.get(&schema.version_file) {
            None | Some(PathState::Missing) => None,
            Some(PathState::File { bytes, .. }) => {
                let text = std::str::from_utf8(bytes).map_err(|_| Error::NotUtf8 {
                    path: schema.version_file.clone(),
                })?;
                Some(parse_version(&schema.version_file, text)?)
            }
            Some(_) => {
                return Err(Error::InvalidVersion {
                    path: schema.version_file.clone(),
                    value: String::new(),
                    reason: "not a regular file".to_string(),
                });
            }
        };

        let manifest = match &schema.manifest {
            Some(rel) => read_manifest(rel, paths.get(rel).unwrap_or(&MISSING))?,
            None => None,
        };

        let mut ctx = Self {
            root,
            tool_version,
            stored_version,
            capabilities: opts.capabilities,
            installed_packages: BTreeMap::new(),
            manifest: None,
            vars: opts.vars,
            paths,
        };
        ctx.set_manifest(manifest);
        log::debug!(
            "snapshot of {}: stored version {}, {} capabilities, {} installed packages",
            ctx.root.display(),
            ctx.stored_version
                .as_ref()
                .map_or_else(|| "none".to_string(), ToString::to_string),
            ctx.capabilities.len(),
            ctx.installed_packages.len()
        );
        Ok(ctx)
    }

    /// Build a context in memory, without reading a project
    pub fn builder(root: impl Into<PathBuf>, tool_version: Version) -> ContextBuilder {
        ContextBuilder {
            ctx: Self {
                root: root.into(),
                tool_version,
                stored_version: None,
                capabilities: BTreeSet::new(),
                installed_packages: BTreeMap::new(),
                manifest: None,
                vars: BTreeMap::new(),
                paths: BTreeMap::new(),
            },
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tool_version(&self) -> &Version {
        &self.tool_version
    }

    pub fn stored_version(&self) -> Option<&Version> {
        self.stored_version.as_ref()
    }

    pub fn is_configured(&self) -> bool {
        self.stored_version.is_some()
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.contains(name)
    }

    pub fn capabilities(&self) -> &BTreeSet<String> {
        &self.capabilities
    }

    pub fn is_installed(&self, package: &str) -> bool {
        self.installed_packages.contains_key(package)
    }

    /// Declared packages and their version requirements
    pub fn installed_packages(&self) -> &BTreeMap<String, String> {
        &self.installed_packages
    }

    pub fn manifest(&self) -> Option<&Value> {
        self.manifest.as_ref()
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// State of a schema path; paths outside the snapshot read as missing
    pub fn state(&self, path: &Path) -> &PathState {
        self.paths.get(path).unwrap_or(&MISSING)
    }

    /// Project directory name, used as a default project name
    pub fn project_name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn set_manifest(&mut self, manifest: Option<Value>) {
        self.installed_packages = manifest
            .as_ref()
            .map(installed_packages)
            .unwrap_or_default();
        self.manifest = manifest;
    }
}

/// In-memory construction of a [`Context`]
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    ctx: Context,
}

impl ContextBuilder {
    pub fn stored_version(mut self, version: Version) -> Self {
        self.ctx.stored_version = Some(version);
        self
    }

    pub fn capability(mut self, name: impl Into<String>) -> Self {
        self.ctx.capabilities.insert(name.into());
        self
    }

    pub fn package(mut self, name: impl Into<String>, requirement: impl Into<String>) -> Self {
        self.ctx
            .installed_packages
            .insert(name.into(), requirement.into());
        self
    }

    /// Set the manifest, replacing any packages added so far
    pub fn manifest(mut self, manifest: Value) -> Self {
        self.ctx.set_manifest(Some(manifest));
        self
    }

    pub fn var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.vars.insert(name.into(), value.into());
        self
    }

    pub fn file(mut self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        self.ctx
            .paths
            .insert(path.into(), PathState::file(bytes, false));
        self
    }

    pub fn executable_file(mut self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        self.ctx
            .paths
            .insert(path.into(), PathState::file(bytes, true));
        self
    }

    pub fn dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.ctx.paths.insert(path.into(), PathState::Dir);
        self
    }

    pub fn build(self) -> Context {
        self.ctx
    }
}

fn parse_version(path: &Path, text: &str) -> Result<Version> {
    Version::parse(text).map_err(|reason| Error::InvalidVersion {
        path: path.to_path_buf(),
        value: text.trim().to_string(),
        reason,
    })
}

fn read_manifest(rel: &Path, state: &PathState) -> Result<Option<Value>> {
    let Some(bytes) = state.bytes() else {
        return Ok(None);
    };
    let text = std::str::from_utf8(bytes).map_err(|_| Error::NotUtf8 {
        path: rel.to_path_buf(),
    })?;
    let malformed = |source| Error::MalformedDocument {
        path: rel.to_path_buf(),
        source,
    };
    let format = Format::from_path(rel).map_err(malformed)?;
    let doc = Document::parse(text, format).map_err(malformed)?;
    Ok(Some(doc.value().clone()))
}

fn installed_packages(manifest: &Value) -> BTreeMap<String, String> {
    let mut packages = BTreeMap::new();
    for section in DEPENDENCY_SECTIONS {
        let Some(deps) = manifest.get(section).and_then(Value::as_object) else {
            continue;
        };
        for (name, requirement) in deps {
            let requirement = requirement
                .as_str()
                .map_or_else(|| requirement.to_string(), str::to_string);
            packages.entry(name.clone()).or_insert(requirement);
        }
    }
    packages
}

fn describe(state: &PathState) -> &'static str {
    match state {
        PathState::Missing => "missing",
        PathState::File { .. } => "file",
        PathState::Dir => "dir",
        PathState::Other => "other",
    }
}
