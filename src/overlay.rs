//! Overlay definition files
//!
//! An overlay file (`veneer.toml`) declares everything veneer lays into a
//! project. It is turned into a [`reconcile::Schema`] whose text and fragment
//! content is rendered through [`crate::templates`] at plan time.
//!
//! ```toml
//! [overlay]
//! version_file = ".veneer/VERSION"
//! marker = { key = "_veneer", value = "managed" }
//!
//! [dirs]
//! owned = [".veneer"]
//!
//! [[owned]]
//! path = ".veneer/guide.md"
//! template = "templates/guide.md"
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use reconcile::{
    Condition, Content, FileRule, Format, Marker, MergeSpec, PackageRule, PatchSpec, Position,
    Schema, Shape, Target,
};
use serde::Deserialize;
use serde_json::Value;

use crate::templates;

/// The overlay compiled into the binary
const BUNDLED_OVERLAY: &str = include_str!("../overlay/veneer.toml");

/// Templates referenced by the bundled overlay
const BUNDLED_TEMPLATES: &[(&str, &str)] = &[
    (
        "templates/guide.md",
        include_str!("../overlay/templates/guide.md"),
    ),
    (
        "templates/agents.md",
        include_str!("../overlay/templates/agents.md"),
    ),
    (
        "templates/pre-commit",
        include_str!("../overlay/templates/pre-commit"),
    ),
    (
        "templates/local.toml",
        include_str!("../overlay/templates/local.toml"),
    ),
];

/// Where an overlay definition came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Bundled,
    File(PathBuf),
}

impl Origin {
    fn read_template(&self, name: &str) -> Result<String> {
        match self {
            Self::Bundled => BUNDLED_TEMPLATES
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, body)| (*body).to_string())
                .ok_or_else(|| anyhow!("No bundled template named {name}")),
            Self::File(path) => {
                let base = path.parent().unwrap_or_else(|| Path::new("."));
                let file = base.join(name);
                fs::read_to_string(&file)
                    .with_context(|| format!("Could not read template {}", file.display()))
            }
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bundled => f.write_str("bundled"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A loaded overlay
#[derive(Debug)]
pub struct Overlay {
    pub schema: Schema,
    /// Extra capability name -> marker path (relative to the project root)
    pub capabilities: BTreeMap<String, PathBuf>,
    pub vars: BTreeMap<String, String>,
    pub origin: Origin,
}

impl Overlay {
    pub fn bundled() -> Result<Self> {
        Self::parse(BUNDLED_OVERLAY, Origin::Bundled)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Could not read overlay {}", path.display()))?;
        Self::parse(&text, Origin::File(path.to_path_buf()))
    }

    pub fn parse(text: &str, origin: Origin) -> Result<Self> {
        let file: OverlayFile =
            toml::from_str(text).with_context(|| format!("Invalid overlay ({origin})"))?;
        let schema = file
            .to_schema(&origin)
            .with_context(|| format!("Invalid overlay ({origin})"))?;
        schema
            .validate()
            .with_context(|| format!("Invalid overlay ({origin})"))?;
        Ok(Self {
            schema,
            capabilities: file.capabilities,
            vars: file.vars,
            origin,
        })
    }
}

// ============================================================================
// File format
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OverlayFile {
    overlay: Header,
    #[serde(default)]
    vars: BTreeMap<String, String>,
    #[serde(default)]
    capabilities: BTreeMap<String, PathBuf>,
    #[serde(default)]
    dirs: Dirs,
    #[serde(default)]
    owned: Vec<FileEntry>,
    #[serde(default)]
    managed: Vec<FileEntry>,
    #[serde(default)]
    merge: Vec<MergeEntry>,
    #[serde(default)]
    patch: Vec<PatchEntry>,
    #[serde(default)]
    packages: Vec<PackageRule>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Header {
    version_file: PathBuf,
    marker: MarkerEntry,
    manifest: Option<PathBuf>,
    backup_prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MarkerEntry {
    key: String,
    value: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Dirs {
    owned: Vec<PathBuf>,
    preserved: Vec<PathBuf>,
    shared: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileEntry {
    path: PathBuf,
    /// Inline text; exclusive with `template`
    content: Option<String>,
    /// Path relative to the overlay file
    template: Option<String>,
    #[serde(default)]
    executable: bool,
    #[serde(default)]
    when: Condition,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MergeEntry {
    path: PathBuf,
    format: Option<Format>,
    #[serde(default = "default_true")]
    create: bool,
    #[serde(default)]
    when: Condition,
    targets: Vec<TargetEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TargetEntry {
    key: Vec<String>,
    #[serde(default)]
    shape: Shape,
    identity: Option<String>,
    fragment: Value,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StrategyName {
    Block,
    Line,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PatchEntry {
    path: PathBuf,
    strategy: StrategyName,
    start: Option<String>,
    end: Option<String>,
    position: Option<Position>,
    header: Option<String>,
    /// Inline text; exclusive with `template`
    content: Option<String>,
    /// Path relative to the overlay file
    template: Option<String>,
    #[serde(default)]
    when: Condition,
}

const fn default_true() -> bool {
    true
}

impl OverlayFile {
    fn to_schema(&self, origin: &Origin) -> Result<Schema> {
        let header = &self.overlay;
        let mut schema = Schema::new(
            header.version_file.clone(),
            Marker::new(header.marker.key.clone(), header.marker.value.clone()),
        );
        if let Some(manifest) = &header.manifest {
            schema = schema.with_manifest(manifest.clone());
        }
        if let Some(prefix) = &header.backup_prefix {
            schema = schema.with_backup_prefix(prefix.clone());
        }

        for dir in &self.dirs.owned {
            schema = schema.owned_dir(dir.clone());
        }
        for dir in &self.dirs.preserved {
            schema = schema.preserved_dir(dir.clone());
        }
        for dir in &self.dirs.shared {
            schema = schema.shared_dir(dir.clone());
        }

        for entry in &self.owned {
            schema = schema.owned_file(entry.path.clone(), entry.to_rule(origin)?);
        }
        for entry in &self.managed {
            schema = schema.managed_file(entry.path.clone(), entry.to_rule(origin)?);
        }
        for entry in &self.merge {
            schema = schema.merge(entry.path.clone(), entry.to_spec()?);
        }
        for entry in &self.patch {
            schema = schema.patch(entry.path.clone(), entry.to_spec(origin)?);
        }
        for rule in &self.packages {
            schema = schema.package(rule.clone());
        }
        Ok(schema)
    }
}

fn body(
    content: Option<&String>,
    template: Option<&String>,
    origin: &Origin,
    path: &Path,
) -> Result<Content<String>> {
    let text = match (content, template) {
        (Some(text), None) => text.clone(),
        (None, Some(name)) => origin.read_template(name)?,
        (Some(_), Some(_)) => bail!(
            "{}: set either content or template, not both",
            path.display()
        ),
        (None, None) => bail!("{}: content or template is required", path.display()),
    };
    Ok(text_content(text))
}

impl FileEntry {
    fn to_rule(&self, origin: &Origin) -> Result<FileRule> {
        let content = body(
            self.content.as_ref(),
            self.template.as_ref(),
            origin,
            &self.path,
        )?;
        let mut rule = FileRule::new(content).when(self.when.clone());
        if self.executable {
            rule = rule.executable();
        }
        Ok(rule)
    }
}

impl MergeEntry {
    fn to_spec(&self) -> Result<MergeSpec> {
        if self.targets.is_empty() {
            bail!("{}: a merge needs at least one target", self.path.display());
        }
        let mut spec = MergeSpec::new().when(self.when.clone());
        if let Some(format) = self.format {
            spec = spec.with_format(format);
        }
        if !self.create {
            spec = spec.existing_only();
        }
        for t in &self.targets {
            let target = match t.shape {
                Shape::Object => {
                    if t.identity.is_some() {
                        bail!(
                            "{}: identity only applies to array targets",
                            self.path.display()
                        );
                    }
                    Target::object(t.key.as_slice())
                }
                Shape::Array => Target::array(t.key.as_slice(), t.identity.as_deref()),
            };
            spec = spec.target(target, fragment_content(t.fragment.clone()));
        }
        Ok(spec)
    }
}

impl PatchEntry {
    fn to_spec(&self, origin: &Origin) -> Result<PatchSpec> {
        let content = body(
            self.content.as_ref(),
            self.template.as_ref(),
            origin,
            &self.path,
        )?;
        let mut spec = match self.strategy {
            StrategyName::Block => {
                let (Some(start), Some(end)) = (&self.start, &self.end) else {
                    bail!("{}: block patches need start and end markers", self.path.display());
                };
                PatchSpec::block(start.clone(), end.clone(), content)
            }
            StrategyName::Line => {
                if self.start.is_some() || self.end.is_some() {
                    bail!("{}: line patches take no markers", self.path.display());
                }
                PatchSpec::lines(content)
            }
        };
        if let Some(position) = self.position {
            spec = spec.with_position(position);
        }
        if let Some(header) = &self.header {
            spec = spec.with_header(header.clone());
        }
        Ok(spec.when(self.when.clone()))
    }
}

fn text_content(text: String) -> Content<String> {
    Content::generated(move |ctx| Ok(templates::render(&text, templates::context_vars(ctx))?))
}

fn fragment_content(value: Value) -> Content<Value> {
    Content::generated(move |ctx| {
        Ok(templates::render_value(
            &value,
            &templates::context_vars(ctx),
        )?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use reconcile::Version;
    use serde_json::json;
    use tempfile::TempDir;

    const MINIMAL: &str = indoc! {r##"
        [overlay]
        version_file = ".tool/VERSION"
        marker = { key = "_tool", value = true }

        [dirs]
        owned = [".tool"]

        [[owned]]
        path = ".tool/readme.md"
        content = "# {{ project_name }}\n"
    "##};

    fn ctx(root: &str) -> reconcile::Context {
        reconcile::Context::builder(root, Version::parse("1.0.0").unwrap())
            .capability("git")
            .build()
    }

    #[test]
    fn bundled_overlay_is_valid() {
        let overlay = Overlay::bundled().unwrap();
        assert_eq!(overlay.origin, Origin::Bundled);
        let schema = &overlay.schema;
        assert_eq!(schema.version_file, PathBuf::from(".veneer/VERSION"));
        assert!(schema.owned_dirs.contains(Path::new(".veneer")));
        assert!(!schema.owned_files.is_empty());
        assert!(!schema.document_merges.is_empty());
        assert!(!schema.text_patches.is_empty());

        // every bundled template renders for a plain git project
        let ctx = overlay
            .vars
            .iter()
            .fold(
                reconcile::Context::builder("/work/shop", Version::parse("1.0.0").unwrap())
                    .capability("git"),
                |b, (k, v)| b.var(k.clone(), v.clone()),
            )
            .build();
        for rule in schema.owned_files.values().chain(schema.managed_files.values()) {
            rule.content.render(&ctx).unwrap();
        }
        for spec in schema.text_patches.values() {
            spec.to_patch(&ctx).unwrap();
        }
        for spec in schema.document_merges.values() {
            for t in &spec.targets {
                t.fragment.render(&ctx).unwrap();
            }
        }
    }

    #[test]
    fn inline_content_is_rendered_per_context() {
        let overlay = Overlay::parse(MINIMAL, Origin::Bundled).unwrap();
        let rule = &overlay.schema.owned_files[Path::new(".tool/readme.md")];
        assert_eq!(rule.content.render(&ctx("/a/shop")).unwrap(), "# shop\n");
        assert_eq!(rule.content.render(&ctx("/b/cart")).unwrap(), "# cart\n");
    }

    #[test]
    fn templates_resolve_next_to_the_overlay_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("t")).unwrap();
        fs::write(dir.path().join("t/hook.sh"), "#!/bin/sh\necho {{ tool_version }}\n").unwrap();
        let path = dir.path().join("veneer.toml");
        fs::write(
            &path,
            indoc! {r#"
                [overlay]
                version_file = ".tool/VERSION"
                marker = { key = "_tool", value = "managed" }

                [dirs]
                owned = [".tool"]
                shared = ["hooks"]

                [[owned]]
                path = "hooks/check"
                template = "t/hook.sh"
                executable = true
                when = { capability = "git" }
            "#},
        )
        .unwrap();

        let overlay = Overlay::load(&path).unwrap();
        assert_eq!(overlay.origin, Origin::File(path));
        let rule = &overlay.schema.owned_files[Path::new("hooks/check")];
        assert!(rule.executable);
        assert_eq!(rule.when, Condition::Capability("git".into()));
        assert_eq!(rule.content.render(&ctx("/p")).unwrap(), "#!/bin/sh\necho 1.0.0\n");
    }

    #[test]
    fn merge_and_patch_entries() {
        let text = indoc! {r#"
            [overlay]
            version_file = ".tool/VERSION"
            marker = { key = "_tool", value = true }
            manifest = "package.json"

            [dirs]
            owned = [".tool"]

            [[merge]]
            path = "package.json"
            create = false
            when = { all = ["always", { not = { package = "pnpm" } }] }

            [[merge.targets]]
            key = ["scripts"]
            fragment = { check = "tool check {{ project_name }}" }

            [[merge]]
            path = ".config/settings.json"

            [[merge.targets]]
            key = ["hooks", "Stop"]
            shape = "array"
            identity = "command"
            fragment = [{ command = "tool stop" }]

            [[patch]]
            path = ".gitignore"
            strategy = "line"
            position = "append"
            content = ".tool-backup-*"

            [[packages]]
            name = "husky"
            when = { capability = "git" }
        "#};
        let overlay = Overlay::parse(text, Origin::Bundled).unwrap();
        let schema = &overlay.schema;

        let pkg = &schema.document_merges[Path::new("package.json")];
        assert!(!pkg.create);
        assert_eq!(
            pkg.when,
            Condition::All(vec![
                Condition::Always,
                Condition::Not(Box::new(Condition::Package("pnpm".into())))
            ])
        );
        assert_eq!(
            pkg.targets[0].fragment.render(&ctx("/w/shop")).unwrap(),
            json!({"check": "tool check shop"})
        );

        let settings = &schema.document_merges[Path::new(".config/settings.json")];
        assert_eq!(settings.targets[0].target, Target::array(&["hooks", "Stop"], Some("command")));

        let patch = schema.text_patches[Path::new(".gitignore")]
            .to_patch(&ctx("/w/shop"))
            .unwrap();
        assert_eq!(patch.position, Position::Append);
        assert_eq!(patch.fragment, ".tool-backup-*");

        assert_eq!(schema.package_rules, vec![PackageRule::new("husky").when(Condition::Capability("git".into()))]);
    }

    #[test]
    fn rejects_ambiguous_or_incomplete_entries() {
        let both = MINIMAL.replace(
            "content = \"# {{ project_name }}\\n\"",
            "content = \"x\"\ntemplate = \"y\"",
        );
        let err = Overlay::parse(&both, Origin::Bundled).unwrap_err();
        assert!(format!("{err:#}").contains("either content or template"));

        let block = format!(
            "{MINIMAL}\n[[patch]]\npath = \"AGENTS.md\"\nstrategy = \"block\"\nstart = \"<!-- a -->\"\ncontent = \"x\"\n"
        );
        let err = Overlay::parse(&block, Origin::Bundled).unwrap_err();
        assert!(format!("{err:#}").contains("start and end markers"));

        let typo = MINIMAL.replace("[dirs]", "[dir]");
        assert!(Overlay::parse(&typo, Origin::Bundled).is_err());
    }

    #[test]
    fn schema_errors_surface_at_load() {
        let outside = MINIMAL.replace("version_file = \".tool/VERSION\"", "version_file = \"VERSION\"");
        let err = Overlay::parse(&outside, Origin::Bundled).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid overlay (bundled)"));
    }

    #[test]
    fn unknown_placeholder_fails_at_render_time() {
        let text = MINIMAL.replace("{{ project_name }}", "{{ nothing }}");
        let overlay = Overlay::parse(&text, Origin::Bundled).unwrap();
        let rule = &overlay.schema.owned_files[Path::new(".tool/readme.md")];
        let err = rule.content.render(&ctx("/p")).unwrap_err();
        assert!(err.to_string().contains("nothing"));
    }
}
