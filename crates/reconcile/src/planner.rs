//! Action planner
//!
//! Turns a [`Schema`], a [`Context`] and a [`Mode`] into an ordered action
//! list and a package delta. Planning is pure: the context already holds
//! every byte the planner looks at, so a dry run and a live run always see
//! the same plan.
//!
//! Actions come out in fixed phases. Converging: directories, file writes
//! (version marker last), document merges, text patches. Removing: unpatches,
//! unmerges, file deletes, then directory deletes deepest first.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use docmerge::Document;

use crate::action::{Action, WriteReason};
use crate::context::{Context, PathState};
use crate::error::{Error, Result};
use crate::schema::{Content, MergeSpec, PatchSpec, Schema};
use crate::types::{Mode, ReconcileResult};

/// Compute the actions and package delta for `mode`
pub fn plan(schema: &Schema, ctx: &Context, mode: Mode) -> Result<ReconcileResult> {
    schema.validate()?;
    check_preconditions(ctx, mode)?;

    let planner = Planner { schema, ctx, mode };
    let mut phases = Phases::default();
    if mode.is_uninstall() {
        planner.remove(&mut phases)?;
    } else {
        planner.converge(&mut phases)?;
    }
    let (packages_to_install, packages_to_remove) = planner.package_delta();

    let actions = phases.into_actions();
    log::debug!(
        "planned {} action(s) for {mode} in {}",
        actions.len(),
        ctx.root().display()
    );
    Ok(ReconcileResult {
        mode,
        actions,
        applied: false,
        packages_to_install,
        packages_to_remove,
    })
}

fn check_preconditions(ctx: &Context, mode: Mode) -> Result<()> {
    match (mode, ctx.stored_version()) {
        (Mode::Install, None) => Ok(()),
        (Mode::Install, Some(stored)) => Err(Error::AlreadyConfigured {
            stored: stored.to_string(),
        }),
        (_, None) => Err(Error::NotConfigured),
        (_, Some(stored)) if stored > ctx.tool_version() => Err(Error::Downgrade {
            stored: stored.to_string(),
            tool: ctx.tool_version().to_string(),
        }),
        _ => Ok(()),
    }
}

#[derive(Default)]
struct Phases {
    dirs: Vec<Action>,
    writes: Vec<Action>,
    merges: Vec<Action>,
    patches: Vec<Action>,
    unpatches: Vec<Action>,
    unmerges: Vec<Action>,
    file_deletes: Vec<Action>,
    dir_deletes: Vec<Action>,
}

impl Phases {
    fn into_actions(mut self) -> Vec<Action> {
        self.dir_deletes.sort_by(|a, b| b.path().cmp(a.path()));
        let mut actions = self.dirs;
        actions.extend(self.writes);
        actions.extend(self.merges);
        actions.extend(self.patches);
        actions.extend(self.unpatches);
        actions.extend(self.unmerges);
        actions.extend(self.file_deletes);
        actions.extend(self.dir_deletes);
        actions
    }
}

struct Planner<'a> {
    schema: &'a Schema,
    ctx: &'a Context,
    mode: Mode,
}

impl Planner<'_> {
    fn install(&self) -> bool {
        self.mode == Mode::Install
    }

    /// Install or upgrade
    fn converge(&self, out: &mut Phases) -> Result<()> {
        let install = self.install();

        for dir in self.schema.all_dirs() {
            if install || !self.ctx.state(dir).is_dir() {
                out.dirs.push(Action::CreateDir { path: dir.clone() });
            }
        }

        for (path, rule) in &self.schema.owned_files {
            let state = self.ctx.state(path);
            if !rule.when.eval(self.ctx) {
                if !install && state.exists() {
                    log::debug!("{} no longer applies, removing", path.display());
                    out.file_deletes.push(delete(path, Vec::new()));
                }
                continue;
            }
            let contents = self.render(path, &rule.content)?;
            let drifted = !state.same_content(contents.as_bytes())
                || (rule.executable && !state.is_executable());
            if install || drifted {
                out.writes.push(write(path, contents, rule.executable, state));
            } else {
                log::debug!("{} is up to date", path.display());
            }
        }

        for (path, rule) in &self.schema.managed_files {
            if !rule.when.eval(self.ctx) {
                continue;
            }
            let state = self.ctx.state(path);
            if state.exists() {
                log::debug!("{} exists, leaving it to the user", path.display());
                continue;
            }
            let contents = self.render(path, &rule.content)?;
            out.writes.push(write(path, contents, rule.executable, state));
        }

        let version = format!("{}\n", self.ctx.tool_version());
        let state = self.ctx.state(&self.schema.version_file);
        if install || !state.same_content(version.as_bytes()) {
            out.writes
                .push(write(&self.schema.version_file, version, false, state));
        }

        for (path, spec) in &self.schema.document_merges {
            if spec.when.eval(self.ctx) {
                self.plan_merge(path, spec, &mut out.merges)?;
            } else if !install {
                self.plan_unmerge(path, spec, &mut out.unmerges)?;
            }
        }

        for (path, spec) in &self.schema.text_patches {
            if spec.when.eval(self.ctx) {
                self.plan_patch(path, spec, &mut out.patches)?;
            } else if !install {
                self.plan_unpatch(path, spec, &mut out.unpatches)?;
            }
        }
        Ok(())
    }

    /// Uninstall, optionally full. Conditions are ignored: whatever the tool
    /// owns goes, whatever today's capabilities are.
    fn remove(&self, out: &mut Phases) -> Result<()> {
        let full = self.mode == Mode::UninstallFull;

        for (path, spec) in &self.schema.text_patches {
            self.plan_unpatch(path, spec, &mut out.unpatches)?;
        }
        for (path, spec) in &self.schema.document_merges {
            self.plan_unmerge(path, spec, &mut out.unmerges)?;
        }

        let mut retained: Vec<&PathBuf> = Vec::new();
        for (path, rule) in &self.schema.managed_files {
            let state = self.ctx.state(path);
            if !state.exists() {
                continue;
            }
            let pristine = full && state.same_content(self.render(path, &rule.content)?.as_bytes());
            if !pristine {
                if full {
                    log::debug!("{} was customised, keeping it", path.display());
                }
                retained.push(path);
            } else if self.needs_own_delete(path) {
                out.file_deletes.push(delete(path, Vec::new()));
            }
        }

        let owned = self
            .schema
            .owned_files
            .keys()
            .chain(std::iter::once(&self.schema.version_file));
        for path in owned {
            if self.needs_own_delete(path) && self.ctx.state(path).exists() {
                out.file_deletes.push(delete(path, Vec::new()));
            }
        }

        for dir in &self.schema.owned_dirs {
            let outermost = self.schema.enclosing_owned_dir(dir) == Some(dir.as_path());
            if !outermost || !self.ctx.state(dir).exists() {
                continue;
            }
            let keep: Vec<PathBuf> = self
                .schema
                .preserved_dirs
                .iter()
                .chain(&self.schema.shared_dirs)
                .chain(retained.iter().copied())
                .filter(|p| p.starts_with(dir) && *p != dir && self.ctx.state(p).exists())
                .cloned()
                .collect();
            out.dir_deletes.push(delete(dir, keep));
        }
        Ok(())
    }

    /// Whether a tool-written file is not swept away by its owned directory,
    /// either because it has none or because it sits in a preserved or shared
    /// directory the sweep keeps
    fn needs_own_delete(&self, path: &Path) -> bool {
        self.schema.enclosing_owned_dir(path).is_none()
            || self
                .schema
                .preserved_dirs
                .iter()
                .chain(&self.schema.shared_dirs)
                .any(|dir| path.starts_with(dir))
    }

    fn plan_merge(&self, path: &Path, spec: &MergeSpec, out: &mut Vec<Action>) -> Result<()> {
        let format = spec.format_for(path)?;
        let mut doc = match self.load_document(path, format)? {
            Some(doc) => doc,
            None if spec.create => Document::empty(format),
            None => {
                log::debug!("{} does not exist, skipping merge", path.display());
                return Ok(());
            }
        };
        for entry in &spec.targets {
            let fragment = self.render(path, &entry.fragment)?;
            let changed = doc
                .merge(&self.schema.marker, &entry.target, &fragment)
                .map_err(|source| malformed(path, source))?;
            if changed || self.install() {
                out.push(Action::MergeDocument {
                    path: path.to_path_buf(),
                    format,
                    target: entry.target.clone(),
                    fragment,
                });
            } else {
                log::debug!(
                    "{} [{}] already up to date",
                    path.display(),
                    entry.target.display_key()
                );
            }
        }
        Ok(())
    }

    fn plan_unmerge(&self, path: &Path, spec: &MergeSpec, out: &mut Vec<Action>) -> Result<()> {
        let format = spec.format_for(path)?;
        let Some(mut doc) = self.load_document(path, format)? else {
            return Ok(());
        };
        for entry in &spec.targets {
            let changed = doc
                .unmerge(&self.schema.marker, &entry.target)
                .map_err(|source| malformed(path, source))?;
            if changed {
                out.push(Action::UnmergeDocument {
                    path: path.to_path_buf(),
                    format,
                    target: entry.target.clone(),
                });
            }
        }
        Ok(())
    }

    fn plan_patch(&self, path: &Path, spec: &PatchSpec, out: &mut Vec<Action>) -> Result<()> {
        let patch = self.render_patch(path, spec)?;
        let current = self.load_text(path, "patch")?;
        let patched = patch
            .apply(current)
            .map_err(|source| patch_error(path, source))?;
        if self.install() || current != Some(patched.as_str()) {
            out.push(Action::PatchText {
                path: path.to_path_buf(),
                patch,
            });
        } else {
            log::debug!("{} already patched", path.display());
        }
        Ok(())
    }

    fn plan_unpatch(&self, path: &Path, spec: &PatchSpec, out: &mut Vec<Action>) -> Result<()> {
        let Some(current) = self.load_text(path, "unpatch")? else {
            return Ok(());
        };
        let patch = self.render_patch(path, spec)?;
        let reverted = patch
            .revert(current)
            .map_err(|source| patch_error(path, source))?;
        if reverted != current {
            out.push(Action::UnpatchText {
                path: path.to_path_buf(),
                patch,
            });
        }
        Ok(())
    }

    fn package_delta(&self) -> (Vec<String>, Vec<String>) {
        let active: Vec<&str> = self
            .schema
            .package_rules
            .iter()
            .filter(|rule| rule.when.eval(self.ctx))
            .map(|rule| rule.name.as_str())
            .collect();

        let mut seen = BTreeSet::new();
        let mut pick = |keep: &dyn Fn(&str) -> bool| -> Vec<String> {
            active
                .iter()
                .filter(|name| keep(name) && seen.insert(**name))
                .map(|name| (*name).to_string())
                .collect()
        };

        match self.mode {
            Mode::Install | Mode::Upgrade => {
                (pick(&|name: &str| !self.ctx.is_installed(name)), Vec::new())
            }
            Mode::Uninstall => (Vec::new(), Vec::new()),
            Mode::UninstallFull => {
                let wanted_once = |name: &str| active.iter().filter(|n| **n == name).count() == 1;
                (
                    Vec::new(),
                    pick(&|name: &str| self.ctx.is_installed(name) && wanted_once(name)),
                )
            }
        }
    }

    fn render<T: Clone>(&self, path: &Path, content: &Content<T>) -> Result<T> {
        content.render(self.ctx).map_err(|e| Error::Render {
            path: path.to_path_buf(),
            message: format!("{e:#}"),
        })
    }

    fn render_patch(&self, path: &Path, spec: &PatchSpec) -> Result<textpatch::Patch> {
        spec.to_patch(self.ctx).map_err(|e| Error::Render {
            path: path.to_path_buf(),
            message: format!("{e:#}"),
        })
    }

    fn load_document(&self, path: &Path, format: docmerge::Format) -> Result<Option<Document>> {
        let Some(text) = self.load_text(path, "merge into")? else {
            return Ok(None);
        };
        Document::parse(text, format)
            .map(Some)
            .map_err(|source| malformed(path, source))
    }

    fn load_text(&self, path: &Path, op: &'static str) -> Result<Option<&str>> {
        match self.ctx.state(path) {
            PathState::Missing => Ok(None),
            PathState::File { bytes, .. } => std::str::from_utf8(bytes)
                .map(Some)
                .map_err(|_| Error::NotUtf8 {
                    path: path.to_path_buf(),
                }),
            PathState::Dir | PathState::Other => Err(Error::io(
                op,
                path,
                io::Error::other("not a regular file"),
            )),
        }
    }
}

fn write(path: &Path, contents: String, executable: bool, state: &PathState) -> Action {
    Action::WriteFile {
        path: path.to_path_buf(),
        contents,
        executable,
        reason: if state.exists() {
            WriteReason::Replace
        } else {
            WriteReason::Create
        },
    }
}

fn delete(path: &Path, keep: Vec<PathBuf>) -> Action {
    Action::DeletePath {
        path: path.to_path_buf(),
        keep,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Condition, FileRule, PackageRule};
    use crate::version::Version;
    use docmerge::{Marker, Target};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const START: &str = "<!-- veneer:start -->";
    const END: &str = "<!-- veneer:end -->";

    fn schema() -> Schema {
        Schema::new(".veneer/VERSION", Marker::new("_veneer", "managed"))
            .owned_dir(".veneer")
            .preserved_dir(".veneer/notes")
            .shared_dir(".githooks")
            .owned_file(".veneer/guide.md", FileRule::new("# Guide\n"))
            .owned_file(".githooks/pre-commit", FileRule::new("#!/bin/sh\nveneer check\n").executable())
            .managed_file("veneer.local.toml", FileRule::new("# local overrides\n"))
            .merge(
                ".claude/settings.json",
                MergeSpec::new().target(
                    Target::array(&["hooks", "Stop"], Some("command")),
                    json!([{"command": "veneer check"}]),
                ),
            )
            .patch("AGENTS.md", PatchSpec::block(START, END, "Read .veneer/guide.md"))
            .package(PackageRule::new("husky").when(Condition::Capability("git".into())))
            .package(PackageRule::new("prettier"))
    }

    fn ctx() -> crate::context::ContextBuilder {
        Context::builder("/project", Version::parse("1.2.0").unwrap())
    }

    fn configured() -> crate::context::ContextBuilder {
        ctx().stored_version(Version::parse("1.2.0").unwrap())
    }

    fn paths(actions: &[Action]) -> Vec<String> {
        actions.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn install_on_empty_project() {
        let ctx = ctx().capability("git").build();
        let result = plan(&schema(), &ctx, Mode::Install).unwrap();
        assert_eq!(
            paths(&result.actions),
            vec![
                "mkdir .githooks",
                "mkdir .veneer",
                "mkdir .veneer/notes",
                "create .githooks/pre-commit",
                "create .veneer/guide.md",
                "create veneer.local.toml",
                "create .veneer/VERSION",
                "merge .claude/settings.json [hooks.Stop]",
                "patch AGENTS.md",
            ]
        );
        assert_eq!(result.packages_to_install, vec!["husky", "prettier"]);
        assert!(result.packages_to_remove.is_empty());
        assert!(!result.applied);
    }

    #[test]
    fn install_refuses_configured_project() {
        let err = plan(&schema(), &configured().build(), Mode::Install).unwrap_err();
        assert!(matches!(err, Error::AlreadyConfigured { .. }));
    }

    #[test]
    fn upgrade_and_uninstall_need_configured_project() {
        for mode in [Mode::Upgrade, Mode::Uninstall, Mode::UninstallFull] {
            let err = plan(&schema(), &ctx().build(), mode).unwrap_err();
            assert!(matches!(err, Error::NotConfigured));
        }
    }

    #[test]
    fn upgrade_refuses_downgrade() {
        let ctx = ctx()
            .stored_version(Version::parse("99.99.99").unwrap())
            .build();
        let err = plan(&schema(), &ctx, Mode::Upgrade).unwrap_err();
        assert!(matches!(err, Error::Downgrade { stored, tool } if stored == "99.99.99" && tool == "1.2.0"));
    }

    #[test]
    fn upgrade_rewrites_only_hand_edited_owned_file() {
        let settings = json!({"hooks": {"Stop": [{"command": "veneer check", "_veneer": "managed"}]}});
        let ctx = configured()
            .dir(".veneer")
            .dir(".veneer/notes")
            .dir(".githooks")
            .file(".veneer/VERSION", "1.2.0\n")
            .file(".veneer/guide.md", "# Guide (edited)\n")
            .executable_file(".githooks/pre-commit", "#!/bin/sh\nveneer check\n")
            .file("veneer.local.toml", "mine\n")
            .file(".claude/settings.json", settings.to_string())
            .file("AGENTS.md", format!("{START}\nRead .veneer/guide.md\n{END}\n"))
            .build();
        let result = plan(&schema(), &ctx, Mode::Upgrade).unwrap();
        assert_eq!(
            result.actions,
            vec![Action::WriteFile {
                path: PathBuf::from(".veneer/guide.md"),
                contents: "# Guide\n".to_string(),
                executable: false,
                reason: WriteReason::Replace,
            }]
        );
    }

    #[test]
    fn upgrade_restores_missing_executable_bit() {
        let ctx = configured()
            .file(".githooks/pre-commit", "#!/bin/sh\nveneer check\n")
            .build();
        let result = plan(&schema(), &ctx, Mode::Upgrade).unwrap();
        assert!(paths(&result.actions).contains(&"update .githooks/pre-commit".to_string()));
    }

    #[test]
    fn upgrade_updates_stale_block_between_markers() {
        let ctx = configured()
            .file("AGENTS.md", format!("intro\n\n{START}\nold text\n{END}\n\noutro\n"))
            .build();
        let result = plan(&schema(), &ctx, Mode::Upgrade).unwrap();
        let patch = result
            .actions
            .iter()
            .find_map(|a| match a {
                Action::PatchText { patch, .. } => Some(patch),
                _ => None,
            })
            .unwrap();
        let current = format!("intro\n\n{START}\nold text\n{END}\n\noutro\n");
        assert_eq!(
            patch.apply(Some(&current)).unwrap(),
            format!("intro\n\n{START}\nRead .veneer/guide.md\n{END}\n\noutro\n")
        );
    }

    #[test]
    fn uninstall_orders_removals_and_keeps_user_content() {
        let ctx = configured()
            .dir(".veneer")
            .dir(".veneer/notes")
            .dir(".githooks")
            .file("veneer.local.toml", "# local overrides\n")
            .file(".githooks/pre-commit", "x")
            .file(
                ".claude/settings.json",
                json!({"hooks": {"Stop": [{"command": "veneer check", "_veneer": "managed"}, {"command": "mine"}]}})
                    .to_string(),
            )
            .file("AGENTS.md", format!("# Agents\n\n{START}\nx\n{END}\n"))
            .build();
        let result = plan(&schema(), &ctx, Mode::Uninstall).unwrap();
        assert_eq!(
            paths(&result.actions),
            vec![
                "unpatch AGENTS.md",
                "unmerge .claude/settings.json [hooks.Stop]",
                "delete .githooks/pre-commit",
                "delete .veneer (keeping 1)",
            ]
        );
        assert!(result.packages_to_install.is_empty());
        assert!(result.packages_to_remove.is_empty());
    }

    #[test]
    fn uninstall_full_removes_only_pristine_managed_files() {
        let pristine = configured()
            .file("veneer.local.toml", "# local overrides\n")
            .build();
        let result = plan(&schema(), &pristine, Mode::UninstallFull).unwrap();
        assert_eq!(paths(&result.actions), vec!["delete veneer.local.toml"]);

        let edited = configured()
            .file("veneer.local.toml", "# local overrides!\n")
            .build();
        let result = plan(&schema(), &edited, Mode::UninstallFull).unwrap();
        assert!(result.actions.is_empty());

        let plain = plan(&schema(), &pristine, Mode::Uninstall).unwrap();
        assert!(plain.actions.is_empty());
    }

    #[test]
    fn retained_managed_file_inside_owned_dir_is_kept() {
        let schema = schema().managed_file(".veneer/local.md", FileRule::new("seed\n"));
        let ctx = configured()
            .dir(".veneer")
            .file(".veneer/local.md", "customised\n")
            .build();
        let result = plan(&schema, &ctx, Mode::UninstallFull).unwrap();
        assert_eq!(
            result.actions,
            vec![Action::DeletePath {
                path: PathBuf::from(".veneer"),
                keep: vec![PathBuf::from(".veneer/local.md")],
            }]
        );
    }

    #[test]
    fn owned_file_in_preserved_dir_is_deleted_explicitly() {
        let schema = schema().owned_file(".veneer/notes/README.md", FileRule::new("notes\n"));
        let ctx = configured()
            .dir(".veneer")
            .dir(".veneer/notes")
            .file(".veneer/notes/README.md", "notes\n")
            .file(".veneer/notes/mine.md", "mine\n")
            .build();
        let result = plan(&schema, &ctx, Mode::Uninstall).unwrap();
        assert_eq!(
            result.actions,
            vec![
                Action::DeletePath {
                    path: PathBuf::from(".veneer/notes/README.md"),
                    keep: Vec::new(),
                },
                Action::DeletePath {
                    path: PathBuf::from(".veneer"),
                    keep: vec![PathBuf::from(".veneer/notes")],
                },
            ]
        );
    }

    #[test]
    fn uninstall_full_keeps_packages_other_rules_want() {
        let schema = schema().package(PackageRule::new("prettier").when(Condition::Capability("git".into())));
        let ctx = configured()
            .capability("git")
            .package("husky", "9")
            .package("prettier", "3")
            .build();
        let result = plan(&schema, &ctx, Mode::UninstallFull).unwrap();
        assert_eq!(result.packages_to_remove, vec!["husky"]);
    }

    #[test]
    fn conditional_owned_file_is_removed_when_condition_stops_holding() {
        let schema = schema().owned_file(
            ".veneer/git.md",
            FileRule::new("git notes\n").when(Condition::Capability("git".into())),
        );
        let ctx = configured().file(".veneer/git.md", "git notes\n").build();
        let result = plan(&schema, &ctx, Mode::Upgrade).unwrap();
        assert!(paths(&result.actions).contains(&"delete .veneer/git.md".to_string()));
    }

    #[test]
    fn generator_failure_is_a_render_error() {
        let schema = schema().owned_file(
            ".veneer/broken.md",
            FileRule::new(Content::<String>::generated(|_| {
                anyhow::bail!("missing variable `x`")
            })),
        );
        let err = plan(&schema, &ctx().build(), Mode::Install).unwrap_err();
        assert!(matches!(&err, Error::Render { path, .. } if path == Path::new(".veneer/broken.md")));
        assert!(err.to_string().contains("missing variable `x`"));
    }

    #[test]
    fn malformed_document_aborts_planning() {
        let ctx = configured().file(".claude/settings.json", "{ nope").build();
        let err = plan(&schema(), &ctx, Mode::Upgrade).unwrap_err();
        assert!(matches!(err, Error::MalformedDocument { .. }));
    }

    #[test]
    fn merge_into_missing_document_respects_create_flag() {
        let schema = schema().merge(
            "package.json",
            MergeSpec::new()
                .existing_only()
                .target(Target::object(&["scripts"]), json!({"lint": "veneer lint"})),
        );
        let result = plan(&schema, &ctx().build(), Mode::Install).unwrap();
        assert!(!paths(&result.actions).iter().any(|a| a.contains("package.json")));
    }
}
