//! Human and JSON output for reconcile results

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::Colorize;
use docmerge::Document;
use reconcile::{Action, Context, Mode, ReconcileResult, Schema};
use serde::Serialize;
use similar::{ChangeTag, TextDiff};

use crate::ui;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_actions(actions: &[Action]) {
    for action in actions {
        println!("  {} {}", ui::action_symbol(action), action);
    }
}

/// Packages are never installed by veneer, only reported
pub fn print_packages(result: &ReconcileResult) {
    if !result.packages_to_install.is_empty() {
        ui::section("Packages to install");
        for name in &result.packages_to_install {
            println!("  {} {}", "+".green(), name);
        }
    }
    if !result.packages_to_remove.is_empty() {
        ui::section("Packages no longer needed");
        for name in &result.packages_to_remove {
            println!("  {} {}", "-".red(), name);
        }
    }
    if !result.packages_to_install.is_empty() || !result.packages_to_remove.is_empty() {
        ui::dim("veneer does not run your package manager; apply these yourself");
    }
}

/// Full report of a reconcile call; `listed` skips the action list when it was already shown
pub fn print_result(result: &ReconcileResult, root: &Path, listed: bool) {
    if result.is_noop() {
        ui::success(&match result.mode {
            Mode::Install | Mode::Upgrade => "Overlay is up to date, nothing to do".to_string(),
            Mode::Uninstall | Mode::UninstallFull => "Nothing left to remove".to_string(),
        });
        return;
    }

    if !listed && !result.actions.is_empty() {
        ui::header(&format!("veneer {} in {}", result.mode, crate::paths::display(root)));
        print_actions(&result.actions);
    }
    print_packages(result);

    println!();
    let (created, changed, removed) = result.summary();
    let counts = format!("{created} created, {changed} changed, {removed} removed");
    let total = ui::plural(result.actions.len(), "action");
    if result.applied {
        ui::success(&format!("Applied {total} ({counts})"));
    } else {
        ui::info(&format!("Dry run: {total} would be applied ({counts})"));
    }
}

/// Show unified diffs of every file the actions would rewrite
pub fn print_diffs(schema: &Schema, ctx: &Context, actions: &[Action]) {
    let files = match preview(schema, ctx, actions) {
        Ok(files) => files,
        Err(e) => {
            ui::warn(&format!("Could not compute diffs: {e:#}"));
            return;
        }
    };

    for (path, after) in &files {
        let before = original(ctx, path).unwrap_or_default();
        let after = after.as_deref().unwrap_or_default();
        if before == after {
            continue;
        }
        ui::section(&path.display().to_string());
        print_text_diff(&before, after);
    }
}

fn print_text_diff(before: &str, after: &str) {
    let diff = TextDiff::from_lines(before, after);
    for hunk in diff.unified_diff().context_radius(2).iter_hunks() {
        println!("  {}", hunk.header().to_string().cyan());
        for change in hunk.iter_changes() {
            let line = match change.tag() {
                ChangeTag::Delete => format!("- {change}").red(),
                ChangeTag::Insert => format!("+ {change}").green(),
                ChangeTag::Equal => format!("  {change}").dimmed(),
            };
            print!("  {line}");
            if change.missing_newline() {
                println!();
            }
        }
    }
}

/// Final text of each file the actions touch, `None` when it ends up deleted
fn preview(
    schema: &Schema,
    ctx: &Context,
    actions: &[Action],
) -> Result<BTreeMap<PathBuf, Option<String>>> {
    let mut files: BTreeMap<PathBuf, Option<String>> = BTreeMap::new();
    let current = |files: &BTreeMap<PathBuf, Option<String>>, path: &Path| match files.get(path) {
        Some(text) => text.clone(),
        None => original(ctx, path),
    };

    for action in actions {
        let path = action.path().to_path_buf();
        let next = match action {
            Action::CreateDir { .. } => continue,
            Action::WriteFile { contents, .. } => Some(contents.clone()),
            Action::DeletePath { keep, .. } => {
                if !keep.is_empty() || ctx.state(&path).is_dir() {
                    continue;
                }
                None
            }
            Action::MergeDocument {
                format,
                target,
                fragment,
                ..
            } => {
                let mut doc = match current(&files, &path) {
                    Some(text) => Document::parse(&text, *format)?,
                    None => Document::empty(*format),
                };
                doc.merge(&schema.marker, target, fragment)?;
                Some(doc.render()?)
            }
            Action::UnmergeDocument { format, target, .. } => {
                let Some(text) = current(&files, &path) else {
                    continue;
                };
                let mut doc = Document::parse(&text, *format)?;
                doc.unmerge(&schema.marker, target)?;
                Some(doc.render()?)
            }
            Action::PatchText { patch, .. } => {
                Some(patch.apply(current(&files, &path).as_deref())?)
            }
            Action::UnpatchText { patch, .. } => {
                let Some(text) = current(&files, &path) else {
                    continue;
                };
                Some(patch.revert(&text)?)
            }
        };
        files.insert(path, next);
    }
    Ok(files)
}

fn original(ctx: &Context, path: &Path) -> Option<String> {
    ctx.state(path)
        .bytes()
        .map(|b| String::from_utf8_lossy(b).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reconcile::{FileRule, Marker, MergeSpec, PatchSpec, Target, Version};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(".t/VERSION", Marker::new("_t", true))
            .owned_dir(".t")
            .owned_file(".t/a.md", FileRule::new("new\n"))
            .merge(
                "settings.json",
                MergeSpec::new().target(Target::object(&["env"]), json!({"A": "1"})),
            )
            .patch("NOTES.md", PatchSpec::lines("see .t/a.md"))
    }

    #[test]
    fn preview_accumulates_per_file() {
        let schema = schema();
        let ctx = Context::builder("/p", Version::parse("1.0.0").unwrap())
            .stored_version(Version::parse("0.9.0").unwrap())
            .dir(".t")
            .file(".t/a.md", "old\n")
            .file(".t/VERSION", "0.9.0\n")
            .file("settings.json", "{\n  \"user\": true\n}\n")
            .file("NOTES.md", "mine\n")
            .build();
        let result = reconcile::plan(&schema, &ctx, Mode::Upgrade).unwrap();
        let files = preview(&schema, &ctx, &result.actions).unwrap();

        assert_eq!(files[Path::new(".t/a.md")].as_deref(), Some("new\n"));
        assert_eq!(files[Path::new(".t/VERSION")].as_deref(), Some("1.0.0\n"));
        assert_eq!(files[Path::new("NOTES.md")].as_deref(), Some("see .t/a.md\nmine\n"));
        let settings: serde_json::Value =
            serde_json::from_str(files[Path::new("settings.json")].as_deref().unwrap()).unwrap();
        assert_eq!(
            settings,
            json!({"user": true, "env": {"A": "1", "_t:owned": ["A"]}})
        );
    }

    #[test]
    fn preview_of_uninstall_skips_directory_deletes() {
        let schema = schema();
        let ctx = Context::builder("/p", Version::parse("1.0.0").unwrap())
            .stored_version(Version::parse("1.0.0").unwrap())
            .dir(".t")
            .file(".t/a.md", "new\n")
            .file("NOTES.md", "see .t/a.md\nmine\n")
            .build();
        let result = reconcile::plan(&schema, &ctx, Mode::Uninstall).unwrap();
        let files = preview(&schema, &ctx, &result.actions).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[Path::new("NOTES.md")].as_deref(), Some("mine\n"));
    }
}
