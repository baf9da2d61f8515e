//! Health check: what is installed and what an upgrade would change

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use colored::Colorize;
use reconcile::{ErrorKind, Mode, ReconcileResult};
use serde::Serialize;

use super::Project;
use crate::AppContext;
use crate::cli::StatusArgs;
use crate::{paths, report, ui};

#[derive(Debug, Serialize)]
struct StatusReport {
    root: PathBuf,
    overlay: String,
    tool_version: String,
    installed_version: Option<String>,
    capabilities: Vec<String>,
    /// Install preview when unconfigured, upgrade preview otherwise
    pending: Option<ReconcileResult>,
    /// Why no preview could be planned
    problem: Option<String>,
}

impl StatusReport {
    fn is_clean(&self) -> bool {
        self.problem.is_none() && self.pending.as_ref().is_none_or(ReconcileResult::is_noop)
    }
}

pub fn run(app: &AppContext, args: StatusArgs) -> Result<ExitCode> {
    let project = Project::open(app)?;
    let ctx = &project.ctx;

    let mode = if ctx.is_configured() {
        Mode::Upgrade
    } else {
        Mode::Install
    };
    let (pending, problem) = match reconcile::plan(&project.overlay.schema, ctx, mode) {
        Ok(result) => (Some(result), None),
        // e.g. an overlay written by a newer veneer; reported, not fatal
        Err(e) if e.kind() == ErrorKind::Precondition => (None, Some(e.to_string())),
        Err(e) => return Err(e.into()),
    };

    let status = StatusReport {
        root: ctx.root().to_path_buf(),
        overlay: project.overlay.origin.to_string(),
        tool_version: ctx.tool_version().to_string(),
        installed_version: ctx.stored_version().map(ToString::to_string),
        capabilities: ctx.capabilities().iter().cloned().collect(),
        pending,
        problem,
    };

    if args.json {
        report::print_json(&status)?;
    } else if !app.quiet {
        print(&status);
    }

    if args.check && !status.is_clean() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn print(status: &StatusReport) {
    ui::header("veneer status");
    ui::kv("Root", &paths::display(&status.root));
    ui::kv("Overlay", &status.overlay);
    ui::kv("Tool version", &status.tool_version);
    ui::kv(
        "Installed",
        &status
            .installed_version
            .clone()
            .unwrap_or_else(|| "not installed".dimmed().to_string()),
    );
    ui::kv(
        "Capabilities",
        &if status.capabilities.is_empty() {
            "none".dimmed().to_string()
        } else {
            status.capabilities.join(", ")
        },
    );

    if let Some(problem) = &status.problem {
        println!();
        ui::warn(problem);
        return;
    }
    let Some(pending) = &status.pending else {
        return;
    };

    if pending.is_noop() {
        println!();
        ui::success("Overlay is up to date");
        return;
    }

    match pending.mode {
        Mode::Install => ui::section("Not installed; `veneer install` would"),
        _ => ui::section("Drift; `veneer upgrade` would"),
    }
    if pending.actions.is_empty() {
        ui::dim("make no file changes");
    } else {
        report::print_actions(&pending.actions);
    }
    report::print_packages(pending);
}
