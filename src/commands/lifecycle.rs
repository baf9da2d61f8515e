//! install, upgrade and uninstall

use std::process::ExitCode;

use anyhow::Result;
use dialoguer::Confirm;
use reconcile::{Mode, NoProgress, ReconcileOptions};

use super::Project;
use crate::AppContext;
use crate::cli::{ApplyArgs, UninstallArgs};
use crate::progress::ApplyProgress;
use crate::{paths, report, ui};

struct Flags {
    dry_run: bool,
    diff: bool,
    json: bool,
    /// Ask before applying, subject to settings and terminal
    confirm: bool,
}

pub fn install(app: &AppContext, args: ApplyArgs) -> Result<ExitCode> {
    run(app, Mode::Install, apply_flags(&args))
}

pub fn upgrade(app: &AppContext, args: ApplyArgs) -> Result<ExitCode> {
    run(app, Mode::Upgrade, apply_flags(&args))
}

pub fn uninstall(app: &AppContext, args: UninstallArgs) -> Result<ExitCode> {
    let mode = if args.full {
        Mode::UninstallFull
    } else {
        Mode::Uninstall
    };
    let flags = Flags {
        dry_run: args.dry_run,
        diff: false,
        json: args.json,
        confirm: !args.yes && !args.dry_run && !args.json,
    };
    run(app, mode, flags)
}

fn apply_flags(args: &ApplyArgs) -> Flags {
    Flags {
        dry_run: args.dry_run,
        diff: args.diff,
        json: args.json,
        confirm: false,
    }
}

fn run(app: &AppContext, mode: Mode, flags: Flags) -> Result<ExitCode> {
    let project = Project::open(app)?;
    let schema = &project.overlay.schema;
    let ctx = &project.ctx;

    let mut listed = false;
    if flags.confirm && project.settings.confirm_uninstall && console::user_attended() {
        let preview = reconcile::reconcile(
            schema,
            ctx,
            mode,
            &ReconcileOptions { dry_run: true },
            &mut NoProgress,
        )?;
        if preview.actions.is_empty() {
            report::print_result(&preview, ctx.root(), false);
            return Ok(ExitCode::SUCCESS);
        }

        ui::header(&format!("veneer {mode} in {}", paths::display(ctx.root())));
        report::print_actions(&preview.actions);
        println!();
        let confirmed = Confirm::new()
            .with_prompt("Remove these from the project?")
            .default(false)
            .interact()?;
        if !confirmed {
            ui::info("Aborted, nothing was changed");
            return Ok(ExitCode::SUCCESS);
        }
        listed = true;
    }

    let mut progress = ApplyProgress::new(app.quiet || flags.json);
    let result = reconcile::reconcile(
        schema,
        ctx,
        mode,
        &ReconcileOptions {
            dry_run: flags.dry_run,
        },
        &mut progress,
    )?;

    if flags.json {
        report::print_json(&result)?;
        return Ok(ExitCode::SUCCESS);
    }
    if app.quiet {
        return Ok(ExitCode::SUCCESS);
    }

    report::print_result(&result, ctx.root(), listed);
    if flags.diff {
        report::print_diffs(schema, ctx, &result.actions);
    }
    Ok(ExitCode::SUCCESS)
}
