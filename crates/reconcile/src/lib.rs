//! # reconcile
//!
//! Maintain a tool-owned overlay inside a project directory that humans
//! also edit.
//!
//! ## Core Concepts
//!
//! - **Schema**: what the overlay consists of (owned and managed files,
//!   owned, preserved and shared directories, document merges, text patches,
//!   package rules)
//! - **Context**: a one-shot snapshot of the project the planner reads from
//! - **Planner**: `Schema + Context + Mode -> ReconcileResult`, pure
//! - **Applier**: executes the action list behind a backup that is restored
//!   if anything fails
//!
//! A dry run calls the same planner and stops before the applier, so the
//! preview is exactly what a live run would do.
//!
//! ## Example
//!
//! ```no_run
//! use reconcile::{
//!     Context, FileRule, Mode, NoProgress, ReconcileOptions, Schema, SnapshotOptions, reconcile,
//! };
//! use docmerge::Marker;
//!
//! let schema = Schema::new(".tool/VERSION", Marker::new("_tool", "managed"))
//!     .owned_dir(".tool")
//!     .owned_file(".tool/README.md", FileRule::new("Generated, do not edit.\n"));
//!
//! let opts = SnapshotOptions { tool_version: "1.0.0".into(), ..Default::default() };
//! let ctx = Context::snapshot(".", &schema, opts)?;
//! let result = reconcile(&schema, &ctx, Mode::Install, &ReconcileOptions::default(), &mut NoProgress)?;
//! assert!(result.applied);
//! # Ok::<(), reconcile::Error>(())
//! ```

pub mod action;
pub mod applier;
pub mod backup;
pub mod context;
pub mod error;
pub mod planner;
pub mod schema;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use action::{Action, WriteReason};
pub use applier::{ApplyObserver, NoProgress, apply};
pub use context::{Context, ContextBuilder, PathState, SnapshotOptions};
pub use error::{Error, ErrorKind, Result};
pub use planner::plan;
pub use schema::{
    Condition, Content, FileRule, Generator, MergeSpec, MergeTarget, PackageRule, PatchSpec,
    Schema,
};
pub use types::{Mode, ReconcileOptions, ReconcileResult};
pub use version::Version;

pub use docmerge::{Format, Marker, Shape, Target};
pub use textpatch::{Patch, Position, Strategy};

/// Plan `mode` and, unless this is a dry run, apply it.
///
/// Fails before touching the filesystem on any precondition, schema or
/// render error. Apply failures roll back and return the original error.
pub fn reconcile<O: ApplyObserver + ?Sized>(
    schema: &Schema,
    ctx: &Context,
    mode: Mode,
    opts: &ReconcileOptions,
    observer: &mut O,
) -> Result<ReconcileResult> {
    let mut result = plan(schema, ctx, mode)?;
    if opts.dry_run {
        log::debug!("dry run, {} action(s) not applied", result.actions.len());
        return Ok(result);
    }
    apply(ctx.root(), schema, &result.actions, observer)?;
    result.applied = true;
    Ok(result)
}
