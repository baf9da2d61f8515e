use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "veneer")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Lay a tool-owned overlay over a project without clobbering user edits", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Project directory to operate on
    #[arg(short = 'C', long = "root", value_name = "DIR", default_value = ".", global = true)]
    pub root: PathBuf,

    /// Overlay definition to use instead of the configured or bundled one
    #[arg(long, value_name = "FILE", env = "VENEER_OVERLAY", global = true)]
    pub overlay: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Lay the overlay into an unconfigured project
    Install(ApplyArgs),

    /// Bring an installed overlay up to this version and repair drift
    Upgrade(ApplyArgs),

    /// Remove the overlay, keeping managed files and user content
    Uninstall(UninstallArgs),

    /// Show what is installed and what an upgrade would change
    Status(StatusArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Show what would change without touching anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Show a unified diff for every rewritten file
    #[arg(short, long)]
    pub diff: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct UninstallArgs {
    /// Also remove managed files the user never changed, and report packages to remove
    #[arg(long)]
    pub full: bool,

    /// Show what would be removed without touching anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Exit with status 1 when an install or upgrade is pending
    #[arg(long)]
    pub check: bool,

    /// Print the status as JSON
    #[arg(long)]
    pub json: bool,
}
