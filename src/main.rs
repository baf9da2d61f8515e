mod cli;
mod commands;
mod detect;
mod overlay;
mod paths;
mod progress;
mod report;
mod settings;
mod templates;
mod ui;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use reconcile::ErrorKind;

/// Global context for the application
pub struct AppContext {
    pub quiet: bool,
    pub root: PathBuf,
    pub overlay: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            ui::error(&format!("{err:#}"));
            ExitCode::from(exit_code(&err))
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let app = AppContext {
        quiet: cli.quiet,
        root: cli.root,
        overlay: cli.overlay,
    };

    match cli.command {
        Command::Install(args) => commands::lifecycle::install(&app, args),
        Command::Upgrade(args) => commands::lifecycle::upgrade(&app, args),
        Command::Uninstall(args) => commands::lifecycle::uninstall(&app, args),
        Command::Status(args) => commands::status::run(&app, args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "veneer", &mut io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Precondition failures exit 2, I/O and rollback failures 3, anything else 1
fn exit_code(err: &anyhow::Error) -> u8 {
    let kind = err
        .chain()
        .find_map(|e| e.downcast_ref::<reconcile::Error>())
        .map(reconcile::Error::kind);
    match kind {
        Some(ErrorKind::Precondition) => 2,
        Some(ErrorKind::Io | ErrorKind::Rollback) => 3,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context as _;

    #[test]
    fn exit_codes_follow_error_kind() {
        let precondition = anyhow::Error::new(reconcile::Error::NotConfigured);
        assert_eq!(exit_code(&precondition), 2);

        let io = Err::<(), _>(reconcile::Error::NotUtf8 {
            path: PathBuf::from("AGENTS.md"),
        })
        .context("Could not read project")
        .unwrap_err();
        assert_eq!(exit_code(&io), 3);

        assert_eq!(exit_code(&anyhow::anyhow!("bad overlay")), 1);
    }
}
