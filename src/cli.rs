use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::logging;

#[derive(Debug, Parser)]
#[command(
    name = "clauding",
    version,
    about = "Keep Claude Code's per-project metadata in step with project folders"
)]
struct Cli {
    /// Claude data directory (defaults to ~/.claude).
    #[arg(long, global = true, value_name = "DIR")]
    claude_dir: Option<PathBuf>,

    /// Print the report as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List every project the stores know about, with its health.
    List {
        /// Only orphaned and ambiguous projects.
        #[arg(long)]
        problems: bool,
    },
    /// Move a project folder and repoint every store at the new path.
    Move {
        old_path: PathBuf,
        new_path: PathBuf,
        #[arg(long)]
        dry_run: bool,
        /// Skip backups of the rewritten stores.
        #[arg(long)]
        no_backup: bool,
    },
    /// Remove references to projects whose folder no longer exists.
    Clean {
        /// Orphaned project path to clean; repeatable.
        #[arg(long = "path", value_name = "PATH")]
        paths: Vec<PathBuf>,
        /// Clean every orphaned project.
        #[arg(long)]
        force: bool,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        no_backup: bool,
    },
    /// List the backups taken before earlier edits, newest first.
    Backups,
    /// Put a backup taken before an edit back in place.
    Restore { backup_path: PathBuf },
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let status = if report.ok { "ok" } else { "failed" };
    println!("{}: {status}", report.command);
    for detail in &report.details {
        println!("  {detail}");
    }
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    for issue in &report.issues {
        eprintln!("error: {issue}");
    }
    Ok(())
}

/// Parse arguments, run one command and print its report. Returns whether
/// the command succeeded.
pub fn run() -> Result<bool> {
    let cli = Cli::parse();
    let _ = logging::init(cli.verbose);
    let claude_dir = cli.claude_dir.clone();

    let report = match cli.command {
        Command::List { problems } => {
            commands::project_list::run(&commands::project_list::ProjectListOptions {
                claude_dir,
                problems_only: problems,
            })?
        }
        Command::Move {
            old_path,
            new_path,
            dry_run,
            no_backup,
        } => commands::project_move::run(&commands::project_move::ProjectMoveOptions {
            claude_dir,
            old_path,
            new_path,
            dry_run,
            no_backup,
        })?,
        Command::Clean {
            paths,
            force,
            dry_run,
            no_backup,
        } => commands::project_clean::run(&commands::project_clean::ProjectCleanOptions {
            claude_dir,
            paths,
            force,
            dry_run,
            no_backup,
        })?,
        Command::Backups => {
            commands::backup_list::run(&commands::backup_list::BackupListOptions { claude_dir })?
        }
        Command::Restore { backup_path } => {
            commands::backup_restore::run(&commands::backup_restore::BackupRestoreOptions {
                claude_dir,
                backup_path,
            })?
        }
    };

    print_report(&report, cli.json)?;
    Ok(report.ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn clean_accepts_repeated_paths_after_the_subcommand() {
        let cli = Cli::try_parse_from([
            "clauding", "clean", "--path", "/a", "--path", "/b", "--dry-run", "--json",
        ])
        .expect("parse");
        assert!(cli.json);
        match cli.command {
            Command::Clean { paths, dry_run, .. } => {
                assert_eq!(paths, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
                assert!(dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
