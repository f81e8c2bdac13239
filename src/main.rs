mod cli;
mod config;
mod history;
mod repository;
mod state;
mod util;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use config::UndoConfig;
use history::{UndoEngine, UndoOutcome};
use repository::GitBackend;
use state::EngineState;
use util::{format_timestamp, short_id};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    // Setup may initialize a fresh repository; everything else requires one
    let backend = if matches!(cli.command, Command::Setup) {
        GitBackend::discover_or_init(&cli.repo_path)?
    } else {
        GitBackend::discover(&cli.repo_path)?
    };

    let repo_root = backend
        .workdir()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cli.repo_path.clone());
    let config = UndoConfig::load(&repo_root)?;
    let git_dir = backend.git_dir().to_path_buf();

    let mut engine = UndoEngine::new(backend, &config);
    let persisted = EngineState::load(&git_dir)?;
    engine.restore_state(&persisted);

    let mut failed = false;
    match cli.command {
        Command::Setup => {
            engine.install().context("failed to install the undo engine")?;
            println!("history branch '{}' ready", engine.undo_branch_name());
        }
        Command::Status => {
            println!("installed: {}", engine.is_installed()?);
            println!("history branch: {}", engine.undo_branch_name());
            println!("tracked operations: {}", engine.history_size());
        }
        Command::Track { name } => {
            match engine.record_operation(&name)? {
                Some(id) => println!("recorded '{}' as {}", name, short_id(id)),
                None => println!("working tree clean, nothing to record"),
            }
            engine.check_and_update_repository_for_new_commits()?;
        }
        Command::Check => {
            let state = engine.check_and_update_repository_for_new_commits()?;
            println!("{state:?}");
        }
        Command::Undo => match engine.undo_last_change()? {
            UndoOutcome::Undone => println!("undid the most recent operation"),
            UndoOutcome::MergeCommit => {
                eprintln!("cannot undo: the target is a merge commit");
                failed = true;
            }
            UndoOutcome::NothingToUndo => {
                eprintln!("nothing to undo");
                failed = true;
            }
        },
        Command::Reset => {
            if engine.reset()? {
                println!("history branch reset");
            } else {
                eprintln!("nothing to reset (empty history or dirty working tree)");
                failed = true;
            }
        }
        Command::History { notes } => {
            if notes {
                for (commit, note) in engine.stored_commits_with_notes()? {
                    println!(
                        "{}  {}  [{}]  {}",
                        short_id(commit.id),
                        format_timestamp(commit.seconds),
                        note,
                        commit.summary()
                    );
                }
            } else {
                for commit in engine.stored_commits()? {
                    println!(
                        "{}  {}  {}",
                        short_id(commit.id),
                        format_timestamp(commit.seconds),
                        commit.summary()
                    );
                }
            }
        }
    }

    engine.snapshot_state().save(&git_dir)?;
    if failed {
        std::process::exit(1);
    }
    Ok(())
}
