use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "forge-undo", about = "Per-operation undo on a git history branch")]
pub struct Cli {
    /// Path to the git repository
    #[arg(long, default_value = ".")]
    pub repo_path: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize the repository and create the history branch
    Setup,
    /// Show whether the engine is installed and how much history it tracks
    Status,
    /// Mirror the current working-tree changes onto the history branch
    /// as one operation
    Track {
        /// Name of the operation that produced the changes
        name: String,
    },
    /// Poll for new commits and update history-branch attribution
    Check,
    /// Undo the most recent tracked operation
    Undo,
    /// Discard all tracked history and start over
    Reset,
    /// List the tracked operations, most recent first
    History {
        /// Also show each commit's attribution note
        #[arg(long)]
        notes: bool,
    },
}
