mod engine;
mod monitor;

pub use engine::{HistoryError, Result, UndoEngine, UndoOutcome};
pub use monitor::{CommitMonitor, RepositoryCommitState};

/// Note marking a history commit not yet attributed to a named branch
pub const DEFAULT_NOTE: &str = "*WT";
/// Note marking a history commit whose effect has been undone
pub const DELETED_COMMIT_NOTE: &str = "*DELETED";

pub const INITIAL_COMMIT_MSG: &str = "repository initial commit";
pub const UNDO_INSTALL_COMMIT_MSG: &str = "FORGE PLUGIN-UNDO: initial commit";
pub const PREPARE_UNDO_COMMIT_MSG: &str = "FORGE PLUGIN-UNDO: preparing to undo a change";
pub const UNDO_STORE_COMMIT_MSG_PREFIX: &str = "history-branch: changes introduced by the ";
