use std::path::PathBuf;
use thiserror::Error;

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors surfaced by the version-control backend.
///
/// The named variants are the ones the undo engine matches on; everything
/// else is carried through as a raw `git2` or IO error.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The working tree is already clean
    #[error("nothing to commit, working tree clean")]
    NothingToCommit,

    /// Branch creation hit an existing ref
    #[error("a ref named '{name}' already exists")]
    RefAlreadyExists { name: String },

    /// Checkout target does not exist
    #[error("ref '{name}' not found")]
    RefNotFound { name: String },

    /// Checkout would overwrite local modifications
    #[error("checkout of '{name}' would overwrite local modifications")]
    CheckoutConflict { name: String },

    /// Reverting merge commits is unsupported
    #[error("commit {id} has multiple parents and cannot be reverted")]
    MultipleParentsNotAllowed { id: git2::Oid },

    /// No git repository at or above the given path
    #[error("no git repository found at {path}")]
    NoRepository { path: PathBuf },

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
