// Shared test fixtures for integration tests
// Functions here are used across different test files
#![allow(dead_code)]

use forge_undo::config::UndoConfig;
use forge_undo::history::UndoEngine;
use forge_undo::repository::GitBackend;
use git2::{Repository, Signature};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create a temporary git repository with no commits
pub fn create_test_repo() -> (TempDir, PathBuf, Repository) {
    let dir = TempDir::new().unwrap();
    let repo_path = dir.path().to_path_buf();
    let repo = Repository::init(&repo_path).unwrap();

    // Configure git user for commits
    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Test User").unwrap();
    config.set_str("user.email", "test@example.com").unwrap();

    (dir, repo_path, repo)
}

/// Write a file into the working tree without committing it
pub fn write_file(repo: &Repository, path: &str, content: &[u8]) {
    let full_path = repo.workdir().unwrap().join(path);
    if let Some(parent) = full_path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&full_path, content).unwrap();
}

/// Add files to the repository and create a commit on HEAD
pub fn add_commit(repo: &Repository, files: &[(&str, &[u8])], message: &str) -> git2::Oid {
    let sig = Signature::now("Test User", "test@example.com").unwrap();

    let mut index = repo.index().unwrap();
    for (path, content) in files {
        write_file(repo, path, content);
        index.add_path(Path::new(path)).unwrap();
    }
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();

    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents).unwrap()
}

/// Engine over an existing repository, default configuration
pub fn create_engine(path: &Path) -> UndoEngine {
    let backend = GitBackend::discover(path).unwrap();
    UndoEngine::new(backend, &UndoConfig::default())
}

/// Engine with the history branch installed
pub fn installed_engine(path: &Path) -> UndoEngine {
    let mut engine = create_engine(path);
    engine.install().unwrap();
    engine
}

/// Perform a tracked operation: write a file, mirror it onto the history
/// branch, then commit it on the working branch (as the operation itself
/// would). Returns the history-branch commit id.
pub fn tracked_operation(
    engine: &mut UndoEngine,
    repo: &Repository,
    name: &str,
    file: &str,
    content: &[u8],
) -> git2::Oid {
    write_file(repo, file, content);
    let id = engine.record_operation(name).unwrap().expect("operation recorded nothing");
    engine
        .backend()
        .stage_all_and_commit(&format!("changes of the '{name}' operation"))
        .unwrap();
    id
}

/// Create a merge commit on the given branch, reusing the branch head's tree
pub fn merge_commit_on_branch(repo: &Repository, branch: &str, message: &str) -> git2::Oid {
    let sig = Signature::now("Test User", "test@example.com").unwrap();
    let head = repo
        .find_branch(branch, git2::BranchType::Local)
        .unwrap()
        .get()
        .peel_to_commit()
        .unwrap();
    let tree = head.tree().unwrap();

    // Dangling side commit to serve as the second parent
    let side = repo.commit(None, &sig, &sig, "side", &tree, &[&head]).unwrap();
    let side = repo.find_commit(side).unwrap();

    repo.commit(
        Some(&format!("refs/heads/{branch}")),
        &sig,
        &sig,
        message,
        &tree,
        &[&head, &side],
    )
    .unwrap()
}
