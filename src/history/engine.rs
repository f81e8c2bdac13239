use git2::Oid;
use std::fs;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::UndoConfig;
use crate::repository::{BackendError, CheckoutGuard, CommitInfo, GitBackend};
use crate::state::{BaselineState, EngineState};

use super::monitor::{CommitMonitor, RepositoryCommitState};
use super::{
    DEFAULT_NOTE, DELETED_COMMIT_NOTE, INITIAL_COMMIT_MSG, PREPARE_UNDO_COMMIT_MSG,
    UNDO_INSTALL_COMMIT_MSG, UNDO_STORE_COMMIT_MSG_PREFIX,
};

/// Result type for undo-engine operations
pub type Result<T> = std::result::Result<T, HistoryError>;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The revert of the target commit was a no-op, which leaves the
    /// repository state ambiguous
    #[error("nothing could be reverted on the history branch")]
    NothingToRevert,

    /// The merge-commit short-circuit could not check the previous branch
    /// back out
    #[error("failed to roll back to the previous branch after a merge-commit revert: {0}")]
    RollbackFailed(#[source] BackendError),
}

/// Outcome of [`UndoEngine::undo_last_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
    /// The newest attributable operation was reverted
    Undone,
    /// The target was a merge commit; no graph mutation survived
    MergeCommit,
    /// Empty history or no attributable commit
    NothingToUndo,
}

/// Orchestrates the history branch: mirrors tracked operations onto it,
/// attributes them via commit notes, and translates the monitor's drift
/// classification into branch-graph operations.
///
/// Assumes exclusive access to the repository for the duration of any one
/// call; callers serialize invocations.
pub struct UndoEngine {
    backend: GitBackend,
    branch_name: String,
    monitor: CommitMonitor,
    history_size: usize,
}

impl UndoEngine {
    pub fn new(backend: GitBackend, config: &UndoConfig) -> Self {
        let branch_name = config.history_branch.clone();
        let monitor = CommitMonitor::new(&branch_name);
        Self { backend, branch_name, monitor, history_size: 0 }
    }

    pub fn backend(&self) -> &GitBackend {
        &self.backend
    }

    /// Name of the history branch
    pub fn undo_branch_name(&self) -> &str {
        &self.branch_name
    }

    /// Number of commits appended to the history branch since the last reset
    pub fn history_size(&self) -> usize {
        self.history_size
    }

    /// Called by the operation-attribution collaborator after it appends a
    /// commit to the history branch outside of [`record_operation`]
    pub fn increase_history_size(&mut self) {
        self.history_size += 1;
    }

    /// One-time bootstrap, idempotent.
    ///
    /// Ensures the repository has at least one commit, commits any
    /// outstanding working-tree changes so the tree is clean before tracking
    /// begins, and creates the history branch at the current head.
    pub fn install(&mut self) -> Result<()> {
        if self.backend.local_branches()?.is_empty() {
            self.write_bootstrap_ignore()?;
            let ignore = std::path::Path::new(".gitignore");
            match self.backend.stage_path_and_commit(ignore, INITIAL_COMMIT_MSG) {
                Ok(_) | Err(BackendError::NothingToCommit) => {}
                Err(e) => return Err(e.into()),
            }
        }

        match self.backend.stage_all_and_commit(UNDO_INSTALL_COMMIT_MSG) {
            Ok(_) | Err(BackendError::NothingToCommit) => {}
            Err(e) => return Err(e.into()),
        }

        match self.backend.create_branch(&self.branch_name) {
            Ok(()) => debug!(branch = %self.branch_name, "created history branch"),
            Err(BackendError::RefAlreadyExists { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// True iff the history branch exists among local branches; read-only
    pub fn is_installed(&self) -> Result<bool> {
        Ok(self.backend.local_branches()?.iter().any(|b| b == &self.branch_name))
    }

    /// Poll the monitor and react to its classification.
    ///
    /// A single new commit gets attributed: every non-deleted default-marked
    /// note on the history branch is replaced with the name of the branch
    /// that produced the commit. Anything more ambiguous forces a full
    /// [`reset`](Self::reset).
    pub fn check_and_update_repository_for_new_commits(&mut self) -> Result<RepositoryCommitState> {
        let state = self.monitor.poll(&self.backend)?;
        match state {
            RepositoryCommitState::NoChanges => {}
            RepositoryCommitState::OneNewCommit => {
                let branch = self.monitor.branch_with_new_commit().map(str::to_owned);
                if let Some(branch) = branch {
                    self.reattribute_default_notes(&branch)?;
                }
            }
            RepositoryCommitState::MultipleChangedCommits => {
                self.reset()?;
            }
        }
        Ok(state)
    }

    /// Replace every default-marked note with the given branch name.
    ///
    /// In the steady state exactly one such note exists, but the scan stays
    /// safe if more accumulate.
    fn reattribute_default_notes(&self, branch: &str) -> Result<()> {
        for (id, note) in self.backend.list_notes()? {
            if note == DELETED_COMMIT_NOTE {
                continue;
            }
            if note == DEFAULT_NOTE {
                self.backend.remove_note(id)?;
                self.backend.set_note(id, branch)?;
                debug!(commit = %id, branch, "attributed history commit");
            }
        }
        Ok(())
    }

    /// Undo the most recent attributable operation.
    ///
    /// Prefers a commit still carrying the default marker; failing that, the
    /// newest one tagged with the current working branch's name.
    pub fn undo_last_change(&mut self) -> Result<UndoOutcome> {
        if self.history_size == 0 {
            return Ok(UndoOutcome::NothingToUndo);
        }

        let target = match self.find_latest_commit_with_note(DEFAULT_NOTE)? {
            Some(id) => Some(id),
            None => {
                let current = self.backend.current_branch()?;
                self.find_latest_commit_with_note(&current)?
            }
        };
        let Some(target) = target else {
            return Ok(UndoOutcome::NothingToUndo);
        };

        self.undo_commit(target)
    }

    /// Revert `target` on the history branch, cherry-pick the inverse onto
    /// the working branch, drop the staging revert commit, and mark the
    /// target deleted. The checked-out branch is restored on every exit path.
    fn undo_commit(&self, target: Oid) -> Result<UndoOutcome> {
        let guard = CheckoutGuard::acquire(&self.backend)?;

        if !self.backend.is_clean()? {
            // Safety commit so the branch switches below cannot lose data
            self.backend.stage_all_and_commit(PREPARE_UNDO_COMMIT_MSG)?;
        }

        self.backend.checkout(&self.branch_name)?;
        let reverted = match self.backend.revert(target) {
            Ok(Some(id)) => id,
            Ok(None) => return Err(HistoryError::NothingToRevert),
            Err(BackendError::MultipleParentsNotAllowed { .. }) => {
                guard.restore().map_err(HistoryError::RollbackFailed)?;
                return Ok(UndoOutcome::MergeCommit);
            }
            Err(e) => return Err(e.into()),
        };

        self.backend.checkout(guard.branch())?;
        self.backend.cherry_pick(reverted)?;

        // The history branch only stages the inverse diff; it does not
        // retain the revert commit.
        self.backend.checkout(&self.branch_name)?;
        let one_back = self.backend.resolve("HEAD~1")?;
        self.backend.hard_reset(one_back)?;

        guard.restore()?;

        self.backend.remove_note(target)?;
        self.backend.set_note(target, DELETED_COMMIT_NOTE)?;
        debug!(commit = %target, "undid history commit");
        Ok(UndoOutcome::Undone)
    }

    /// Discard everything tracked on the history branch and start over.
    ///
    /// Returns `false` without mutating anything when nothing has been
    /// tracked yet or the working tree is dirty (resetting then would
    /// destroy uncommitted work).
    pub fn reset(&mut self) -> Result<bool> {
        if self.history_size == 0 {
            return Ok(false);
        }
        if !self.backend.is_clean()? {
            return Ok(false);
        }

        let guard = CheckoutGuard::acquire(&self.backend)?;
        self.backend.checkout(&self.branch_name)?;
        let start = self.backend.resolve(&format!("HEAD~{}", self.history_size))?;
        self.backend.hard_reset(start)?;
        guard.restore()?;

        self.monitor.reset();
        self.history_size = 0;
        debug!("history branch reset");
        Ok(true)
    }

    /// Mirror the current working-tree changes onto the history branch as
    /// one annotated commit.
    ///
    /// This is the operation-attribution step: stash the changes, replay
    /// them on the history branch, commit them with the per-operation
    /// message and the default-marker note, then restore the working branch
    /// with the changes re-applied. Returns `Ok(None)` when the tree is
    /// clean and there is nothing to record.
    pub fn record_operation(&mut self, operation: &str) -> Result<Option<Oid>> {
        if self.backend.is_clean()? {
            return Ok(None);
        }

        let previous = self.backend.current_branch()?;
        self.backend.stash_push()?;

        match self.mirror_stashed_operation(&previous, operation) {
            Ok(id) => {
                self.history_size += 1;
                debug!(commit = %id, operation, "recorded operation");
                Ok(Some(id))
            }
            Err(e) => {
                // Put the caller back where they started; the stash keeps
                // their changes recoverable even if this fails too.
                if let Err(rollback) = self.backend.checkout(&previous) {
                    warn!(branch = %previous, error = %rollback, "failed to restore branch");
                }
                if let Err(rollback) = self.backend.stash_apply() {
                    warn!(error = %rollback, "failed to re-apply stashed changes");
                } else if let Err(rollback) = self.backend.stash_drop() {
                    warn!(error = %rollback, "failed to drop stash");
                }
                Err(e)
            }
        }
    }

    fn mirror_stashed_operation(&mut self, previous: &str, operation: &str) -> Result<Oid> {
        self.backend.checkout(&self.branch_name)?;
        self.backend.stash_apply()?;

        let message = format!("{UNDO_STORE_COMMIT_MSG_PREFIX}'{operation}'");
        let id = self.backend.stage_all_and_commit(&message)?;
        self.backend.set_note(id, DEFAULT_NOTE)?;

        self.backend.checkout(previous)?;
        self.backend.stash_apply()?;
        self.backend.stash_drop()?;
        Ok(id)
    }

    /// Non-deleted commits on the history branch, most recent first, bounded
    /// by the tracked history size. Read-only.
    pub fn stored_commits(&self) -> Result<Vec<CommitInfo>> {
        let mut commits = Vec::new();
        for item in self.backend.walk_from(&self.branch_name)?.take(self.history_size) {
            let info = item?;
            if self.is_deleted(info.id)? {
                continue;
            }
            commits.push(info);
        }
        Ok(commits)
    }

    /// Like [`stored_commits`](Self::stored_commits), pairing each commit
    /// with its note text (empty string when the commit has no note)
    pub fn stored_commits_with_notes(&self) -> Result<Vec<(CommitInfo, String)>> {
        let mut commits = Vec::new();
        for item in self.backend.walk_from(&self.branch_name)?.take(self.history_size) {
            let info = item?;
            match self.backend.note_of(info.id)? {
                Some(note) if note == DELETED_COMMIT_NOTE => continue,
                Some(note) => commits.push((info, note)),
                None => commits.push((info, String::new())),
            }
        }
        Ok(commits)
    }

    /// Newest non-deleted history commit whose note equals `wanted`
    fn find_latest_commit_with_note(&self, wanted: &str) -> Result<Option<Oid>> {
        for item in self.backend.walk_from(&self.branch_name)?.take(self.history_size) {
            let info = item?;
            let Some(note) = self.backend.note_of(info.id)? else {
                continue;
            };
            if note == DELETED_COMMIT_NOTE {
                continue;
            }
            if note == wanted {
                return Ok(Some(info.id));
            }
        }
        Ok(None)
    }

    fn is_deleted(&self, id: Oid) -> Result<bool> {
        Ok(self.backend.note_of(id)?.as_deref() == Some(DELETED_COMMIT_NOTE))
    }

    fn write_bootstrap_ignore(&self) -> Result<()> {
        if let Some(workdir) = self.backend.workdir() {
            let path = workdir.join(".gitignore");
            if !path.exists() {
                fs::write(&path, "").map_err(BackendError::from)?;
            }
        }
        Ok(())
    }

    /// Snapshot of the mutable engine state, for persistence across
    /// short-lived processes
    pub fn snapshot_state(&self) -> EngineState {
        EngineState {
            history_size: self.history_size,
            baseline: self.monitor.baseline().map(|(branch, head)| BaselineState {
                branch: branch.to_string(),
                head: head.to_string(),
            }),
        }
    }

    /// Restore a previously persisted snapshot. A baseline whose head no
    /// longer parses is dropped back to bootstrap.
    pub fn restore_state(&mut self, state: &EngineState) {
        self.history_size = state.history_size;
        if let Some(baseline) = &state.baseline {
            match Oid::from_str(&baseline.head) {
                Ok(head) => self.monitor.restore_baseline(baseline.branch.clone(), head),
                Err(_) => warn!(head = %baseline.head, "discarding unparsable monitor baseline"),
            }
        }
    }
}
