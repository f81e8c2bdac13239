use git2::Oid;
use tracing::debug;

use crate::repository::{GitBackend, Result};

/// Per-poll classification of drift on the working branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryCommitState {
    NoChanges,
    OneNewCommit,
    MultipleChangedCommits,
}

#[derive(Debug, Clone)]
struct Baseline {
    branch: String,
    head: Oid,
}

/// Tracks the last-observed head of the working branch and classifies what
/// changed since, so the undo engine can decide between attributing a single
/// new commit and falling back to a full resynchronization.
///
/// The baseline is re-recorded on every poll; polls taken while the history
/// branch itself is checked out are ignored.
#[derive(Debug)]
pub struct CommitMonitor {
    history_branch: String,
    baseline: Option<Baseline>,
    state: RepositoryCommitState,
    branch_with_new_commit: Option<String>,
}

impl CommitMonitor {
    pub fn new(history_branch: &str) -> Self {
        Self {
            history_branch: history_branch.to_string(),
            baseline: None,
            state: RepositoryCommitState::NoChanges,
            branch_with_new_commit: None,
        }
    }

    /// Compare the working branch against the previous observation and
    /// classify the delta. The first poll only records the baseline.
    pub fn poll(&mut self, backend: &GitBackend) -> Result<RepositoryCommitState> {
        let branch = backend.current_branch()?;
        if branch == self.history_branch {
            self.state = RepositoryCommitState::NoChanges;
            return Ok(self.state);
        }

        let Some(head) = backend.head_id()? else {
            // Unborn HEAD, nothing has been committed anywhere yet
            self.state = RepositoryCommitState::NoChanges;
            return Ok(self.state);
        };

        let state = match self.baseline.clone() {
            None => RepositoryCommitState::NoChanges,
            Some(baseline) if baseline.branch != branch => {
                RepositoryCommitState::MultipleChangedCommits
            }
            Some(baseline) if baseline.head == head => RepositoryCommitState::NoChanges,
            Some(baseline) => self.classify_new_commits(backend, &branch, baseline.head)?,
        };

        debug!(branch, head = %head, ?state, "polled working branch");
        self.baseline = Some(Baseline { branch, head });
        self.state = state;
        Ok(state)
    }

    /// Walk back from the current head until the previously observed head.
    /// Exactly one step means a single attributable commit; anything deeper,
    /// or an unreachable old head (rebase, amend), is ambiguous.
    fn classify_new_commits(
        &mut self,
        backend: &GitBackend,
        branch: &str,
        old_head: Oid,
    ) -> Result<RepositoryCommitState> {
        let mut new_commits = 0usize;
        let mut reached_old_head = false;
        for item in backend.walk_from(branch)? {
            let info = item?;
            if info.id == old_head {
                reached_old_head = true;
                break;
            }
            new_commits += 1;
            if new_commits > 1 {
                break;
            }
        }

        if reached_old_head && new_commits == 1 {
            self.branch_with_new_commit = Some(branch.to_string());
            Ok(RepositoryCommitState::OneNewCommit)
        } else {
            Ok(RepositoryCommitState::MultipleChangedCommits)
        }
    }

    /// Classification produced by the most recent poll
    pub fn current_state(&self) -> RepositoryCommitState {
        self.state
    }

    /// Working branch that produced the commit of the last `OneNewCommit` poll
    pub fn branch_with_new_commit(&self) -> Option<&str> {
        self.branch_with_new_commit.as_deref()
    }

    /// Clear the baseline back to bootstrap
    pub fn reset(&mut self) {
        self.baseline = None;
        self.state = RepositoryCommitState::NoChanges;
        self.branch_with_new_commit = None;
    }

    /// Last-observed `(branch, head)`, for state persistence
    pub fn baseline(&self) -> Option<(&str, Oid)> {
        self.baseline.as_ref().map(|b| (b.branch.as_str(), b.head))
    }

    /// Restore a previously persisted baseline
    pub fn restore_baseline(&mut self, branch: String, head: Oid) {
        self.baseline = Some(Baseline { branch, head });
    }
}
