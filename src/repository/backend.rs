use git2::build::CheckoutBuilder;
use git2::{BranchType, ErrorCode, IndexAddOption, Oid, Repository, Signature, StashFlags, StatusOptions};
use std::path::Path;
use tracing::debug;

use super::error::{BackendError, Result};

/// Read model of a commit, detached from the underlying repository.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub id: Oid,
    pub message: String,
    pub parent_count: usize,
    /// Author timestamp, unix seconds
    pub seconds: i64,
}

impl CommitInfo {
    fn from_commit(commit: &git2::Commit<'_>) -> Self {
        Self {
            id: commit.id(),
            message: commit.message().unwrap_or("").to_string(),
            parent_count: commit.parent_count(),
            seconds: commit.time().seconds(),
        }
    }

    /// First line of the commit message
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// Version-control backend over a local git repository.
///
/// Exposes the branch-graph primitives the undo engine relies on:
/// stage-all+commit, branch create/checkout, revert, cherry-pick,
/// hard-reset, ref resolution, commit notes and a lazy commit walk.
pub struct GitBackend {
    repo: Repository,
}

impl GitBackend {
    /// Open the repository containing `path`
    pub fn discover(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path).map_err(|e| match e.code() {
            ErrorCode::NotFound => BackendError::NoRepository { path: path.to_path_buf() },
            _ => e.into(),
        })?;
        debug!(path = %path.display(), "opened repository");
        Ok(Self { repo })
    }

    /// Open the repository containing `path`, initializing one if absent
    pub fn discover_or_init(path: &Path) -> Result<Self> {
        match Self::discover(path) {
            Ok(backend) => Ok(backend),
            Err(BackendError::NoRepository { .. }) => {
                debug!(path = %path.display(), "initializing repository");
                let repo = Repository::init(path)?;
                Ok(Self { repo })
            }
            Err(e) => Err(e),
        }
    }

    /// Path to the `.git` directory
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    /// Path to the working tree root, if the repository is not bare
    pub fn workdir(&self) -> Option<&Path> {
        self.repo.workdir()
    }

    /// Name of the currently checked-out branch.
    ///
    /// Works on an unborn HEAD (freshly initialized repository) by reading
    /// the symbolic target of HEAD directly.
    pub fn current_branch(&self) -> Result<String> {
        match self.repo.head() {
            Ok(head) => Ok(head.shorthand().unwrap_or("HEAD").to_string()),
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                let head = self.repo.find_reference("HEAD")?;
                let target = head.symbolic_target().unwrap_or("refs/heads/master");
                Ok(target.trim_start_matches("refs/heads/").to_string())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Commit id the current branch points at, `None` on an unborn HEAD
    pub fn head_id(&self) -> Result<Option<Oid>> {
        match self.head_commit()? {
            Some(commit) => Ok(Some(commit.id())),
            None => Ok(None),
        }
    }

    /// Names of all local branches
    pub fn local_branches(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for branch in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            if let Some(name) = branch.name()? {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// True when neither the index nor the working tree carry changes
    pub fn is_clean(&self) -> Result<bool> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        Ok(statuses.is_empty())
    }

    /// Stage every change in the working tree and commit it.
    ///
    /// Fails with [`BackendError::NothingToCommit`] when the resulting tree
    /// is identical to HEAD; call sites that treat a clean tree as success
    /// match on that variant.
    pub fn stage_all_and_commit(&self, message: &str) -> Result<Oid> {
        let mut index = self.repo.index()?;
        index.add_all(["."], IndexAddOption::DEFAULT, None)?;
        index.update_all(["."], None)?;
        self.commit_index(&mut index, message)
    }

    /// Stage a single path and commit it
    pub fn stage_path_and_commit(&self, path: &Path, message: &str) -> Result<Oid> {
        let mut index = self.repo.index()?;
        index.add_path(path)?;
        self.commit_index(&mut index, message)
    }

    fn commit_index(&self, index: &mut git2::Index, message: &str) -> Result<Oid> {
        index.write()?;
        let tree_id = index.write_tree()?;

        let parent = self.head_commit()?;
        match &parent {
            Some(parent) if parent.tree_id() == tree_id => return Err(BackendError::NothingToCommit),
            None if index.len() == 0 => return Err(BackendError::NothingToCommit),
            _ => {}
        }

        let tree = self.repo.find_tree(tree_id)?;
        let sig = self.signature()?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let id = self.repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
        debug!(commit = %id, message, "committed staged changes");
        Ok(id)
    }

    /// Create a local branch at the current HEAD
    pub fn create_branch(&self, name: &str) -> Result<()> {
        let head = self.repo.head()?.peel_to_commit()?;
        match self.repo.branch(name, &head, false) {
            Ok(_) => Ok(()),
            Err(e) if e.code() == ErrorCode::Exists => {
                Err(BackendError::RefAlreadyExists { name: name.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Check out a local branch, updating HEAD and the working tree
    pub fn checkout(&self, name: &str) -> Result<()> {
        let refname = format!("refs/heads/{name}");
        let obj = self.repo.revparse_single(&refname).map_err(|e| match e.code() {
            ErrorCode::NotFound => BackendError::RefNotFound { name: name.to_string() },
            _ => BackendError::Git(e),
        })?;

        let mut opts = CheckoutBuilder::new();
        opts.safe();
        self.repo.checkout_tree(&obj, Some(&mut opts)).map_err(|e| match e.code() {
            ErrorCode::Conflict => BackendError::CheckoutConflict { name: name.to_string() },
            _ => BackendError::Git(e),
        })?;
        self.repo.set_head(&refname)?;
        debug!(branch = name, "checked out");
        Ok(())
    }

    /// Produce an inverse commit of `id` on the current branch.
    ///
    /// Returns `Ok(None)` when the revert is a no-op (the change was already
    /// undone). Merge commits are rejected with
    /// [`BackendError::MultipleParentsNotAllowed`].
    pub fn revert(&self, id: Oid) -> Result<Option<Oid>> {
        let commit = self.repo.find_commit(id)?;
        if commit.parent_count() > 1 {
            return Err(BackendError::MultipleParentsNotAllowed { id });
        }

        let head = self.repo.head()?.peel_to_commit()?;
        let mut index = self.repo.revert_commit(&commit, &head, 0, None)?;
        if index.has_conflicts() {
            return Err(git2::Error::from_str(&format!("revert of {id} produced conflicts")).into());
        }

        let tree_id = index.write_tree_to(&self.repo)?;
        if tree_id == head.tree_id() {
            return Ok(None);
        }

        let tree = self.repo.find_tree(tree_id)?;
        let sig = self.signature()?;
        let message = format!("Revert \"{}\"", commit.summary().unwrap_or(""));
        let new_id = self.repo.commit(Some("HEAD"), &sig, &sig, &message, &tree, &[&head])?;
        self.refresh_worktree()?;
        debug!(reverted = %id, commit = %new_id, "created revert commit");
        Ok(Some(new_id))
    }

    /// Replay the diff of `id` onto the current branch as a new commit
    pub fn cherry_pick(&self, id: Oid) -> Result<Oid> {
        let commit = self.repo.find_commit(id)?;
        let head = self.repo.head()?.peel_to_commit()?;
        let mut index = self.repo.cherrypick_commit(&commit, &head, 0, None)?;
        if index.has_conflicts() {
            return Err(git2::Error::from_str(&format!("cherry-pick of {id} produced conflicts")).into());
        }

        let tree_id = index.write_tree_to(&self.repo)?;
        let tree = self.repo.find_tree(tree_id)?;
        let sig = self.signature()?;
        let message = commit.message().unwrap_or("");
        let new_id = self.repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&head])?;
        self.refresh_worktree()?;
        debug!(picked = %id, commit = %new_id, "cherry-picked");
        Ok(new_id)
    }

    /// Hard-reset the current branch and working tree to `id`
    pub fn hard_reset(&self, id: Oid) -> Result<()> {
        let obj = self.repo.find_object(id, None)?;
        self.repo.reset(&obj, git2::ResetType::Hard, None)?;
        debug!(target = %id, "hard reset");
        Ok(())
    }

    /// Resolve a ref expression such as `HEAD~3` or a branch name to a commit id
    pub fn resolve(&self, expr: &str) -> Result<Oid> {
        let obj = self.repo.revparse_single(expr).map_err(|e| match e.code() {
            ErrorCode::NotFound => BackendError::RefNotFound { name: expr.to_string() },
            _ => BackendError::Git(e),
        })?;
        Ok(obj.peel_to_commit()?.id())
    }

    /// Text of the note attached to `id`, if any
    pub fn note_of(&self, id: Oid) -> Result<Option<String>> {
        match self.repo.find_note(None, id) {
            Ok(note) => Ok(note.message().map(|m| m.trim_end_matches('\n').to_string())),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Attach `text` as the note of `id`, replacing any existing note
    pub fn set_note(&self, id: Oid, text: &str) -> Result<()> {
        let sig = self.signature()?;
        self.repo.note(&sig, &sig, None, id, text, true)?;
        Ok(())
    }

    /// Remove the note of `id`; absent notes are tolerated
    pub fn remove_note(&self, id: Oid) -> Result<()> {
        let sig = self.signature()?;
        match self.repo.note_delete(id, None, &sig, &sig) {
            Ok(()) => Ok(()),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// All `(commit id, note text)` pairs on the default notes ref
    pub fn list_notes(&self) -> Result<Vec<(Oid, String)>> {
        let mut notes = Vec::new();
        let iter = match self.repo.notes(None) {
            Ok(iter) => iter,
            // No note has been written yet, the notes ref does not exist
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(notes),
            Err(e) => return Err(e.into()),
        };
        for item in iter {
            let (_, annotated) = item?;
            if let Some(text) = self.note_of(annotated)? {
                notes.push((annotated, text));
            }
        }
        Ok(notes)
    }

    /// Lazy reverse-chronological walk of the commits reachable from a branch.
    ///
    /// The iterator is produced fresh per call and is not resumable across
    /// calls; callers bound it themselves (e.g. with `take`).
    pub fn walk_from(&self, name: &str) -> Result<impl Iterator<Item = Result<CommitInfo>> + '_> {
        let mut walk = self.repo.revwalk()?;
        walk.push_ref(&format!("refs/heads/{name}")).map_err(|e| match e.code() {
            ErrorCode::NotFound => BackendError::RefNotFound { name: name.to_string() },
            _ => BackendError::Git(e),
        })?;
        Ok(walk.map(move |item| {
            let id = item?;
            let commit = self.repo.find_commit(id)?;
            Ok(CommitInfo::from_commit(&commit))
        }))
    }

    /// Stash the working tree and index, including untracked files
    pub fn stash_push(&mut self) -> Result<Oid> {
        let sig = self.signature()?;
        let id = self.repo.stash_save(
            &sig,
            "forge-undo: working tree snapshot",
            Some(StashFlags::INCLUDE_UNTRACKED),
        )?;
        Ok(id)
    }

    /// Apply the newest stash entry without dropping it
    pub fn stash_apply(&mut self) -> Result<()> {
        self.repo.stash_apply(0, None)?;
        Ok(())
    }

    /// Drop the newest stash entry
    pub fn stash_drop(&mut self) -> Result<()> {
        self.repo.stash_drop(0)?;
        Ok(())
    }

    fn head_commit(&self) -> Result<Option<git2::Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?)),
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn signature(&self) -> Result<Signature<'static>> {
        match self.repo.signature() {
            Ok(sig) => Ok(sig),
            // No user.name/user.email configured
            Err(_) => Ok(Signature::now("forge-undo", "forge-undo@localhost")?),
        }
    }

    /// Force the working tree back in sync with HEAD after an index-only commit
    fn refresh_worktree(&self) -> Result<()> {
        let mut opts = CheckoutBuilder::new();
        opts.force();
        self.repo.checkout_head(Some(&mut opts))?;
        Ok(())
    }
}

impl std::fmt::Debug for GitBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitBackend")
            .field("git_dir", &self.repo.path().display().to_string())
            .finish()
    }
}

/// Restores the previously checked-out branch on every exit path.
///
/// Acquired before any multi-step branch-switching sequence. On the happy
/// path callers hand control back with [`restore`](CheckoutGuard::restore);
/// if the sequence unwinds early, `Drop` checks the branch back out
/// best-effort.
pub struct CheckoutGuard<'a> {
    backend: &'a GitBackend,
    branch: String,
    armed: bool,
}

impl<'a> CheckoutGuard<'a> {
    pub fn acquire(backend: &'a GitBackend) -> Result<Self> {
        let branch = backend.current_branch()?;
        Ok(Self { backend, branch, armed: true })
    }

    /// Branch that was checked out at acquisition time
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Check the original branch back out, consuming the guard
    pub fn restore(mut self) -> Result<()> {
        self.armed = false;
        self.backend.checkout(&self.branch)
    }
}

impl Drop for CheckoutGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.backend.checkout(&self.branch) {
                tracing::warn!(branch = %self.branch, error = %e, "failed to restore branch");
            }
        }
    }
}
