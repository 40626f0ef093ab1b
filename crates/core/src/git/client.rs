//! Local Git repository operations via `git2`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use git2::{
    Cred, Delta, DiffFindOptions, ErrorCode, FetchOptions, IndexAddOption, Oid, PushOptions,
    RemoteCallbacks, Repository, Signature, Sort, Status, StatusOptions,
};
use tracing::{debug, info, instrument, warn};

use crate::changes::PathEvent;
use crate::errors::GitError;

const REMOTE: &str = "origin";

/// High-level Git client wrapping a `git2::Repository`.
pub struct GitClient {
    repo: Repository,
    repo_path: PathBuf,
}

/// How a path differs between HEAD and the working tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    Other,
}

/// One entry of a working-tree status listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub path: String,
    pub kind: StatusKind,
}

fn credential_callbacks<'a>(token: Option<&str>) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    if let Some(tok) = token {
        let tok = tok.to_string();
        callbacks.credentials(move |_url, _username, _allowed| {
            Cred::userpass_plaintext("x-access-token", &tok)
        });
    }
    callbacks
}

impl GitClient {
    /// Open an existing Git repository at `repo_path`.
    pub fn open<P: AsRef<Path>>(repo_path: P) -> Result<Self, GitError> {
        let path = repo_path.as_ref();
        debug!(path = %path.display(), "opening git repository");
        let repo = Repository::open(path)
            .map_err(|_| GitError::RepositoryNotFound(path.display().to_string()))?;
        Ok(Self {
            repo,
            repo_path: path.to_path_buf(),
        })
    }

    /// Clone a remote repository to `path`. All remote branches are fetched
    /// into `refs/remotes/origin/*`.
    #[instrument(skip(token), fields(url = %url, path = %path.display()))]
    pub fn clone_repo(url: &str, path: &Path, token: Option<&str>) -> Result<Self, GitError> {
        info!("cloning git repository");
        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(credential_callbacks(token));
        let mut builder = git2::build::RepoBuilder::new();
        builder.fetch_options(fetch_opts);
        let repo = builder.clone(url, path)?;
        info!("clone completed");
        Ok(Self {
            repo,
            repo_path: path.to_path_buf(),
        })
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Name of the checked-out branch, or `None` on a detached/unborn HEAD.
    pub fn current_branch(&self) -> Option<String> {
        let head = self.repo.head().ok()?;
        if !head.is_branch() {
            return None;
        }
        head.shorthand().map(str::to_string)
    }

    /// Return the SHA of HEAD.
    pub fn head_sha(&self) -> Result<String, GitError> {
        let commit = self.repo.head()?.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    /// Resolve any revision expression (SHA, branch, `HEAD`) to a commit id.
    pub fn resolve_commit(&self, rev: &str) -> Result<Oid, GitError> {
        let object = self
            .repo
            .revparse_single(rev)
            .map_err(|_| GitError::RefNotFound(rev.to_string()))?;
        let commit = object
            .peel_to_commit()
            .map_err(|_| GitError::RefNotFound(rev.to_string()))?;
        Ok(commit.id())
    }

    /// Whether `origin/<branch>` is known locally.
    pub fn remote_branch_exists(&self, branch: &str) -> bool {
        self.repo
            .find_reference(&remote_ref(branch))
            .is_ok()
    }

    /// Check out `branch` as a local branch at the remote branch's tip.
    #[instrument(skip(self))]
    pub fn checkout_remote_branch(&self, branch: &str) -> Result<(), GitError> {
        let commit = self
            .repo
            .find_reference(&remote_ref(branch))
            .map_err(|_| GitError::RefNotFound(remote_ref(branch)))?
            .peel_to_commit()?;
        if self.current_branch().as_deref() == Some(branch) {
            // Already checked out by the clone; move it to the remote tip.
            self.repo
                .reset(commit.as_object(), git2::ResetType::Hard, None)?;
        } else {
            self.repo.branch(branch, &commit, true)?;
            self.switch_to(branch)?;
        }
        info!(branch, sha = %commit.id(), "checked out existing remote branch");
        Ok(())
    }

    /// Create `branch` at HEAD and check it out.
    #[instrument(skip(self))]
    pub fn create_branch_from_head(&self, branch: &str) -> Result<(), GitError> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                // Empty repository: the first commit creates the branch.
                self.repo.set_head(&format!("refs/heads/{}", branch))?;
                info!(branch, "repository has no commits; branch starts unborn");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let commit = head.peel_to_commit()?;
        self.repo.branch(branch, &commit, false)?;
        self.switch_to(branch)?;
        info!(branch, from = %commit.id(), "created branch");
        Ok(())
    }

    fn switch_to(&self, branch: &str) -> Result<(), GitError> {
        self.repo.set_head(&format!("refs/heads/{}", branch))?;
        self.repo
            .checkout_head(Some(git2::build::CheckoutBuilder::new().force()))?;
        Ok(())
    }

    /// Working-tree status relative to HEAD, untracked files included.
    pub fn status(&self) -> Result<Vec<StatusEntry>, GitError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        let mut entries = Vec::new();
        for entry in statuses.iter() {
            let Some(path) = entry.path() else { continue };
            entries.push(StatusEntry {
                path: path.to_string(),
                kind: classify(entry.status()),
            });
        }
        debug!(count = entries.len(), "collected working-tree status");
        Ok(entries)
    }

    /// Stage everything (additions, modifications, deletions) and commit.
    #[instrument(skip(self, message))]
    pub fn commit_all(
        &self,
        message: &str,
        author_name: &str,
        author_email: &str,
    ) -> Result<Oid, GitError> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;
        let signature = Signature::now(author_name, author_email)?;
        let parent_commit = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };
        let parents: Vec<&git2::Commit> = parent_commit.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        info!(sha = %oid, "created commit");
        Ok(oid)
    }

    /// Fetch `branch` from origin into `refs/remotes/origin/<branch>`.
    #[instrument(skip(self, token))]
    pub fn fetch_branch(&self, branch: &str, token: Option<&str>) -> Result<(), GitError> {
        let mut remote = self.repo.find_remote(REMOTE)?;
        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(credential_callbacks(token));
        let refspec = format!("+refs/heads/{}:{}", branch, remote_ref(branch));
        remote.fetch(&[refspec.as_str()], Some(&mut fetch_opts), None)?;
        debug!(branch, "fetch completed");
        Ok(())
    }

    /// Whether HEAD's tree differs from `origin/<branch>`'s tree. A missing
    /// remote branch counts as different.
    pub fn differs_from_remote(&self, branch: &str) -> Result<bool, GitError> {
        let remote = match self.repo.find_reference(&remote_ref(branch)) {
            Ok(reference) => reference.peel_to_tree()?,
            Err(_) => return Ok(true),
        };
        let local = self.repo.head()?.peel_to_tree()?;
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&remote), Some(&local), None)?;
        Ok(diff.deltas().len() > 0)
    }

    /// Push a local branch to origin, optionally overwriting the remote ref.
    #[instrument(skip(self, token))]
    pub fn push(&self, branch: &str, token: Option<&str>, force: bool) -> Result<(), GitError> {
        info!(branch, force, "pushing");
        let mut remote = self.repo.find_remote(REMOTE)?;
        let mut callbacks = credential_callbacks(token);
        let push_error = Arc::new(Mutex::new(None::<String>));
        let push_error_clone = push_error.clone();
        callbacks.push_update_reference(move |refname, status| {
            if let Some(msg) = status {
                warn!(refname, msg, "push rejected");
                if let Ok(mut slot) = push_error_clone.lock() {
                    *slot = Some(msg.to_string());
                }
            }
            Ok(())
        });
        let mut push_opts = PushOptions::new();
        push_opts.remote_callbacks(callbacks);
        let prefix = if force { "+" } else { "" };
        let refspec = format!("{}refs/heads/{}:refs/heads/{}", prefix, branch, branch);
        remote
            .push(&[refspec.as_str()], Some(&mut push_opts))
            .map_err(|e| GitError::PushRejected {
                branch: branch.to_string(),
                detail: e.message().to_string(),
            })?;
        let rejected = push_error.lock().ok().and_then(|mut slot| slot.take());
        if let Some(detail) = rejected {
            return Err(GitError::PushRejected {
                branch: branch.to_string(),
                detail,
            });
        }
        info!("push completed");
        Ok(())
    }

    /// Rename and delete events on the first-parent line of `base..head`,
    /// oldest commit first. Merge commits contribute nothing.
    #[instrument(skip(self))]
    pub fn rename_delete_events(&self, base: &str, head: &str) -> Result<Vec<PathEvent>, GitError> {
        let base_oid = self.resolve_commit(base)?;
        let head_oid = self.resolve_commit(head)?;

        let mut revwalk = self.repo.revwalk()?;
        revwalk.push(head_oid)?;
        revwalk.hide(base_oid)?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;

        let mut find_opts = DiffFindOptions::new();
        find_opts.renames(true);

        let mut events = Vec::new();
        let mut walked = 0usize;
        for oid_result in revwalk {
            let commit = self.repo.find_commit(oid_result?)?;
            walked += 1;
            if commit.parent_count() != 1 {
                continue;
            }
            let parent_tree = commit.parent(0)?.tree()?;
            let tree = commit.tree()?;
            let mut diff = self
                .repo
                .diff_tree_to_tree(Some(&parent_tree), Some(&tree), None)?;
            diff.find_similar(Some(&mut find_opts))?;

            for delta in diff.deltas() {
                let old_path = delta.old_file().path().map(path_string);
                let new_path = delta.new_file().path().map(path_string);
                match (delta.status(), old_path, new_path) {
                    (Delta::Renamed, Some(from), Some(to)) => {
                        events.push(PathEvent::Renamed { from, to })
                    }
                    (Delta::Deleted, Some(path), _) => events.push(PathEvent::Deleted { path }),
                    _ => {}
                }
            }
        }
        debug!(commits = walked, events = events.len(), "scanned history");
        Ok(events)
    }
}

fn remote_ref(branch: &str) -> String {
    format!("refs/remotes/{}/{}", REMOTE, branch)
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn classify(status: Status) -> StatusKind {
    if status.intersects(Status::INDEX_NEW | Status::WT_NEW) {
        StatusKind::Added
    } else if status.intersects(Status::INDEX_DELETED | Status::WT_DELETED) {
        StatusKind::Deleted
    } else if status.intersects(Status::INDEX_RENAMED | Status::WT_RENAMED) {
        StatusKind::Renamed
    } else if status.intersects(
        Status::INDEX_MODIFIED | Status::WT_MODIFIED | Status::INDEX_TYPECHANGE | Status::WT_TYPECHANGE,
    ) {
        StatusKind::Modified
    } else {
        StatusKind::Other
    }
}
