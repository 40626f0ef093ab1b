//! Working-branch publication.
//!
//! [`BranchPublisher`] drives one branch through its lifecycle in a cloned
//! target repository:
//!
//! ```text
//! NoBranch -> BranchReady -> Dirty | Clean
//! Dirty -> Committed -> Pushed | PushSkipped
//! ```
//!
//! Calls made out of order fail with [`PublishError::InvalidTransition`].

use git2::Oid;
use tracing::{info, instrument, warn};

use crate::errors::{AccessError, CoreError, GitError, PublishError};
use crate::git::{GitClient, StatusEntry};

/// States of a working branch during one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    NoBranch,
    BranchReady,
    Dirty,
    Clean,
    Committed,
    Pushed,
    PushSkipped,
}

impl std::fmt::Display for PublishState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoBranch => write!(f, "no_branch"),
            Self::BranchReady => write!(f, "branch_ready"),
            Self::Dirty => write!(f, "dirty"),
            Self::Clean => write!(f, "clean"),
            Self::Committed => write!(f, "committed"),
            Self::Pushed => write!(f, "pushed"),
            Self::PushSkipped => write!(f, "push_skipped"),
        }
    }
}

/// When to push the committed branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushMode {
    /// Force-push unconditionally (auto-merge and direct pushes).
    Always,
    /// Force-push only when the tree differs from the remote branch.
    IfChanged,
}

/// How the branch was obtained in [`BranchPublisher::prepare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchOrigin {
    Existing,
    Created,
}

/// Drives a working branch from checkout to push.
pub struct BranchPublisher<'a> {
    git: &'a GitClient,
    branch: String,
    mode: PushMode,
    token: Option<String>,
    state: PublishState,
}

impl<'a> BranchPublisher<'a> {
    pub fn new(git: &'a GitClient, branch: impl Into<String>, mode: PushMode) -> Self {
        Self {
            git,
            branch: branch.into(),
            mode,
            token: None,
            state: PublishState::NoBranch,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn state(&self) -> PublishState {
        self.state
    }

    fn ensure(&self, allowed_from: &[PublishState], to: PublishState) -> Result<(), PublishError> {
        if allowed_from.contains(&self.state) {
            Ok(())
        } else {
            Err(PublishError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// Check out the working branch: at the remote tip when it already exists
    /// on origin, otherwise freshly created from the current HEAD.
    #[instrument(skip(self), fields(branch = %self.branch))]
    pub fn prepare(&mut self) -> Result<BranchOrigin, CoreError> {
        self.ensure(&[PublishState::NoBranch], PublishState::BranchReady)?;
        let origin = if self.git.remote_branch_exists(&self.branch) {
            self.git.checkout_remote_branch(&self.branch)?;
            BranchOrigin::Existing
        } else {
            self.git.create_branch_from_head(&self.branch)?;
            BranchOrigin::Created
        };
        self.state = PublishState::BranchReady;
        info!(?origin, "working branch ready");
        Ok(origin)
    }

    /// Inspect the working tree; an empty status moves to `Clean`.
    pub fn inspect(&mut self) -> Result<Vec<StatusEntry>, CoreError> {
        self.ensure(&[PublishState::BranchReady], PublishState::Dirty)?;
        let status = self.git.status()?;
        let next = if status.is_empty() {
            PublishState::Clean
        } else {
            PublishState::Dirty
        };
        self.state = next;
        info!(changed = status.len(), state = %next, "inspected working tree");
        Ok(status)
    }

    #[instrument(skip(self, message), fields(branch = %self.branch))]
    pub fn commit(
        &mut self,
        message: &str,
        author_name: &str,
        author_email: &str,
    ) -> Result<Oid, CoreError> {
        self.ensure(&[PublishState::Dirty], PublishState::Committed)?;
        let oid = self.git.commit_all(message, author_name, author_email)?;
        self.state = PublishState::Committed;
        Ok(oid)
    }

    /// Push according to the configured [`PushMode`]. Returns the final state,
    /// `Pushed` or `PushSkipped`.
    #[instrument(skip(self), fields(branch = %self.branch))]
    pub fn push(&mut self) -> Result<PublishState, CoreError> {
        self.ensure(&[PublishState::Committed], PublishState::Pushed)?;

        if self.mode == PushMode::IfChanged && !self.differs_from_remote() {
            info!("no difference with remote branch, skipping push");
            self.state = PublishState::PushSkipped;
            return Ok(self.state);
        }

        self.git
            .push(&self.branch, self.token.as_deref(), true)
            .map_err(|e| AccessError::PushDenied {
                branch: self.branch.clone(),
                detail: push_detail(e),
            })?;
        self.state = PublishState::Pushed;
        info!("pushed working branch");
        Ok(self.state)
    }

    /// A fetch failure or an absent remote branch is treated as a first push.
    fn differs_from_remote(&self) -> bool {
        if let Err(e) = self.git.fetch_branch(&self.branch, self.token.as_deref()) {
            info!(error = %e, "remote branch not fetched, assuming first push");
            return true;
        }
        match self.git.differs_from_remote(&self.branch) {
            Ok(differs) => differs,
            Err(e) => {
                warn!(error = %e, "could not compare with remote branch, pushing anyway");
                true
            }
        }
    }
}

fn push_detail(err: GitError) -> String {
    match err {
        GitError::PushRejected { detail, .. } => detail,
        other => other.to_string(),
    }
}
