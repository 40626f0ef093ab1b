//! Pull-request lifecycle and write-access checks.
//!
//! [`PullRequestCoordinator`] creates the pull request for the working branch
//! or refreshes the one already open, and optionally squash-merges it.
//! [`WriteAccess`] decides whether the token may publish to a repository other
//! than the one hosting the workflow.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::errors::CoreError;
use crate::git::github::{MergeMethod, NewPullRequest, Repository};
use crate::git::GitHubApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestAction {
    Created,
    Updated,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestOutcome {
    pub action: PullRequestAction,
    pub number: Option<u64>,
    pub merged: bool,
}

impl PullRequestOutcome {
    fn skipped() -> Self {
        Self {
            action: PullRequestAction::Skipped,
            number: None,
            merged: false,
        }
    }
}

impl std::fmt::Display for PullRequestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self.action {
            PullRequestAction::Created => "created",
            PullRequestAction::Updated => "updated",
            PullRequestAction::Skipped => return write!(f, "pull request skipped"),
        };
        match self.number {
            Some(n) => write!(f, "{} pull request #{}", verb, n)?,
            None => write!(f, "{} pull request", verb)?,
        }
        if self.merged {
            write!(f, " (merged)")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Write access
// ---------------------------------------------------------------------------

/// Whether publishing writes to the target repository may proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteAccess {
    Allowed,
    Denied(String),
}

impl WriteAccess {
    /// Decide write access to `target` for a workflow hosted in `hosting`.
    ///
    /// The repository hosting the workflow is always writable. Elsewhere the
    /// token's reported `push` permission decides; when the API does not
    /// report one, the authenticated user's collaborator role does.
    #[instrument(skip(api, target), fields(repo = %target.full_name))]
    pub async fn evaluate<A: GitHubApi + ?Sized>(
        api: &A,
        target: &Repository,
        hosting: Option<&str>,
    ) -> Self {
        if hosting.is_some_and(|h| h.eq_ignore_ascii_case(&target.full_name)) {
            return Self::Allowed;
        }
        if let Some(permissions) = &target.permissions {
            return if permissions.push {
                Self::Allowed
            } else {
                Self::Denied(format!("token lacks push permission on {}", target.full_name))
            };
        }

        let user = match api.get_authenticated_user().await {
            Ok(user) => user,
            Err(e) => {
                return Self::Denied(format!("could not identify the token's user: {}", e));
            }
        };
        match api
            .get_collaborator_permission(&target.full_name, &user.login)
            .await
        {
            Ok(level) if level.can_push() => Self::Allowed,
            Ok(level) => Self::Denied(format!(
                "{} has {:?} access to {}, write is required",
                user.login, level, target.full_name
            )),
            Err(e) => Self::Denied(format!(
                "could not read {}'s permission on {}: {}",
                user.login, target.full_name, e
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Settings for one pull-request publication.
#[derive(Debug, Clone)]
pub struct PullRequestRequest {
    /// Target repository, `owner/name`.
    pub repository: String,
    pub head_branch: String,
    pub base_branch: String,
    pub title: String,
    pub body: String,
    pub auto_merge: bool,
}

pub struct PullRequestCoordinator<'a, A: GitHubApi + ?Sized> {
    api: Option<&'a A>,
}

impl<'a, A: GitHubApi + ?Sized> PullRequestCoordinator<'a, A> {
    /// `api` is `None` when no token is available.
    pub fn new(api: Option<&'a A>) -> Self {
        Self { api }
    }

    #[instrument(skip(self, request), fields(repo = %request.repository, head = %request.head_branch))]
    pub async fn publish(&self, request: &PullRequestRequest) -> Result<PullRequestOutcome, CoreError> {
        let Some(api) = self.api else {
            warn!("no token available; skipping pull request");
            return Ok(PullRequestOutcome::skipped());
        };

        let owner = request
            .repository
            .split('/')
            .next()
            .unwrap_or(&request.repository);
        let head = format!("{}:{}", owner, request.head_branch);
        let open = api.list_pulls(&request.repository, &head).await?;

        let (action, number) = match open.first() {
            Some(existing) => {
                let body = format!("{}\nUpdated: {}", request.body, Utc::now().to_rfc3339());
                api.update_pull(&request.repository, existing.number, &body)
                    .await?;
                info!(number = existing.number, "updated existing pull request");
                (PullRequestAction::Updated, existing.number)
            }
            None => {
                let created = api
                    .create_pull(
                        &request.repository,
                        &NewPullRequest {
                            title: request.title.clone(),
                            body: request.body.clone(),
                            head: request.head_branch.clone(),
                            base: request.base_branch.clone(),
                        },
                    )
                    .await?;
                info!(number = created.number, url = %created.html_url, "created pull request");
                (PullRequestAction::Created, created.number)
            }
        };

        let merged = request.auto_merge && self.try_merge(api, &request.repository, number).await;
        Ok(PullRequestOutcome {
            action,
            number: Some(number),
            merged,
        })
    }

    async fn try_merge(&self, api: &A, repo: &str, number: u64) -> bool {
        match api.merge_pull(repo, number, MergeMethod::Squash).await {
            Ok(()) => {
                info!(number, "pull request merged");
                true
            }
            Err(e) => {
                warn!(number, error = %e, "failed to merge pull request");
                false
            }
        }
    }
}
