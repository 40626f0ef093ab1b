//! The `sync` pipeline.
//!
//! [`SyncEngine`] mirrors mapped files from the source checkout into a fresh
//! clone of the target repository and publishes the result:
//!
//! 1. Verify the target repository and resolve the base branch.
//! 2. Clone the target and check out the working branch.
//! 3. Copy every mapping entry into the clone.
//! 4. Stop early when nothing was copied or nothing changed.
//! 5. Commit and push (skipped when the remote branch already matches).
//! 6. Open or refresh the pull request, or stop after a direct push.

use std::path::PathBuf;

use tracing::{info, instrument, warn};

use crate::config::SyncConfig;
use crate::errors::{AccessError, ConfigError, CoreError};
use crate::git::github::Repository;
use crate::git::{GitClient, GitHubApi};
use crate::mapping::{self, MappingList};
use crate::materialize::{FileMaterializer, MissingSourcePolicy};
use crate::models::SyncOutcome;
use crate::publish::{BranchPublisher, PublishState, PushMode};
use crate::pull_request::{PullRequestCoordinator, PullRequestRequest, WriteAccess};

/// Base branch used when neither the config nor the API supplies one.
const FALLBACK_BASE_BRANCH: &str = "main";

pub struct SyncEngine<'a, A: GitHubApi + ?Sized> {
    config: SyncConfig,
    api: Option<&'a A>,
    source_root: PathBuf,
    /// `owner/name` of the repository hosting the workflow.
    source_repository: Option<String>,
}

impl<'a, A: GitHubApi + ?Sized> SyncEngine<'a, A> {
    pub fn new(config: SyncConfig, api: Option<&'a A>, source_root: impl Into<PathBuf>) -> Self {
        info!(repo = %config.target.repository, "initializing sync engine");
        Self {
            config,
            api,
            source_root: source_root.into(),
            source_repository: None,
        }
    }

    pub fn with_source_repository(mut self, repo: Option<String>) -> Self {
        self.source_repository = repo;
        self
    }

    fn mappings(&self) -> Result<MappingList, CoreError> {
        let payload = self
            .config
            .sync
            .mappings
            .as_deref()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "sync.mappings".into(),
                detail: "a file mapping is required".into(),
            })?;
        Ok(mapping::parse_mapping(payload)?)
    }

    fn commit_message(&self) -> String {
        if let Some(message) = &self.config.commit.message {
            return message.clone();
        }
        let name = self
            .source_repository
            .as_deref()
            .and_then(|r| r.rsplit('/').next())
            .unwrap_or("source repository");
        format!("Sync files from {}", name)
    }

    /// Look up the target; `None` when running without a token.
    async fn verify_target(&self) -> Result<Option<Repository>, CoreError> {
        let repo = &self.config.target.repository;
        let Some(api) = self.api else {
            warn!(repo = %repo, "no token available; skipping repository verification");
            return Ok(None);
        };
        let repository = api
            .get_repository(repo)
            .await
            .map_err(|e| e.into_access_error(repo))?;
        info!(repo = %repo, default_branch = %repository.default_branch, "verified target repository");
        Ok(Some(repository))
    }

    /// Run one sync.
    #[instrument(skip(self), fields(repo = %self.config.target.repository, branch = %self.config.target.branch))]
    pub async fn run(&self) -> Result<SyncOutcome, CoreError> {
        let mappings = self.mappings()?;
        let target = &self.config.target;

        let repository = self.verify_target().await?;
        let base_branch = target
            .base_branch
            .clone()
            .or_else(|| repository.as_ref().map(|r| r.default_branch.clone()))
            .unwrap_or_else(|| FALLBACK_BASE_BRANCH.to_string());

        let access = match (self.api, &repository) {
            (Some(api), Some(repo)) => {
                WriteAccess::evaluate(api, repo, self.source_repository.as_deref()).await
            }
            _ => WriteAccess::Allowed,
        };

        let workdir = tempfile::tempdir().map_err(ConfigError::IoError)?;
        let clone_url = target.clone_url();
        let git = GitClient::clone_repo(&clone_url, workdir.path(), target.token.as_deref())
            .map_err(|e| AccessError::CloneFailed {
                repo: target.repository.clone(),
                detail: e.to_string(),
            })?;

        let direct = target.branch == base_branch;
        let mode = if self.config.sync.auto_merge || direct {
            PushMode::Always
        } else {
            PushMode::IfChanged
        };
        info!(base = %base_branch, ?mode, "publishing plan");

        let mut publisher =
            BranchPublisher::new(&git, &target.branch, mode).with_token(target.token.clone());
        publisher.prepare()?;

        let report = FileMaterializer::new(&self.source_root, git.repo_path())
            .with_policy(self.config.sync.missing_source)
            .materialize(&mappings.entries)?;
        if self.config.sync.missing_source == MissingSourcePolicy::Skip && !report.any_written() {
            warn!("no source files found; skipping publish");
            return Ok(SyncOutcome::NoSourceFiles);
        }

        publisher.inspect()?;
        if publisher.state() == PublishState::Clean {
            info!("no changes to commit");
            return Ok(SyncOutcome::NoChanges);
        }

        if let WriteAccess::Denied(reason) = access {
            warn!(%reason, "write access denied; skipping push and pull request");
            return Ok(SyncOutcome::WriteSkipped { reason });
        }

        let commit = &self.config.commit;
        publisher.commit(&self.commit_message(), &commit.author_name, &commit.author_email)?;
        if publisher.push()? == PublishState::PushSkipped {
            return Ok(SyncOutcome::PushSkipped {
                branch: target.branch.clone(),
            });
        }

        if direct {
            info!(branch = %target.branch, "pushed directly to base branch");
            return Ok(SyncOutcome::DirectPush {
                branch: target.branch.clone(),
            });
        }

        let pull_request = PullRequestCoordinator::new(self.api)
            .publish(&PullRequestRequest {
                repository: target.repository.clone(),
                head_branch: target.branch.clone(),
                base_branch,
                title: self.config.pull_request.title.clone(),
                body: self.config.pull_request.body.clone(),
                auto_merge: self.config.sync.auto_merge,
            })
            .await?;

        Ok(SyncOutcome::Published {
            branch: target.branch.clone(),
            pull_request,
        })
    }
}
