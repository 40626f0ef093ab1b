//! The `update-config` pipeline.
//!
//! Runs on a pull request in the source repository. When the PR renames or
//! deletes files the sync mapping tracks, the mapping block in the workflow
//! document is rewritten and committed back to the PR head branch through the
//! contents API. The commit carries `[skip ci]` and the bot identity, so the
//! next run uses it as its base and only sees later changes.

use tracing::{info, instrument, warn};

use crate::changes::{self, BOT_LOGIN};
use crate::config::UpdateConfigSettings;
use crate::config_doc::ConfigDocument;
use crate::context::ActionContext;
use crate::errors::{ContextError, CoreError};
use crate::git::github::{CommitIdentity, PutContent};
use crate::git::{GitClient, GitHubApi};
use crate::models::UpdateOutcome;
use crate::reconcile;

const BOT_EMAIL: &str = "41898282+github-actions[bot]@users.noreply.github.com";

/// Identity automated config commits are made under.
pub fn bot_identity() -> CommitIdentity {
    CommitIdentity {
        name: BOT_LOGIN.to_string(),
        email: BOT_EMAIL.to_string(),
    }
}

pub struct ConfigUpdater<'a, A: GitHubApi + ?Sized> {
    api: &'a A,
    context: ActionContext,
    settings: UpdateConfigSettings,
}

impl<'a, A: GitHubApi + ?Sized> ConfigUpdater<'a, A> {
    pub fn new(api: &'a A, context: ActionContext, settings: UpdateConfigSettings) -> Self {
        Self {
            api,
            context,
            settings,
        }
    }

    /// Document path as the contents API expects it.
    fn repo_path(&self) -> String {
        self.settings
            .path
            .to_string_lossy()
            .replace('\\', "/")
            .trim_start_matches("./")
            .to_string()
    }

    #[instrument(skip(self), fields(path = %self.settings.path.display()))]
    pub async fn run(&self) -> Result<UpdateOutcome, CoreError> {
        let ctx = &self.context;
        let repo = ctx.require_repository()?;

        let doc_path = ctx.workspace.join(&self.settings.path);
        let mut doc = ConfigDocument::load(&doc_path, &self.settings.mapping_keys)?;
        let mappings = doc.mappings()?;
        info!(location = %doc.location(), entries = mappings.len(), "loaded sync mapping");

        let base = changes::resolve_base_ref(
            self.api,
            repo,
            ctx.base_ref.as_deref(),
            ctx.pr_number(),
        )
        .await?;

        let git = GitClient::open(&ctx.workspace)?;
        let change_set =
            changes::resolve_changes(&git, &base, "HEAD", &mappings.tracked_paths())?;
        if change_set.is_empty() {
            info!("no changes detected for tracked files");
            return Ok(UpdateOutcome::NoTrackedChanges);
        }

        let result = reconcile::reconcile(&mappings, &change_set);
        doc.replace_mappings(&result.entries)?;
        let rendered = doc.save()?;
        let removed = result.removed.len();
        let renamed = result.renamed.len();

        if ctx.is_fork_pull_request() {
            warn!("pull request comes from a fork; config updated locally but not committed");
            return Ok(UpdateOutcome::ForkSkipped { removed, renamed });
        }

        let branch = ctx.head_branch().ok_or(ContextError::MissingHeadRef)?;
        let path = self.repo_path();
        let current = self.api.get_content(repo, &path, &branch).await?;
        self.api
            .put_content(
                repo,
                &PutContent {
                    path: path.clone(),
                    message: self.settings.commit_message.clone(),
                    content: rendered.into_bytes(),
                    sha: Some(current.sha),
                    branch: branch.clone(),
                    identity: bot_identity(),
                },
            )
            .await?;
        info!(%branch, %path, removed, renamed, "committed config update");

        Ok(UpdateOutcome::Committed {
            branch,
            removed,
            renamed,
        })
    }
}
