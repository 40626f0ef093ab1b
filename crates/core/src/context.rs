//! GitHub Actions run context.
//!
//! Collects the `GITHUB_*` environment variables and the event payload the
//! runner writes to `GITHUB_EVENT_PATH`. Lookups go through a closure so tests
//! can supply variables without touching the process environment.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::debug;

use crate::errors::ContextError;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// The subset of the webhook event payload that is consulted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPayload {
    #[serde(default)]
    pub pull_request: Option<PullRequestEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PullRequestEvent {
    #[serde(default)]
    pub number: Option<u64>,
    #[serde(default)]
    pub head: Option<EventRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventRef {
    #[serde(rename = "ref", default)]
    pub ref_name: Option<String>,
    #[serde(default)]
    pub repo: Option<EventRepository>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventRepository {
    pub full_name: String,
}

/// Everything known about the current workflow run.
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// `owner/name` of the repository the workflow runs in.
    pub repository: Option<String>,
    pub base_ref: Option<String>,
    pub head_ref: Option<String>,
    /// Checkout of the repository the workflow runs in.
    pub workspace: PathBuf,
    pub api_url: String,
    pub server_url: Option<String>,
    pub event: EventPayload,
}

impl ActionContext {
    pub fn from_env() -> Result<Self, ContextError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ContextError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let event = match var("GITHUB_EVENT_PATH") {
            Some(path) => read_event(&path)?,
            None => EventPayload::default(),
        };

        let ctx = Self {
            repository: var("GITHUB_REPOSITORY"),
            base_ref: var("GITHUB_BASE_REF"),
            head_ref: var("GITHUB_HEAD_REF"),
            workspace: var("GITHUB_WORKSPACE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            api_url: var("GITHUB_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            server_url: var("GITHUB_SERVER_URL"),
            event,
        };
        debug!(
            repository = ?ctx.repository,
            base_ref = ?ctx.base_ref,
            pr = ?ctx.pr_number(),
            "loaded action context"
        );
        Ok(ctx)
    }

    /// The hosting repository, required by every flow.
    pub fn require_repository(&self) -> Result<&str, ContextError> {
        self.repository
            .as_deref()
            .ok_or_else(|| ContextError::MissingVar("GITHUB_REPOSITORY".into()))
    }

    pub fn pr_number(&self) -> Option<u64> {
        self.event.pull_request.as_ref().and_then(|pr| pr.number)
    }

    /// The PR head branch: `GITHUB_HEAD_REF`, else the payload's `head.ref`.
    pub fn head_branch(&self) -> Option<String> {
        self.head_ref.clone().or_else(|| {
            self.event
                .pull_request
                .as_ref()
                .and_then(|pr| pr.head.as_ref())
                .and_then(|head| head.ref_name.clone())
                .filter(|r| !r.is_empty())
        })
    }

    /// Whether the PR head lives in a different repository. A head whose
    /// repository is gone (deleted fork) counts as a fork.
    pub fn is_fork_pull_request(&self) -> bool {
        let Some(pr) = &self.event.pull_request else {
            return false;
        };
        let head_repo = pr
            .head
            .as_ref()
            .and_then(|h| h.repo.as_ref())
            .map(|r| r.full_name.as_str());
        head_repo != self.repository.as_deref()
    }
}

fn read_event(path: &str) -> Result<EventPayload, ContextError> {
    let text = std::fs::read_to_string(path).map_err(|e| ContextError::EventPayload {
        path: path.to_string(),
        detail: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| ContextError::EventPayload {
        path: path.to_string(),
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn context(vars: &[(&str, &str)]) -> ActionContext {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ActionContext::from_lookup(|k| map.get(k).cloned()).unwrap()
    }

    fn write_event(dir: &tempfile::TempDir, json: &str) -> String {
        let path = dir.path().join("event.json");
        std::fs::write(&path, json).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_defaults() {
        let ctx = context(&[]);
        assert_eq!(ctx.api_url, DEFAULT_API_URL);
        assert_eq!(ctx.workspace, PathBuf::from("."));
        assert!(ctx.pr_number().is_none());
        assert!(!ctx.is_fork_pull_request());
        assert!(matches!(
            ctx.require_repository(),
            Err(ContextError::MissingVar(_))
        ));
    }

    #[test]
    fn test_blank_variables_treated_as_unset() {
        let ctx = context(&[("GITHUB_BASE_REF", ""), ("GITHUB_API_URL", " ")]);
        assert!(ctx.base_ref.is_none());
        assert_eq!(ctx.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_pull_request_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_event(
            &dir,
            r#"{"pull_request":{"number":42,"head":{"ref":"rename-specs","repo":{"full_name":"acme/api"}}}}"#,
        );
        let ctx = context(&[
            ("GITHUB_EVENT_PATH", path.as_str()),
            ("GITHUB_REPOSITORY", "acme/api"),
            ("GITHUB_BASE_REF", "main"),
        ]);
        assert_eq!(ctx.pr_number(), Some(42));
        assert_eq!(ctx.head_branch().as_deref(), Some("rename-specs"));
        assert!(!ctx.is_fork_pull_request());
    }

    #[test]
    fn test_fork_detection() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_event(
            &dir,
            r#"{"pull_request":{"number":3,"head":{"ref":"patch","repo":{"full_name":"someone/api"}}}}"#,
        );
        let ctx = context(&[("GITHUB_EVENT_PATH", path.as_str()), ("GITHUB_REPOSITORY", "acme/api")]);
        assert!(ctx.is_fork_pull_request());

        let path = write_event(&dir, r#"{"pull_request":{"number":3,"head":{"ref":"patch","repo":null}}}"#);
        let ctx = context(&[("GITHUB_EVENT_PATH", path.as_str()), ("GITHUB_REPOSITORY", "acme/api")]);
        assert!(ctx.is_fork_pull_request());
    }

    #[test]
    fn test_head_ref_env_preferred() {
        let ctx = context(&[("GITHUB_HEAD_REF", "feature")]);
        assert_eq!(ctx.head_branch().as_deref(), Some("feature"));
    }

    #[test]
    fn test_unreadable_event_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_event(&dir, "not json");
        let map: HashMap<String, String> =
            [("GITHUB_EVENT_PATH".to_string(), path)].into_iter().collect();
        let err = ActionContext::from_lookup(|k| map.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ContextError::EventPayload { .. }));
    }
}
