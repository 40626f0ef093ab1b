//! TOML-based configuration for mirrorsync.
//!
//! The token is never stored in the file: `target.token_env` names the
//! environment variable that holds it and [`SyncConfig::resolve_env_vars`]
//! reads it at runtime, falling back to `GITHUB_TOKEN`. Action inputs and CLI
//! flags are layered on top by the binary before [`SyncConfig::validate`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config_doc::{DEFAULT_CONFIG_PATH, DEFAULT_MAPPING_KEYS};
use crate::context::DEFAULT_API_URL;
use crate::errors::ConfigError;
use crate::materialize::MissingSourcePolicy;

/// Variable consulted when `token_env` is unset or empty.
pub const FALLBACK_TOKEN_ENV: &str = "GITHUB_TOKEN";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub sync: SyncSection,

    #[serde(default)]
    pub commit: CommitConfig,

    #[serde(default)]
    pub pull_request: PullRequestConfig,

    #[serde(default)]
    pub update_config: UpdateConfigSettings,
}

// ---------------------------------------------------------------------------
// Target repository
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Target repository in `owner/name` format.
    #[serde(default)]
    pub repository: String,

    /// Environment variable holding the token.
    #[serde(default)]
    pub token_env: Option<String>,

    /// Working branch that receives the synced files.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Branch pull requests target. Defaults to the repository's default
    /// branch.
    #[serde(default)]
    pub base_branch: Option<String>,

    /// Clone from this URL or path instead of deriving one from `api_url`.
    #[serde(default)]
    pub clone_url: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Web host for clone URLs, e.g. `https://ghe.example.com`.
    #[serde(default)]
    pub server_url: Option<String>,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            repository: String::new(),
            token_env: None,
            branch: default_branch(),
            base_branch: None,
            clone_url: None,
            api_url: default_api_url(),
            server_url: None,
            token: None,
        }
    }
}

impl TargetConfig {
    pub fn clone_url(&self) -> String {
        crate::git::remote_url::resolve_clone_url(
            self.clone_url.as_deref(),
            &self.api_url,
            self.server_url.as_deref(),
            &self.repository,
        )
    }
}

fn default_branch() -> String {
    "update-openapi".into()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.into()
}

// ---------------------------------------------------------------------------
// Sync behaviour
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncSection {
    /// Push straight to the working branch and squash-merge the PR.
    #[serde(default)]
    pub auto_merge: bool,

    #[serde(default)]
    pub missing_source: MissingSourcePolicy,

    /// Root the mapping sources are relative to. Defaults to the workspace.
    #[serde(default)]
    pub source_root: Option<PathBuf>,

    /// Inline mapping payload (YAML or JSON).
    #[serde(default)]
    pub mappings: Option<String>,
}

// ---------------------------------------------------------------------------
// Commit identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitConfig {
    /// Commit message. Defaults to `Sync files from <source repository>`.
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default = "default_author_name")]
    pub author_name: String,

    #[serde(default = "default_author_email")]
    pub author_email: String,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            message: None,
            author_name: default_author_name(),
            author_email: default_author_email(),
        }
    }
}

fn default_author_name() -> String {
    "github-actions".into()
}

fn default_author_email() -> String {
    "github-actions@github.com".into()
}

// ---------------------------------------------------------------------------
// Pull request text
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestConfig {
    #[serde(default = "default_pr_title")]
    pub title: String,

    #[serde(default = "default_pr_body")]
    pub body: String,
}

impl Default for PullRequestConfig {
    fn default() -> Self {
        Self {
            title: default_pr_title(),
            body: default_pr_body(),
        }
    }
}

fn default_pr_title() -> String {
    "Update synced files".into()
}

fn default_pr_body() -> String {
    "Update file specifications based on changes in the source repository.".into()
}

// ---------------------------------------------------------------------------
// update-config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfigSettings {
    /// Workflow file holding the mapping, relative to the workspace.
    #[serde(default = "default_config_path")]
    pub path: PathBuf,

    /// Step inputs that may carry the mapping, in lookup order.
    #[serde(default = "default_mapping_keys")]
    pub mapping_keys: Vec<String>,

    #[serde(default = "default_update_message")]
    pub commit_message: String,
}

impl Default for UpdateConfigSettings {
    fn default() -> Self {
        Self {
            path: default_config_path(),
            mapping_keys: default_mapping_keys(),
            commit_message: default_update_message(),
        }
    }
}

fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

fn default_mapping_keys() -> Vec<String> {
    DEFAULT_MAPPING_KEYS.iter().map(|k| k.to_string()).collect()
}

fn default_update_message() -> String {
    "chore: update renamed/deleted files referenced in sync config [skip ci]".into()
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl SyncConfig {
    /// Load a [`SyncConfig`] from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: SyncConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve the token from the process environment.
    pub fn resolve_env_vars(&mut self) {
        self.resolve_env_vars_with(|name| std::env::var(name).ok());
    }

    /// Resolve the token through `lookup`: `token_env` first, then
    /// `GITHUB_TOKEN`. An already-set token (from a flag) is kept.
    pub fn resolve_env_vars_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.target.token.as_deref().is_some_and(|t| !t.is_empty()) {
            return;
        }
        let mut names: Vec<&str> = Vec::new();
        if let Some(name) = self.target.token_env.as_deref().filter(|n| !n.is_empty()) {
            names.push(name);
        }
        names.push(FALLBACK_TOKEN_ENV);

        self.target.token = names.iter().find_map(|name| match lookup(name) {
            Some(val) if !val.is_empty() => {
                debug!(env_name = %name, "resolved token");
                Some(val)
            }
            _ => None,
        });
        if self.target.token.is_none() {
            warn!("no token found; API calls and pushes to private remotes will fail");
        }
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let repo = self.target.repository.trim();
        if repo.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "target.repository".into(),
                detail: "target repository must not be empty".into(),
            });
        }
        let mut parts = repo.split('/');
        let well_formed = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
        );
        if !well_formed {
            return Err(ConfigError::InvalidValue {
                field: "target.repository".into(),
                detail: "repository must be in 'owner/repo' format".into(),
            });
        }
        if self.target.branch.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "target.branch".into(),
                detail: "branch must not be empty".into(),
            });
        }
        if self.sync.mappings.as_deref().map_or(true, |m| m.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "sync.mappings".into(),
                detail: "a file mapping is required".into(),
            });
        }
        if self.update_config.mapping_keys.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "update_config.mapping_keys".into(),
                detail: "at least one mapping key is required".into(),
            });
        }
        Ok(())
    }

    /// Generate a default TOML config template string.
    pub fn default_template() -> &'static str {
        r#"# mirrorsync configuration
# Action inputs (INPUT_*) and command-line flags override these values.

[target]
repository = "your-org/your-docs-repo"
token_env = "MIRRORSYNC_TOKEN"   # falls back to GITHUB_TOKEN
branch = "update-openapi"
# base_branch = "main"           # defaults to the repository's default branch
# api_url = "https://api.github.com"
# server_url = "https://github.com"

[sync]
auto_merge = false
missing_source = "fail"          # or "skip"
mappings = """
- source: openapi/openapi.yml
  destination: fern/openapi/openapi.yml
"""

[commit]
author_name = "github-actions"
author_email = "github-actions@github.com"

[pull_request]
title = "Update synced files"
body = "Update file specifications based on changes in the source repository."

[update_config]
path = ".github/workflows/sync-openapi.yml"
mapping_keys = ["openapi", "files", "sources"]
"#
    }
}
