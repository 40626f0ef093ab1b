//! GitHub REST API access.
//!
//! [`GitHubApi`] is the narrow capability set the sync and update-config
//! pipelines need; [`GitHubClient`] implements it over `reqwest`. Tests inject
//! an in-memory implementation instead.

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::errors::GitHubError;

const PAGE_SIZE: usize = 100;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub full_name: String,
    pub default_branch: String,
    /// Present only for authenticated requests; reflects the token's access.
    #[serde(default)]
    pub permissions: Option<RepositoryPermissions>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryPermissions {
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub pull: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub commit: BranchCommit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchCommit {
    pub sha: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubCommit {
    pub sha: String,
    pub commit: GitHubCommitDetail,
    pub author: Option<GitHubUserSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubCommitDetail {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubUserSummary {
    pub login: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    pub id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub html_url: String,
    pub state: String,
    pub head: PullRequestRef,
    pub base: PullRequestRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
}

/// Payload for `POST /repos/{repo}/pulls`.
#[derive(Debug, Clone, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMethod {
    Merge,
    Squash,
    Rebase,
}

impl std::fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merge => write!(f, "merge"),
            Self::Squash => write!(f, "squash"),
            Self::Rebase => write!(f, "rebase"),
        }
    }
}

/// A file returned by the contents API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    /// Blob SHA, required as the optimistic-concurrency token on update.
    pub sha: String,
}

/// Author/committer identity for contents-API commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

/// Request for `PUT /repos/{repo}/contents/{path}`.
#[derive(Debug, Clone)]
pub struct PutContent {
    pub path: String,
    pub message: String,
    /// Raw file bytes; base64-encoded on the wire.
    pub content: Vec<u8>,
    /// Current blob SHA when updating an existing file.
    pub sha: Option<String>,
    pub branch: String,
    pub identity: CommitIdentity,
}

/// A collaborator's effective permission on a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionLevel {
    Admin,
    Maintain,
    Write,
    Triage,
    Read,
    None,
}

impl PermissionLevel {
    pub fn from_api(value: &str) -> Self {
        match value {
            "admin" => Self::Admin,
            "maintain" => Self::Maintain,
            "write" => Self::Write,
            "triage" => Self::Triage,
            "read" => Self::Read,
            _ => Self::None,
        }
    }

    /// Whether this level allows pushing branches and editing pull requests.
    pub fn can_push(self) -> bool {
        matches!(self, Self::Admin | Self::Maintain | Self::Write)
    }
}

#[derive(Debug, Deserialize)]
struct CollaboratorPermission {
    permission: String,
}

// ---------------------------------------------------------------------------
// Capability trait
// ---------------------------------------------------------------------------

/// The GitHub operations the pipelines depend on. `repo` is `owner/name`.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    async fn get_repository(&self, repo: &str) -> Result<Repository, GitHubError>;

    async fn get_branch(&self, repo: &str, branch: &str) -> Result<Branch, GitHubError>;

    /// Open pull requests whose head is `head` (`owner:branch`).
    async fn list_pulls(&self, repo: &str, head: &str)
        -> Result<Vec<PullRequest>, GitHubError>;

    async fn create_pull(
        &self,
        repo: &str,
        pull: &NewPullRequest,
    ) -> Result<PullRequest, GitHubError>;

    async fn update_pull(
        &self,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<PullRequest, GitHubError>;

    async fn merge_pull(
        &self,
        repo: &str,
        number: u64,
        method: MergeMethod,
    ) -> Result<(), GitHubError>;

    async fn get_content(
        &self,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<FileContent, GitHubError>;

    async fn put_content(&self, repo: &str, request: &PutContent) -> Result<(), GitHubError>;

    /// Commits of a pull request, oldest first.
    async fn list_pull_commits(
        &self,
        repo: &str,
        number: u64,
    ) -> Result<Vec<GitHubCommit>, GitHubError>;

    async fn get_collaborator_permission(
        &self,
        repo: &str,
        username: &str,
    ) -> Result<PermissionLevel, GitHubError>;

    async fn get_authenticated_user(&self) -> Result<GitHubUser, GitHubError>;
}

// ---------------------------------------------------------------------------
// reqwest implementation
// ---------------------------------------------------------------------------

/// Asynchronous GitHub REST API client.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Result<Self, GitHubError> {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let token = token.into();
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("mirrorsync/0.1"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        info!(api_url = %api_url, "created GitHubClient");
        Ok(Self {
            http,
            api_url,
            token,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn check_response(resp: Response, what: &str) -> Result<Response, GitHubError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::TOO_MANY_REQUESTS || is_rate_limited(&resp) {
            let reset = resp
                .headers()
                .get("x-ratelimit-reset")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string();
            return Err(GitHubError::RateLimited { reset_at: reset });
        }
        let body = resp.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(GitHubError::NotFound(what.to_string())),
            StatusCode::UNAUTHORIZED => Err(GitHubError::AuthenticationFailed(format!(
                "HTTP {}: {}",
                status,
                api_message(&body)
            ))),
            _ => Err(GitHubError::ApiError {
                status: status.as_u16(),
                body: api_message(&body),
            }),
        }
    }
}

fn is_rate_limited(resp: &Response) -> bool {
    resp.status() == StatusCode::FORBIDDEN
        && resp
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            == Some("0")
}

/// Pull the `message` field out of a GitHub error body when there is one.
fn api_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl GitHubApi for GitHubClient {
    #[instrument(skip(self))]
    async fn get_repository(&self, repo: &str) -> Result<Repository, GitHubError> {
        let url = format!("{}/repos/{}", self.api_url, repo);
        let resp = self.http.get(&url).bearer_auth(&self.token).send().await?;
        let resp = Self::check_response(resp, &format!("repos/{}", repo)).await?;
        let repository: Repository = resp.json().await?;
        debug!(default_branch = %repository.default_branch, "fetched repository");
        Ok(repository)
    }

    #[instrument(skip(self))]
    async fn get_branch(&self, repo: &str, branch: &str) -> Result<Branch, GitHubError> {
        let url = format!("{}/repos/{}/branches/{}", self.api_url, repo, branch);
        let resp = self.http.get(&url).bearer_auth(&self.token).send().await?;
        let resp = Self::check_response(resp, &format!("branch {}", branch)).await?;
        let branch: Branch = resp.json().await?;
        debug!(sha = %branch.commit.sha, "fetched branch");
        Ok(branch)
    }

    #[instrument(skip(self))]
    async fn list_pulls(
        &self,
        repo: &str,
        head: &str,
    ) -> Result<Vec<PullRequest>, GitHubError> {
        let url = format!("{}/repos/{}/pulls", self.api_url, repo);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("head", head), ("state", "open")])
            .send()
            .await?;
        let resp = Self::check_response(resp, "pulls").await?;
        let prs: Vec<PullRequest> = resp.json().await?;
        debug!(count = prs.len(), "listed open pull requests");
        Ok(prs)
    }

    #[instrument(skip(self, pull), fields(head = %pull.head, base = %pull.base))]
    async fn create_pull(
        &self,
        repo: &str,
        pull: &NewPullRequest,
    ) -> Result<PullRequest, GitHubError> {
        let url = format!("{}/repos/{}/pulls", self.api_url, repo);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(pull)
            .send()
            .await?;
        let resp = Self::check_response(resp, "pulls").await?;
        let pr: PullRequest = resp.json().await?;
        info!(number = pr.number, url = %pr.html_url, "created pull request");
        Ok(pr)
    }

    #[instrument(skip(self, body))]
    async fn update_pull(
        &self,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<PullRequest, GitHubError> {
        let url = format!("{}/repos/{}/pulls/{}", self.api_url, repo, number);
        let resp = self
            .http
            .patch(&url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await?;
        let resp = Self::check_response(resp, &format!("pull #{}", number)).await?;
        let pr: PullRequest = resp.json().await?;
        info!(number, "updated pull request");
        Ok(pr)
    }

    #[instrument(skip(self))]
    async fn merge_pull(
        &self,
        repo: &str,
        number: u64,
        method: MergeMethod,
    ) -> Result<(), GitHubError> {
        let url = format!("{}/repos/{}/pulls/{}/merge", self.api_url, repo, number);
        let payload = serde_json::json!({ "merge_method": method.to_string() });
        let resp = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;
        Self::check_response(resp, &format!("pull #{}", number)).await?;
        info!(number, %method, "merged pull request");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_content(
        &self,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<FileContent, GitHubError> {
        let url = format!("{}/repos/{}/contents/{}", self.api_url, repo, path);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("ref", git_ref)])
            .send()
            .await?;
        let resp = Self::check_response(resp, path).await?;
        let value: serde_json::Value = resp.json().await?;
        if value.is_array() {
            return Err(GitHubError::ParseError(format!(
                "path {} exists but is a directory",
                path
            )));
        }
        let content: FileContent =
            serde_json::from_value(value).map_err(|e| GitHubError::ParseError(e.to_string()))?;
        if content.kind != "file" {
            return Err(GitHubError::ParseError(format!(
                "path {} exists but is not a file ({})",
                path, content.kind
            )));
        }
        Ok(content)
    }

    #[instrument(skip(self, request), fields(path = %request.path, branch = %request.branch))]
    async fn put_content(&self, repo: &str, request: &PutContent) -> Result<(), GitHubError> {
        let url = format!("{}/repos/{}/contents/{}", self.api_url, repo, request.path);
        let mut payload = serde_json::json!({
            "message": request.message,
            "content": base64::engine::general_purpose::STANDARD.encode(&request.content),
            "branch": request.branch,
            "committer": request.identity,
            "author": request.identity,
        });
        if let Some(sha) = &request.sha {
            payload["sha"] = serde_json::Value::String(sha.clone());
        }
        let resp = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;
        Self::check_response(resp, &request.path).await?;
        info!("committed file through contents API");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_pull_commits(
        &self,
        repo: &str,
        number: u64,
    ) -> Result<Vec<GitHubCommit>, GitHubError> {
        let url = format!("{}/repos/{}/pulls/{}/commits", self.api_url, repo, number);
        let mut commits = Vec::new();
        let mut page = 1usize;
        loop {
            let resp = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .query(&[("per_page", PAGE_SIZE), ("page", page)])
                .send()
                .await?;
            let resp = Self::check_response(resp, &format!("pull #{} commits", number)).await?;
            let batch: Vec<GitHubCommit> = resp.json().await?;
            let done = batch.len() < PAGE_SIZE;
            commits.extend(batch);
            if done {
                break;
            }
            page += 1;
        }
        debug!(count = commits.len(), number, "fetched PR commits");
        Ok(commits)
    }

    #[instrument(skip(self))]
    async fn get_collaborator_permission(
        &self,
        repo: &str,
        username: &str,
    ) -> Result<PermissionLevel, GitHubError> {
        let url = format!(
            "{}/repos/{}/collaborators/{}/permission",
            self.api_url, repo, username
        );
        let resp = self.http.get(&url).bearer_auth(&self.token).send().await?;
        let resp = Self::check_response(resp, &format!("collaborator {}", username)).await?;
        let body: CollaboratorPermission = resp.json().await?;
        let level = PermissionLevel::from_api(&body.permission);
        debug!(username, ?level, "fetched collaborator permission");
        Ok(level)
    }

    #[instrument(skip(self))]
    async fn get_authenticated_user(&self) -> Result<GitHubUser, GitHubError> {
        let url = format!("{}/user", self.api_url);
        let resp = self.http.get(&url).bearer_auth(&self.token).send().await?;
        let resp = Self::check_response(resp, "user").await?;
        let user: GitHubUser = resp.json().await?;
        debug!(login = %user.login, "fetched authenticated user");
        Ok(user)
    }
}
