//! Shared fixtures for the end-to-end tests.
//!
//! `FakeGitHub` stands in for the REST API and records every write call.
//! Git fixtures are plain local repositories; the "remote" is a bare repo on
//! disk, so no network I/O happens.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use mirrorsync_core::errors::GitHubError;
use mirrorsync_core::git::github::{
    Branch, BranchCommit, FileContent, GitHubCommit, GitHubCommitDetail, GitHubUser,
    GitHubUserSummary, MergeMethod, NewPullRequest, PermissionLevel, PullRequest,
    PullRequestRef, PutContent, Repository, RepositoryPermissions,
};
use mirrorsync_core::git::{GitClient, GitHubApi};

// ===========================================================================
// Fake GitHub API
// ===========================================================================

/// A write the pipelines made through the API.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreatePull {
        head: String,
        base: String,
        title: String,
    },
    UpdatePull {
        number: u64,
        body: String,
    },
    MergePull {
        number: u64,
        method: MergeMethod,
    },
    PutContent {
        path: String,
        branch: String,
        message: String,
        sha: Option<String>,
        author: String,
        content: String,
    },
}

#[derive(Debug, Default)]
pub struct FakeState {
    /// `None` makes `get_repository` answer 404.
    pub repository: Option<Repository>,
    pub open_pulls: Vec<PullRequest>,
    pub pull_commits: Vec<GitHubCommit>,
    /// Tip returned by `get_branch`.
    pub branch_sha: String,
    pub content_sha: String,
    pub merge_fails: bool,
    pub permission: Option<PermissionLevel>,
    pub next_pull_number: u64,
    pub calls: Vec<Call>,
}

pub struct FakeGitHub {
    pub state: Mutex<FakeState>,
}

impl FakeGitHub {
    /// A target `full_name` the token can push to, default branch `main`.
    pub fn new(full_name: &str) -> Self {
        Self {
            state: Mutex::new(FakeState {
                repository: Some(repository(full_name, true)),
                content_sha: "blob-sha-1".into(),
                next_pull_number: 1,
                ..FakeState::default()
            }),
        }
    }

    pub fn with<F: FnOnce(&mut FakeState)>(self, f: F) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }
}

pub fn repository(full_name: &str, push: bool) -> Repository {
    Repository {
        full_name: full_name.into(),
        default_branch: "main".into(),
        permissions: Some(RepositoryPermissions {
            admin: false,
            push,
            pull: true,
        }),
    }
}

pub fn pull_request(number: u64, head: &str, base: &str) -> PullRequest {
    PullRequest {
        number,
        title: "Update synced files".into(),
        body: Some("body".into()),
        html_url: format!("https://github.com/acme/target/pull/{}", number),
        state: "open".into(),
        head: PullRequestRef {
            ref_name: head.into(),
            sha: "0000000".into(),
        },
        base: PullRequestRef {
            ref_name: base.into(),
            sha: "0000000".into(),
        },
    }
}

pub fn pr_commit(sha: &str, message: &str, login: Option<&str>) -> GitHubCommit {
    GitHubCommit {
        sha: sha.into(),
        commit: GitHubCommitDetail {
            message: message.into(),
        },
        author: login.map(|l| GitHubUserSummary { login: l.into() }),
    }
}

#[async_trait]
impl GitHubApi for FakeGitHub {
    async fn get_repository(&self, repo: &str) -> Result<Repository, GitHubError> {
        self.state
            .lock()
            .unwrap()
            .repository
            .clone()
            .ok_or_else(|| GitHubError::NotFound(format!("repository {}", repo)))
    }

    async fn get_branch(&self, _repo: &str, branch: &str) -> Result<Branch, GitHubError> {
        let state = self.state.lock().unwrap();
        if state.branch_sha.is_empty() {
            return Err(GitHubError::NotFound(format!("branch {}", branch)));
        }
        Ok(Branch {
            name: branch.into(),
            commit: BranchCommit {
                sha: state.branch_sha.clone(),
            },
        })
    }

    async fn list_pulls(&self, _repo: &str, head: &str) -> Result<Vec<PullRequest>, GitHubError> {
        let branch = head.split_once(':').map(|(_, b)| b).unwrap_or(head);
        Ok(self
            .state
            .lock()
            .unwrap()
            .open_pulls
            .iter()
            .filter(|pr| pr.head.ref_name == branch)
            .cloned()
            .collect())
    }

    async fn create_pull(
        &self,
        _repo: &str,
        pull: &NewPullRequest,
    ) -> Result<PullRequest, GitHubError> {
        let mut state = self.state.lock().unwrap();
        let number = state.next_pull_number;
        state.next_pull_number += 1;
        state.calls.push(Call::CreatePull {
            head: pull.head.clone(),
            base: pull.base.clone(),
            title: pull.title.clone(),
        });
        let created = pull_request(number, &pull.head, &pull.base);
        state.open_pulls.push(created.clone());
        Ok(created)
    }

    async fn update_pull(
        &self,
        _repo: &str,
        number: u64,
        body: &str,
    ) -> Result<PullRequest, GitHubError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::UpdatePull {
            number,
            body: body.into(),
        });
        state
            .open_pulls
            .iter()
            .find(|pr| pr.number == number)
            .cloned()
            .ok_or_else(|| GitHubError::NotFound(format!("pull request #{}", number)))
    }

    async fn merge_pull(
        &self,
        _repo: &str,
        number: u64,
        method: MergeMethod,
    ) -> Result<(), GitHubError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::MergePull { number, method });
        if state.merge_fails {
            return Err(GitHubError::ApiError {
                status: 405,
                body: "Pull Request is not mergeable".into(),
            });
        }
        Ok(())
    }

    async fn get_content(
        &self,
        _repo: &str,
        path: &str,
        _git_ref: &str,
    ) -> Result<FileContent, GitHubError> {
        Ok(FileContent {
            kind: "file".into(),
            path: path.into(),
            sha: self.state.lock().unwrap().content_sha.clone(),
        })
    }

    async fn put_content(&self, _repo: &str, request: &PutContent) -> Result<(), GitHubError> {
        self.state.lock().unwrap().calls.push(Call::PutContent {
            path: request.path.clone(),
            branch: request.branch.clone(),
            message: request.message.clone(),
            sha: request.sha.clone(),
            author: request.identity.name.clone(),
            content: String::from_utf8_lossy(&request.content).into_owned(),
        });
        Ok(())
    }

    async fn list_pull_commits(
        &self,
        _repo: &str,
        _number: u64,
    ) -> Result<Vec<GitHubCommit>, GitHubError> {
        Ok(self.state.lock().unwrap().pull_commits.clone())
    }

    async fn get_collaborator_permission(
        &self,
        _repo: &str,
        _username: &str,
    ) -> Result<PermissionLevel, GitHubError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .permission
            .unwrap_or(PermissionLevel::Read))
    }

    async fn get_authenticated_user(&self) -> Result<GitHubUser, GitHubError> {
        Ok(GitHubUser {
            login: "sync-bot".into(),
            id: 1,
        })
    }
}

// ===========================================================================
// Git fixtures
// ===========================================================================

pub fn init_repo(dir: &Path) -> GitClient {
    let mut opts = git2::RepositoryInitOptions::new();
    opts.initial_head("main");
    git2::Repository::init_opts(dir, &opts).expect("failed to init repo");
    GitClient::open(dir).expect("failed to open repo")
}

pub fn write_file(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

pub fn commit(git: &GitClient, message: &str) -> String {
    git.commit_all(message, "Test User", "test@example.com")
        .expect("failed to commit")
        .to_string()
}

/// A bare "origin" whose `main` holds `files`, plus the seed checkout that
/// pushed it. Returns the bare repo path.
pub fn seed_origin(root: &Path, files: &[(&str, &str)]) -> PathBuf {
    let bare = root.join("origin.git");
    let mut opts = git2::RepositoryInitOptions::new();
    opts.bare(true).initial_head("main");
    git2::Repository::init_opts(&bare, &opts).expect("failed to init bare repo");

    let seed_dir = root.join("seed");
    let seed = init_repo(&seed_dir);
    git2::Repository::open(&seed_dir)
        .unwrap()
        .remote("origin", bare.to_str().unwrap())
        .expect("failed to add origin remote");
    for (rel, body) in files {
        write_file(&seed_dir, rel, body);
    }
    commit(&seed, "initial commit");
    seed.push("main", None, false)
        .expect("failed to push initial commit to origin");
    bare
}

/// A bare "origin" with no commits at all.
pub fn empty_origin(root: &Path) -> PathBuf {
    let bare = root.join("empty.git");
    git2::Repository::init_bare(&bare).expect("failed to init bare repo");
    bare
}

/// Contents of `path` at the tip of `branch` in a (bare) repository.
pub fn read_branch_file(repo_path: &Path, branch: &str, path: &str) -> Option<String> {
    let repo = git2::Repository::open(repo_path).unwrap();
    let reference = repo
        .find_reference(&format!("refs/heads/{}", branch))
        .ok()?;
    let tree = reference.peel_to_tree().unwrap();
    let entry = tree.get_path(Path::new(path)).ok()?;
    let blob = repo.find_blob(entry.id()).unwrap();
    Some(String::from_utf8_lossy(blob.content()).into_owned())
}

pub fn branch_exists(repo_path: &Path, branch: &str) -> bool {
    git2::Repository::open(repo_path)
        .unwrap()
        .find_reference(&format!("refs/heads/{}", branch))
        .is_ok()
}

pub fn branch_commit_message(repo_path: &Path, branch: &str) -> String {
    let repo = git2::Repository::open(repo_path).unwrap();
    let commit = repo
        .find_reference(&format!("refs/heads/{}", branch))
        .unwrap()
        .peel_to_commit()
        .unwrap();
    commit.message().unwrap_or("").to_string()
}
