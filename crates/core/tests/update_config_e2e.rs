//! End-to-end tests for the `update-config` pipeline.
//!
//! Each test builds a workspace repository whose pull-request history renames
//! or deletes mapped files, then runs the updater against the recording
//! GitHub fake.

mod common;

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use mirrorsync_core::changes::{resolve_base_ref, BOT_LOGIN};
use mirrorsync_core::config::UpdateConfigSettings;
use mirrorsync_core::config_doc::DEFAULT_CONFIG_PATH;
use mirrorsync_core::errors::ContextError;
use mirrorsync_core::git::GitClient;
use mirrorsync_core::{ActionContext, ConfigUpdater, CoreError, UpdateOutcome};

use common::{commit, init_repo, pr_commit, write_file, Call, FakeGitHub};

const WORKFLOW: &str = r#"name: Sync OpenAPI
on:
  pull_request:
    branches: [main]
jobs:
  sync:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - name: Sync
        uses: fern-api/sync-openapi@v2
        with:
          repository: acme/fern-config
          openapi: |
            - source: specs/old.yml
              destination: fern/old.yml
            - source: specs/gone.yml
              destination: fern/gone.yml
            - source: specs/keep.yml
              destination: fern/keep.yml
"#;

const OLD: &str = "openapi: 3.0.0\ninfo:\n  title: Old service\n  version: 1.0.0\npaths: {}\n";
const GONE: &str = "openapi: 3.0.0\ninfo:\n  title: Retired service\n  version: 2.0.0\npaths: {}\n";
const KEEP: &str = "openapi: 3.0.0\ninfo:\n  title: Kept service\n  version: 3.0.0\npaths: {}\n";

struct Workspace {
    _dir: TempDir,
    root: PathBuf,
    git: GitClient,
    base_sha: String,
    event_path: PathBuf,
}

/// A workspace whose base commit holds the workflow and three specs.
fn workspace(head_repo: &str) -> Workspace {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("ws");
    let git = init_repo(&root);
    write_file(&root, DEFAULT_CONFIG_PATH, WORKFLOW);
    write_file(&root, "specs/old.yml", OLD);
    write_file(&root, "specs/gone.yml", GONE);
    write_file(&root, "specs/keep.yml", KEEP);
    let base_sha = commit(&git, "add specs");

    let event_path = dir.path().join("event.json");
    let event = serde_json::json!({
        "pull_request": {
            "number": 5,
            "head": { "ref": "feature", "repo": { "full_name": head_repo } }
        }
    });
    std::fs::write(&event_path, event.to_string()).unwrap();

    Workspace {
        _dir: dir,
        root,
        git,
        base_sha,
        event_path,
    }
}

fn rename(root: &Path, from: &str, to: &str) {
    let body = std::fs::read_to_string(root.join(from)).unwrap();
    std::fs::remove_file(root.join(from)).unwrap();
    write_file(root, to, &body);
}

fn context(ws: &Workspace) -> ActionContext {
    let root = ws.root.to_str().unwrap().to_string();
    let event = ws.event_path.to_str().unwrap().to_string();
    ActionContext::from_lookup(|key| match key {
        "GITHUB_REPOSITORY" => Some("acme/api".into()),
        "GITHUB_BASE_REF" => Some("main".into()),
        "GITHUB_HEAD_REF" => Some("feature".into()),
        "GITHUB_WORKSPACE" => Some(root.clone()),
        "GITHUB_EVENT_PATH" => Some(event.clone()),
        _ => None,
    })
    .unwrap()
}

async fn run(ws: &Workspace, api: &FakeGitHub) -> Result<UpdateOutcome, CoreError> {
    ConfigUpdater::new(api, context(ws), UpdateConfigSettings::default())
        .run()
        .await
}

fn put_content(api: &FakeGitHub) -> (String, String, String, Option<String>, String, String) {
    let calls = api.calls();
    assert_eq!(calls.len(), 1, "expected a single contents write: {:?}", calls);
    match calls.into_iter().next().unwrap() {
        Call::PutContent {
            path,
            branch,
            message,
            sha,
            author,
            content,
        } => (path, branch, message, sha, author, content),
        other => panic!("unexpected call: {:?}", other),
    }
}

#[tokio::test]
async fn test_rename_and_delete_are_committed_to_head_branch() {
    let ws = workspace("acme/api");
    rename(&ws.root, "specs/old.yml", "specs/new.yml");
    std::fs::remove_file(ws.root.join("specs/gone.yml")).unwrap();
    commit(&ws.git, "reorganize specs");
    let api = FakeGitHub::new("acme/api").with(|s| s.branch_sha = ws.base_sha.clone());

    let outcome = run(&ws, &api).await.unwrap();

    assert_eq!(
        outcome,
        UpdateOutcome::Committed {
            branch: "feature".into(),
            removed: 1,
            renamed: 1,
        }
    );
    let (path, branch, message, sha, author, content) = put_content(&api);
    assert_eq!(path, DEFAULT_CONFIG_PATH);
    assert_eq!(branch, "feature");
    assert!(message.contains("[skip ci]"));
    assert_eq!(sha.as_deref(), Some("blob-sha-1"));
    assert_eq!(author, BOT_LOGIN);
    assert!(content.contains("specs/new.yml"));
    assert!(content.contains("fern/new.yml"));
    assert!(content.contains("specs/keep.yml"));
    assert!(!content.contains("specs/old.yml"));
    assert!(!content.contains("gone.yml"));
    assert!(content.contains("repository: acme/fern-config"));

    let on_disk = std::fs::read_to_string(ws.root.join(DEFAULT_CONFIG_PATH)).unwrap();
    assert_eq!(on_disk, content);
}

#[tokio::test]
async fn test_untracked_changes_leave_config_alone() {
    let ws = workspace("acme/api");
    write_file(&ws.root, "docs/README.md", "# api\n");
    commit(&ws.git, "add docs");
    rename(&ws.root, "docs/README.md", "README.md");
    commit(&ws.git, "move readme");
    let api = FakeGitHub::new("acme/api").with(|s| s.branch_sha = ws.base_sha.clone());

    let outcome = run(&ws, &api).await.unwrap();

    assert_eq!(outcome, UpdateOutcome::NoTrackedChanges);
    assert!(api.calls().is_empty());
    let on_disk = std::fs::read_to_string(ws.root.join(DEFAULT_CONFIG_PATH)).unwrap();
    assert_eq!(on_disk, WORKFLOW);
}

#[tokio::test]
async fn test_changes_before_last_automated_commit_are_not_reapplied() {
    let ws = workspace("acme/api");
    rename(&ws.root, "specs/old.yml", "specs/new.yml");
    commit(&ws.git, "rename old spec");
    let automated = commit(&ws.git, "chore: update sync config [skip ci]");
    rename(&ws.root, "specs/keep.yml", "specs/kept.yml");
    commit(&ws.git, "rename kept spec");

    let api = FakeGitHub::new("acme/api").with(|s| {
        s.branch_sha = ws.base_sha.clone();
        s.pull_commits = vec![
            pr_commit("c1", "rename old spec", Some("dev")),
            pr_commit(&automated, "chore: update sync config [skip ci]", Some(BOT_LOGIN)),
            pr_commit("c3", "rename kept spec", Some("dev")),
        ];
    });

    let outcome = run(&ws, &api).await.unwrap();

    assert_eq!(
        outcome,
        UpdateOutcome::Committed {
            branch: "feature".into(),
            removed: 0,
            renamed: 1,
        }
    );
    let (_, _, _, _, _, content) = put_content(&api);
    assert!(content.contains("specs/kept.yml"));
    assert!(content.contains("specs/old.yml"));
}

#[tokio::test]
async fn test_fork_pull_request_is_not_committed() {
    let ws = workspace("someone/api");
    std::fs::remove_file(ws.root.join("specs/gone.yml")).unwrap();
    commit(&ws.git, "drop retired spec");
    let api = FakeGitHub::new("acme/api").with(|s| s.branch_sha = ws.base_sha.clone());

    let outcome = run(&ws, &api).await.unwrap();

    assert_eq!(
        outcome,
        UpdateOutcome::ForkSkipped {
            removed: 1,
            renamed: 0,
        }
    );
    assert!(api.calls().is_empty());
    let on_disk = std::fs::read_to_string(ws.root.join(DEFAULT_CONFIG_PATH)).unwrap();
    assert!(!on_disk.contains("gone.yml"));
}

#[tokio::test]
async fn test_missing_mapping_block_is_an_error() {
    let ws = workspace("acme/api");
    write_file(
        &ws.root,
        DEFAULT_CONFIG_PATH,
        "jobs:\n  build:\n    steps:\n      - run: make\n",
    );
    let api = FakeGitHub::new("acme/api").with(|s| s.branch_sha = ws.base_sha.clone());

    let err = run(&ws, &api).await.unwrap_err();

    assert!(matches!(err, CoreError::Config(_)));
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_base_ref_prefers_latest_automated_commit() {
    let api = FakeGitHub::new("acme/api").with(|s| {
        s.branch_sha = "tip".into();
        s.pull_commits = vec![
            pr_commit("a1", "fix [skip ci]", Some(BOT_LOGIN)),
            pr_commit("h1", "feature work [skip ci]", Some("dev")),
            pr_commit("a2", "chore: update sync config [skip ci]", Some(BOT_LOGIN)),
            pr_commit("h2", "more work", Some("dev")),
        ];
    });

    let base = resolve_base_ref(&api, "acme/api", Some("main"), Some(5))
        .await
        .unwrap();
    assert_eq!(base, "a2");
}

#[tokio::test]
async fn test_base_ref_falls_back_to_branch_tip() {
    let api = FakeGitHub::new("acme/api").with(|s| {
        s.branch_sha = "tip".into();
        s.pull_commits = vec![pr_commit("h1", "feature work", None)];
    });

    let base = resolve_base_ref(&api, "acme/api", Some("main"), Some(5))
        .await
        .unwrap();
    assert_eq!(base, "tip");
}

#[tokio::test]
async fn test_base_ref_requires_pull_request_context() {
    let api = FakeGitHub::new("acme/api");

    let err = resolve_base_ref(&api, "acme/api", None, Some(5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Context(ContextError::NotPullRequest)
    ));

    let err = resolve_base_ref(&api, "acme/api", Some("main"), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Context(ContextError::MissingPullRequestNumber)
    ));
}
