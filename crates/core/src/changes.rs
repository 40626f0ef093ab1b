//! Change-set resolution.
//!
//! Determines what happened to each tracked source path between a base commit
//! and a head commit. History is walked locally (the checkout must contain the
//! full range); per-commit rename and delete events are folded into at most one
//! terminal [`ChangeRecord`] per originally tracked path.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, instrument};

use crate::errors::{ContextError, CoreError, GitError};
use crate::git::{GitClient, GitHubApi};

/// Commit message marker carried by automated config commits.
pub const SKIP_CI_MARKER: &str = "[skip ci]";

/// Login of the identity automated config commits are attributed to.
pub const BOT_LOGIN: &str = "github-actions[bot]";

/// A single rename or delete observed in one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathEvent {
    Renamed { from: String, to: String },
    Deleted { path: String },
}

/// The net outcome for one originally tracked path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeRecord {
    Deleted { path: String },
    Renamed { from: String, to: String },
}

impl ChangeRecord {
    /// The tracked path this record describes.
    pub fn original(&self) -> &str {
        match self {
            Self::Deleted { path } => path,
            Self::Renamed { from, .. } => from,
        }
    }
}

/// Change records keyed by original path. Unchanged paths are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    records: BTreeMap<String, ChangeRecord>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: ChangeRecord) {
        self.records.insert(record.original().to_string(), record);
    }

    pub fn get(&self, original: &str) -> Option<&ChangeRecord> {
        self.records.get(original)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.records.values()
    }
}

impl FromIterator<ChangeRecord> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = ChangeRecord>>(iter: I) -> Self {
        let mut set = ChangeSet::new();
        for record in iter {
            set.insert(record);
        }
        set
    }
}

/// Folds ordered path events into per-path terminal records.
///
/// `forward` maps each tracked original to its current name (`None` once
/// deleted); `reverse` maps each live current name back to its original.
#[derive(Debug)]
pub struct RenameTracker {
    forward: HashMap<String, Option<String>>,
    reverse: HashMap<String, String>,
}

impl RenameTracker {
    pub fn new<'a>(tracked: impl IntoIterator<Item = &'a str>) -> Self {
        let mut forward = HashMap::new();
        let mut reverse = HashMap::new();
        for path in tracked {
            forward.insert(path.to_string(), Some(path.to_string()));
            reverse.insert(path.to_string(), path.to_string());
        }
        Self { forward, reverse }
    }

    /// Apply one event. Events on paths that are not currently tracked are
    /// ignored.
    pub fn apply(&mut self, event: &PathEvent) {
        match event {
            PathEvent::Renamed { from, to } => {
                if let Some(original) = self.reverse.remove(from) {
                    debug!(%original, %from, %to, "tracked path renamed");
                    self.forward.insert(original.clone(), Some(to.clone()));
                    self.reverse.insert(to.clone(), original);
                }
            }
            PathEvent::Deleted { path } => {
                if let Some(original) = self.reverse.remove(path) {
                    debug!(%original, %path, "tracked path deleted");
                    self.forward.insert(original, None);
                }
            }
        }
    }

    pub fn finish(self) -> ChangeSet {
        self.forward
            .into_iter()
            .filter_map(|(original, current)| match current {
                None => Some(ChangeRecord::Deleted { path: original }),
                Some(current) if current != original => Some(ChangeRecord::Renamed {
                    from: original,
                    to: current,
                }),
                Some(_) => None,
            })
            .collect()
    }
}

/// Fold a full event sequence for `tracked` paths.
pub fn fold_events<'a>(
    tracked: impl IntoIterator<Item = &'a str>,
    events: &[PathEvent],
) -> ChangeSet {
    let mut tracker = RenameTracker::new(tracked);
    for event in events {
        tracker.apply(event);
    }
    tracker.finish()
}

/// Compute the change set for `tracked` paths over `base..head` in `git`.
#[instrument(skip(git, tracked), fields(tracked = tracked.len()))]
pub fn resolve_changes(
    git: &GitClient,
    base: &str,
    head: &str,
    tracked: &[&str],
) -> Result<ChangeSet, GitError> {
    let events = git.rename_delete_events(base, head)?;
    let changes = fold_events(tracked.iter().copied(), &events);
    info!(events = events.len(), changes = changes.len(), "resolved change set");
    Ok(changes)
}

/// Pick the commit to diff a pull request against.
///
/// The most recent automated config commit on the PR wins, so files already
/// reconciled are not reprocessed. Without one, the tip of the PR's base
/// branch is used.
#[instrument(skip(api))]
pub async fn resolve_base_ref<A: GitHubApi + ?Sized>(
    api: &A,
    repo: &str,
    base_ref: Option<&str>,
    pr_number: Option<u64>,
) -> Result<String, CoreError> {
    let base_ref = base_ref
        .filter(|b| !b.is_empty())
        .ok_or(ContextError::NotPullRequest)?;
    let number = pr_number.ok_or(ContextError::MissingPullRequestNumber)?;

    let commits = api.list_pull_commits(repo, number).await?;
    let automated = commits.iter().rev().find(|c| {
        c.commit.message.contains(SKIP_CI_MARKER)
            && c.author.as_ref().map(|a| a.login.as_str()) == Some(BOT_LOGIN)
    });
    if let Some(commit) = automated {
        info!(sha = %commit.sha, "using last automated config commit as base");
        return Ok(commit.sha.clone());
    }

    let branch = api.get_branch(repo, base_ref).await?;
    info!(branch = base_ref, sha = %branch.commit.sha, "using base branch tip as base");
    Ok(branch.commit.sha)
}
