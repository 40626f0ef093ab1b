//! Run outcomes reported by the two pipelines.
//!
//! Short-circuits (nothing to copy, nothing changed, push not needed) are
//! outcomes rather than errors so the binary can exit successfully.

use serde::{Deserialize, Serialize};

use crate::pull_request::PullRequestOutcome;

/// How a `sync` run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// No mapped source existed, so nothing was written.
    NoSourceFiles,
    /// The copied files left the working tree unchanged.
    NoChanges,
    /// The token may not write to the target repository.
    WriteSkipped { reason: String },
    /// The committed tree matched the remote branch.
    PushSkipped { branch: String },
    /// The base branch itself was updated; no pull request is involved.
    DirectPush { branch: String },
    Published {
        branch: String,
        pull_request: PullRequestOutcome,
    },
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSourceFiles => write!(f, "no source files found; nothing to sync"),
            Self::NoChanges => write!(f, "no changes to commit"),
            Self::WriteSkipped { reason } => write!(f, "skipped publishing: {}", reason),
            Self::PushSkipped { branch } => {
                write!(f, "branch '{}' already up to date; push skipped", branch)
            }
            Self::DirectPush { branch } => write!(f, "pushed changes directly to '{}'", branch),
            Self::Published {
                branch,
                pull_request,
            } => write!(f, "pushed '{}'; {}", branch, pull_request),
        }
    }
}

/// How an `update-config` run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// No tracked path was renamed or deleted.
    NoTrackedChanges,
    /// The PR comes from a fork; the file was rewritten locally only.
    ForkSkipped { removed: usize, renamed: usize },
    /// The rewritten document was committed to the PR head branch.
    Committed {
        branch: String,
        removed: usize,
        renamed: usize,
    },
}

impl std::fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoTrackedChanges => write!(f, "no changes detected for tracked files"),
            Self::ForkSkipped { removed, renamed } => write!(
                f,
                "updated config locally ({} removed, {} renamed); fork pull request, not committed",
                removed, renamed
            ),
            Self::Committed {
                branch,
                removed,
                renamed,
            } => write!(
                f,
                "committed config update to '{}' ({} removed, {} renamed)",
                branch, removed, renamed
            ),
        }
    }
}
