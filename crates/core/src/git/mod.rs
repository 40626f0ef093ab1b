//! Git and GitHub access for mirrorsync.

pub mod client;
pub mod github;
pub mod remote_url;

pub use client::{GitClient, StatusEntry, StatusKind};
pub use github::{GitHubApi, GitHubClient};
