//! mirrorsync core library.
//!
//! This crate provides the components behind the `mirrorsync` GitHub Actions
//! workflow: mapping parsing, change-set resolution over git history, mapping
//! reconciliation, file materialization, branch publishing, pull-request
//! coordination, and the two pipelines that tie them together.

pub mod changes;
pub mod config;
pub mod config_doc;
pub mod config_updater;
pub mod context;
pub mod errors;
pub mod git;
pub mod mapping;
pub mod materialize;
pub mod models;
pub mod publish;
pub mod pull_request;
pub mod reconcile;
pub mod sync_engine;

// Re-exports for convenience.
pub use config::SyncConfig;
pub use config_updater::ConfigUpdater;
pub use context::ActionContext;
pub use errors::CoreError;
pub use models::{SyncOutcome, UpdateOutcome};
pub use sync_engine::SyncEngine;
