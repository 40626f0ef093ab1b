//! Error types for the mirrorsync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type. The CLI prints whichever variant bubbles up as the run's only
//! failure message.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    GitHub(#[from] GitHubError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation, including the workflow
/// document that holds the mapping block.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML or YAML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// The workflow document has no step carrying a mapping input.
    #[error("no mapping block ({keys}) found in any job step of {path}")]
    MissingMappingBlock { path: String, keys: String },

    /// Generic I/O error reading or writing a config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Mapping errors
// ---------------------------------------------------------------------------

/// Errors from decoding a mapping payload.
#[derive(Debug, Error)]
pub enum MappingError {
    /// Neither YAML nor JSON could decode the payload. Carries the YAML error.
    #[error("failed to parse mapping as either YAML or JSON; check the format. Error: {0}")]
    Parse(String),

    /// The payload decoded to something other than a sequence.
    #[error("mapping must be a non-empty array")]
    NotASequence,

    /// The payload decoded to an empty sequence.
    #[error("mapping must be a non-empty array")]
    Empty,

    /// An element is missing a required field or has the wrong shape.
    #[error("mapping at index {index} is invalid: {detail}")]
    InvalidEntry { index: usize, detail: String },

    /// Re-serializing a mapping list failed.
    #[error("failed to serialize mapping: {0}")]
    Serialize(String),
}

// ---------------------------------------------------------------------------
// Context errors
// ---------------------------------------------------------------------------

/// Required workflow context is absent.
#[derive(Debug, Error)]
pub enum ContextError {
    /// `GITHUB_BASE_REF` is unset: not a pull-request run.
    #[error("GITHUB_BASE_REF not found. Are you running in a pull request context?")]
    NotPullRequest,

    /// The event payload carries no pull request number.
    #[error("pull request number not found in event payload")]
    MissingPullRequestNumber,

    /// No head branch could be determined for the pull request.
    #[error("could not determine the pull request head branch")]
    MissingHeadRef,

    /// A required environment variable is not set.
    #[error("required environment variable '{0}' is not set")]
    MissingVar(String),

    /// The event payload file could not be read or decoded.
    #[error("failed to read event payload at '{path}': {detail}")]
    EventPayload { path: String, detail: String },
}

// ---------------------------------------------------------------------------
// Access errors
// ---------------------------------------------------------------------------

/// Authentication and authorization failures against GitHub or the remote.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The token is required for the requested operation.
    #[error("GitHub token is required to {0}. Provide a token with appropriate permissions.")]
    TokenRequired(String),

    /// The repository does not exist or is invisible to the token.
    #[error(
        "repository {0} not found or you don't have permission to access it. \
         Check the repository name and ensure your token has the required permissions."
    )]
    RepositoryNotFound(String),

    /// The token was rejected.
    #[error("authentication failed ({0}). Check that your token is valid and has not expired.")]
    BadCredentials(String),

    /// Cloning the target failed.
    #[error(
        "failed to clone {repo}: {detail}. Ensure your token has 'repo' scope \
         and read access to {repo}."
    )]
    CloneFailed { repo: String, detail: String },

    /// Pushing the working branch failed.
    #[error(
        "failed to push branch '{branch}': {detail}. Ensure your token has 'repo' scope \
         (contents: write) on the target repository."
    )]
    PushDenied { branch: String, detail: String },
}

// ---------------------------------------------------------------------------
// Materialization errors
// ---------------------------------------------------------------------------

/// Errors from copying mapped sources into the destination tree.
#[derive(Debug, Error)]
pub enum MaterializeError {
    /// A declared source path does not exist in the source tree.
    #[error("source path {0} not found")]
    MissingSource(String),

    /// A destination resolves outside the destination root.
    #[error("destination '{0}' escapes the target repository root")]
    OutsideRoot(String),

    /// A source resolves outside the source root.
    #[error("source '{0}' escapes the source repository root")]
    SourceOutsideRoot(String),

    /// Filesystem error while copying.
    #[error("failed to copy '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Publish errors
// ---------------------------------------------------------------------------

/// Errors from the branch publisher state machine.
#[derive(Debug, Error)]
pub enum PublishError {
    /// A state-machine transition was invalid.
    #[error("invalid publish state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from local Git (git2) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// A ref (branch, tag, SHA) could not be resolved.
    #[error("git ref not found: {0}")]
    RefNotFound(String),

    /// Push was rejected by the remote.
    #[error("git push rejected for branch '{branch}': {detail}")]
    PushRejected { branch: String, detail: String },

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// GitHub API errors
// ---------------------------------------------------------------------------

/// Errors from GitHub REST API interactions.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("GitHub HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("GitHub API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// The requested resource does not exist.
    #[error("GitHub resource not found: {0}")]
    NotFound(String),

    /// Authentication token is missing or invalid.
    #[error("GitHub authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limit exceeded.
    #[error("GitHub rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: String },

    /// JSON deserialization failure or unexpected payload shape.
    #[error("GitHub response parse error: {0}")]
    ParseError(String),
}

impl GitHubError {
    /// Map a repository lookup failure onto the access taxonomy.
    pub fn into_access_error(self, repo: &str) -> CoreError {
        match self {
            Self::NotFound(_) => AccessError::RepositoryNotFound(repo.to_string()).into(),
            Self::AuthenticationFailed(detail) => AccessError::BadCredentials(detail).into(),
            other => other.into(),
        }
    }
}
