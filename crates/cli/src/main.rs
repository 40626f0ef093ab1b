//! mirrorsync command-line tool.
//!
//! Runs as a GitHub Actions step. `sync` mirrors mapped files into a target
//! repository and opens a pull request; `update-config` rewrites the sync
//! mapping after tracked files are renamed or deleted in a pull request.
//! `init` and `validate` manage the optional TOML configuration file.
//!
//! Action inputs arrive as `INPUT_*` environment variables and map onto the
//! flags below; flags override values from the configuration file.

mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mirrorsync_core::errors::AccessError;
use mirrorsync_core::git::GitHubClient;
use mirrorsync_core::materialize::MissingSourcePolicy;
use mirrorsync_core::{
    ActionContext, ConfigUpdater, SyncConfig, SyncEngine, SyncOutcome, UpdateOutcome,
};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "mirrorsync",
    version,
    about = "Mirror files into another GitHub repository and keep sync mappings current"
)]
struct Cli {
    /// Path to an optional TOML configuration file.
    #[arg(short, long, global = true, env = "MIRRORSYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy mapped files into the target repository and publish them.
    Sync(SyncArgs),

    /// Rewrite the sync mapping after renames or deletions in a pull request.
    UpdateConfig(UpdateConfigArgs),

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./mirrorsync.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// Target repository in owner/name form.
    #[arg(long, env = "INPUT_REPOSITORY")]
    repository: Option<String>,

    /// Token with contents and pull-request write access to the target.
    #[arg(long, env = "INPUT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Working branch in the target repository.
    #[arg(long, env = "INPUT_BRANCH")]
    branch: Option<String>,

    /// Pull request base branch (defaults to the target's default branch).
    #[arg(long, env = "INPUT_BASE_BRANCH")]
    base_branch: Option<String>,

    /// Force-push the working branch and squash-merge its pull request.
    #[arg(
        long,
        env = "INPUT_AUTO_MERGE",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = parse_bool_input
    )]
    auto_merge: Option<bool>,

    /// File mapping (YAML or JSON list of source/destination entries).
    #[arg(long, env = "INPUT_FILES")]
    files: Option<String>,

    /// File mapping, OpenAPI action spelling.
    #[arg(long, env = "INPUT_OPENAPI")]
    openapi: Option<String>,

    /// File mapping, from/to spelling.
    #[arg(long, env = "INPUT_SOURCES")]
    sources: Option<String>,

    /// What to do when a mapped source is missing: fail or skip.
    #[arg(long, env = "INPUT_MISSING_SOURCE")]
    missing_source: Option<String>,

    /// Directory mapping sources are relative to (defaults to GITHUB_WORKSPACE).
    #[arg(long)]
    source_root: Option<PathBuf>,

    /// Clone from this URL or path instead of the derived GitHub URL.
    #[arg(long)]
    clone_url: Option<String>,

    /// GitHub API base URL.
    #[arg(long, env = "GITHUB_API_URL")]
    api_url: Option<String>,
}

#[derive(Args, Debug)]
struct UpdateConfigArgs {
    /// Token with contents write access to this repository.
    #[arg(long, env = "INPUT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Workflow file holding the mapping, relative to the workspace.
    #[arg(long, env = "INPUT_CONFIG_PATH")]
    config_path: Option<PathBuf>,
}

fn parse_bool_input(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "no" | "off" | "0" => Ok(false),
        "true" | "yes" | "on" | "1" => Ok(true),
        other => Err(format!("expected true or false, got '{}'", other)),
    }
}

/// Actions sets declared-but-unused inputs to the empty string.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl SyncArgs {
    fn apply(self, config: &mut SyncConfig) -> Result<()> {
        if let Some(repository) = non_empty(self.repository) {
            config.target.repository = repository;
        }
        if let Some(token) = non_empty(self.token) {
            config.target.token = Some(token);
        }
        if let Some(branch) = non_empty(self.branch) {
            config.target.branch = branch;
        }
        if let Some(base) = non_empty(self.base_branch) {
            config.target.base_branch = Some(base);
        }
        if let Some(auto_merge) = self.auto_merge {
            config.sync.auto_merge = auto_merge;
        }
        let mapping = non_empty(self.files)
            .or_else(|| non_empty(self.openapi))
            .or_else(|| non_empty(self.sources));
        if mapping.is_some() {
            config.sync.mappings = mapping;
        }
        if let Some(policy) = non_empty(self.missing_source) {
            config.sync.missing_source = policy
                .parse::<MissingSourcePolicy>()
                .map_err(anyhow::Error::msg)?;
        }
        if self.source_root.is_some() {
            config.sync.source_root = self.source_root;
        }
        if let Some(url) = non_empty(self.clone_url) {
            config.target.clone_url = Some(url);
        }
        if let Some(api_url) = non_empty(self.api_url) {
            config.target.api_url = api_url;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("::error::{}", escape_annotation(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Sync(args) => cmd_sync(cli.config.as_deref(), args).await,
        Commands::UpdateConfig(args) => cmd_update_config(cli.config.as_deref(), args).await,
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => {
            let path = cli
                .config
                .context("no configuration file given; pass --config or set MIRRORSYNC_CONFIG")?;
            cmd_validate(&path)
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    match path {
        Some(path) => {
            SyncConfig::load_from_file(path).context("failed to load configuration file")
        }
        None => Ok(SyncConfig::default()),
    }
}

/// `%`, CR and LF must be escaped inside workflow command messages.
fn escape_annotation(msg: &str) -> String {
    msg.replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn annotate_warning(msg: &str) {
    println!("::warning::{}", escape_annotation(msg));
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

async fn cmd_sync(config_path: Option<&Path>, args: SyncArgs) -> Result<()> {
    let mut config = load_config(config_path)?;
    args.apply(&mut config)?;
    config.resolve_env_vars();
    config.validate().context("invalid sync configuration")?;

    let ctx = ActionContext::from_env().context("failed to read workflow context")?;
    if config.target.server_url.is_none() {
        config.target.server_url = ctx.server_url.clone();
    }
    let source_root = config
        .sync
        .source_root
        .clone()
        .unwrap_or_else(|| ctx.workspace.clone());

    let client = match config.target.token.clone() {
        Some(token) => Some(
            GitHubClient::new(&config.target.api_url, token)
                .context("failed to build GitHub client")?,
        ),
        None => {
            annotate_warning("no token provided; the pull request step will be skipped");
            None
        }
    };

    info!(
        repo = %config.target.repository,
        branch = %config.target.branch,
        source_root = %source_root.display(),
        "starting sync"
    );
    let engine = SyncEngine::new(config, client.as_ref(), source_root)
        .with_source_repository(ctx.repository.clone());
    let outcome = engine.run().await?;

    match &outcome {
        SyncOutcome::WriteSkipped { .. } | SyncOutcome::NoSourceFiles => {
            annotate_warning(&outcome.to_string())
        }
        _ => println!("{}", style::success(&outcome.to_string())),
    }
    Ok(())
}

async fn cmd_update_config(config_path: Option<&Path>, args: UpdateConfigArgs) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(token) = non_empty(args.token) {
        config.target.token = Some(token);
    }
    if let Some(path) = args.config_path.filter(|p| !p.as_os_str().is_empty()) {
        config.update_config.path = path;
    }
    config.resolve_env_vars();

    let ctx = ActionContext::from_env().context("failed to read workflow context")?;
    let token = config
        .target
        .token
        .clone()
        .ok_or_else(|| AccessError::TokenRequired("update the sync configuration".into()))?;
    let client = GitHubClient::new(&ctx.api_url, token).context("failed to build GitHub client")?;

    info!(path = %config.update_config.path.display(), "checking sync mapping");
    let outcome = ConfigUpdater::new(&client, ctx, config.update_config)
        .run()
        .await?;
    match &outcome {
        UpdateOutcome::ForkSkipped { .. } => annotate_warning(&outcome.to_string()),
        _ => println!("{}", style::success(&outcome.to_string())),
    }
    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }
    std::fs::write(output, SyncConfig::default_template())
        .context("failed to write config file")?;
    println!(
        "{}",
        style::success(&format!("Default configuration written to {}", output.display()))
    );
    println!();
    println!("{}", style::header("Next steps:"));
    println!("  1. Set target.repository and the file mapping");
    println!("  2. Export the variable named by target.token_env (or GITHUB_TOKEN)");
    println!(
        "  3. Validate with: mirrorsync validate --config {}",
        output.display()
    );
    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!(
        "{}",
        style::header(&format!("Validating configuration: {}", config_path.display()))
    );
    println!();

    let mut config =
        SyncConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  {}", style::success("TOML structure is valid"));

    config.resolve_env_vars();
    if let Err(e) = config.validate() {
        println!("  {}", style::failure(&format!("Validation error: {}", e)));
        anyhow::bail!("configuration validation failed");
    }
    println!("  {}", style::success("All required fields are valid"));

    if let Some(payload) = config.sync.mappings.as_deref() {
        match mirrorsync_core::mapping::parse_mapping(payload) {
            Ok(list) => println!(
                "  {}",
                style::success(&format!("Mapping has {} entries", list.len()))
            ),
            Err(e) => {
                println!("  {}", style::failure(&format!("Mapping error: {}", e)));
                anyhow::bail!("configuration validation failed");
            }
        }
    }

    println!();
    println!("{}", style::header("Configuration summary:"));
    println!("  Target repo    : {}", config.target.repository);
    println!("  Working branch : {}", config.target.branch);
    println!(
        "  Base branch    : {}",
        config
            .target
            .base_branch
            .as_deref()
            .unwrap_or("(repository default)")
    );
    println!("  Clone URL      : {}", config.target.clone_url());
    println!("  Auto-merge     : {}", config.sync.auto_merge);
    println!("  Missing source : {:?}", config.sync.missing_source);
    if config.target.token.is_some() {
        println!("  Token          : set");
    } else {
        println!("  {}", style::warn("Token          : NOT SET"));
    }
    println!(
        "  {}",
        style::dim(&format!(
            "update-config reads {}",
            config.update_config.path.display()
        ))
    );
    println!();
    println!("Configuration is valid.");
    Ok(())
}
