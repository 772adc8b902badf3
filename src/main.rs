//! Sharepack CLI entrypoint.
//!
//! This is the main entrypoint for the sharepack command-line tool.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use sharepack::cli::{Cli, Commands, OutputFormatter};
use sharepack::config::{PackHasher, PackParser, PackValidator, SharePackConfig, Strategy};
use sharepack::error::{ConfigError, Result, SharePackError};
use sharepack::persist::Repositories;
use sharepack::remote::{HttpRemoteClient, RemoteContext, RemoteScope};
use sharepack::Provisioner;

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    // Load .env if present; environment always wins.
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let state_dir = resolve_state_dir(cli.state_dir.as_deref());

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(cli.config.as_deref(), warnings),
        Commands::Apply { yes } => {
            cmd_apply(cli.config.as_deref(), &state_dir, yes, &formatter).await
        }
        Commands::Status { all } => cmd_status(&state_dir, all, &formatter),
        Commands::History { name } => cmd_history(&state_dir, &name, &formatter),
    }
}

/// Validate the share-pack document.
fn cmd_validate(config_path: Option<&Path>, show_warnings: bool) -> Result<()> {
    let config = load_pack(config_path)?;

    let result = PackValidator::new().validate(&config)?;

    eprintln!("Share pack is valid!");
    if show_warnings && !result.warnings.is_empty() {
        eprintln!("\nWarnings:");
        for warning in &result.warnings {
            eprintln!("  - {warning}");
        }
    }

    let hasher = PackHasher::new();
    let hash = hasher.hash_pack(&config);
    eprintln!("\nShare pack summary:");
    eprintln!("  Pack: {}", config.metadata.name);
    eprintln!("  Workspace: {}", config.metadata.workspace);
    eprintln!("  Strategy: {}", config.metadata.strategy);
    eprintln!("  Recipients: {}", config.recipients.len());
    eprintln!("  Shares: {}", config.shares.len());
    eprintln!("  Pipelines: {}", config.pipeline_count());
    eprintln!("  Fingerprint: {}", hasher.short_hash(&hash));

    Ok(())
}

/// Execute the pack against the platform.
async fn cmd_apply(
    config_path: Option<&Path>,
    state_dir: &Path,
    yes: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_pack(config_path)?;

    if config.metadata.strategy == Strategy::Delete && !yes && !confirm_teardown(&config)? {
        eprintln!("Aborted.");
        return Ok(());
    }

    let remote = create_remote_context(&config)?;
    let repos = Repositories::local(state_dir);
    debug!("Using state directory: {}", state_dir.display());

    let provisioner = Provisioner::new(remote, repos);
    let outcome = provisioner.provision(&config).await?;

    eprintln!("{}", formatter.format_outcome(&outcome));

    match outcome.error {
        Some(error) => Err(SharePackError::internal(error)),
        None => Ok(()),
    }
}

/// Show the resources on record.
fn cmd_status(state_dir: &Path, all: bool, formatter: &OutputFormatter) -> Result<()> {
    let rows: Vec<_> = load_versions(state_dir)?
        .into_iter()
        .filter(|row| all || row.meta.is_live())
        .collect();
    eprintln!("{}", formatter.format_versions(&rows));
    Ok(())
}

/// Show the version history of one resource.
fn cmd_history(state_dir: &Path, name: &str, formatter: &OutputFormatter) -> Result<()> {
    let mut rows: Vec<_> = load_versions(state_dir)?
        .into_iter()
        .filter(|row| row.name == name)
        .collect();
    rows.sort_by(|a, b| {
        (a.meta.entity_id, a.meta.version).cmp(&(b.meta.entity_id, b.meta.version))
    });

    if rows.is_empty() {
        eprintln!("No versions on record for '{name}'.");
    } else {
        eprintln!("{}", formatter.format_versions(&rows));
    }
    Ok(())
}

/// Loads every stored version across the three stores.
fn load_versions(state_dir: &Path) -> Result<Vec<sharepack::cli::VersionRow>> {
    use sharepack::cli::VersionRow;

    let repos = Repositories::local(state_dir);
    let mut rows = Vec::new();

    for record in repos.recipients.load()? {
        rows.push(VersionRow {
            kind: String::from("recipient"),
            name: record.name,
            meta: record.meta,
        });
    }
    for record in repos.shares.load()? {
        rows.push(VersionRow {
            kind: String::from("share"),
            name: record.name,
            meta: record.meta,
        });
    }
    for record in repos.pipelines.load()? {
        rows.push(VersionRow {
            kind: String::from("pipeline"),
            name: record.name,
            meta: record.meta,
        });
    }
    Ok(rows)
}

/// Loads and parses the share-pack document.
fn load_pack(config_path: Option<&Path>) -> Result<SharePackConfig> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("sharepack.yaml"));
    let config = PackParser::new().load_with_env(&path)?;
    info!(
        "Loaded pack '{}' ({} strategy)",
        config.metadata.name, config.metadata.strategy
    );
    Ok(config)
}

/// Builds the remote context from the environment and pack metadata.
fn create_remote_context(config: &SharePackConfig) -> Result<RemoteContext> {
    let base_url = std::env::var("SHAREPACK_API_URL").map_err(|_| {
        ConfigError::validation("SHAREPACK_API_URL is not set", "SHAREPACK_API_URL")
    })?;
    let token = std::env::var("SHAREPACK_API_TOKEN").map_err(|_| {
        ConfigError::validation("SHAREPACK_API_TOKEN is not set", "SHAREPACK_API_TOKEN")
    })?;

    let client = Arc::new(HttpRemoteClient::new(&base_url, &token)?);
    let scope = RemoteScope {
        workspace: config.metadata.workspace.clone(),
        catalog: config.metadata.catalog.clone(),
        schema: config.metadata.schema.clone(),
    };

    Ok(RemoteContext::new(
        client.clone(),
        client.clone(),
        client.clone(),
        client,
        scope,
    ))
}

/// Asks the operator to confirm a DELETE run.
fn confirm_teardown(config: &SharePackConfig) -> Result<bool> {
    eprintln!(
        "This will tear down {} share(s), {} pipeline(s), and {} recipient(s) of pack '{}'.",
        config.shares.len(),
        config.pipeline_count(),
        config.recipients.len(),
        config.metadata.name
    );
    eprintln!("Type 'yes' to continue:");

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim() == "yes")
}

/// Resolves the directory holding the version stores.
fn resolve_state_dir(override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir {
        return dir.to_path_buf();
    }
    dirs::data_dir()
        .map(|d| d.join("sharepack"))
        .unwrap_or_else(|| PathBuf::from(".sharepack"))
}
