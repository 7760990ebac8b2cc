//! terraform-provider-zia
//!
//! Command line front end for the ZIA provider core.
//!
//! # Usage
//!
//! ```bash
//! terraform-provider-zia schema                      # Print provider, resource and data source schemas
//! terraform-provider-zia validate main.json          # Check a manifest without contacting ZIA
//! terraform-provider-zia apply main.json             # Create, update and delete to match the manifest
//! terraform-provider-zia refresh                     # Re-read tracked resources, dropping deleted ones
//! terraform-provider-zia import zia_rule_labels finance Finance
//! terraform-provider-zia activate                    # Activate pending ZIA changes
//! terraform-provider-zia destroy                     # Delete every tracked resource
//! ```
//!
//! Credentials come from `--config`, the provider block of the manifest, or
//! `ZIA_*` environment variables. Logging is controlled by `ZIA_LOG`.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;
use zia_provider::config::ProviderConfig;
use zia_provider::core::state::StateStore;
use zia_provider::driver::{self, Action, Manifest, Report};
use zia_provider::{Provider, utils};

shadow_rs::shadow!(build);

#[derive(Parser)]
#[command(name = "terraform-provider-zia")]
#[command(about = "Zscaler Internet Access provider", long_about = None)]
struct Cli {
    /// Provider settings file (defaults to <config dir>/provider.json)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// State file (defaults to <data dir>/state.json)
    #[arg(long, global = true, value_name = "FILE")]
    state: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the provider schema as JSON
    Schema,
    /// Validate a manifest offline
    Validate {
        /// Manifest file
        file: PathBuf,
    },
    /// Apply a manifest
    Apply {
        /// Manifest file
        file: PathBuf,
    },
    /// Re-read every tracked resource
    Refresh,
    /// Delete every tracked resource
    Destroy,
    /// Track an existing ZIA object
    Import {
        /// Resource type, e.g. zia_firewall_filtering_rule
        type_name: String,
        /// Local resource name
        name: String,
        /// Numeric id or exact name of the object
        id_or_name: String,
    },
    /// Activate pending configuration changes
    Activate,
    /// Show build information
    Version,
}

fn main() -> ExitCode {
    let _ = utils::ensure_dirs();
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Version) {
        print_version();
        return ExitCode::SUCCESS;
    }

    init_logging();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(handle_cli(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = || EnvFilter::try_from_env("ZIA_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(mut log_path) = utils::get_state_dir() {
        log_path.push("terraform-provider-zia.log");
        if let Ok(file) = std::fs::File::create(log_path) {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_ansi(false)
                .with_writer(file)
                .init();
            return;
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .init();
}

fn print_version() {
    let dirty = if build::GIT_CLEAN { "" } else { "-dirty" };
    println!("terraform-provider-zia {}", build::PKG_VERSION);
    println!("commit: {}{dirty}", build::SHORT_COMMIT);
    println!("built:  {}", build::BUILD_TIME);
}

async fn handle_cli(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&Provider::new().schema())?);
        }
        Commands::Validate { file } => {
            let manifest = Manifest::from_file(&file).await?;
            let diags = manifest.validate(&Provider::new());
            if diags.has_errors() {
                return Err(format!("Validation failed:\n{diags}").into());
            }
            if !diags.is_empty() {
                eprintln!("{diags}");
            }
            println!("✓ {} resources valid.", manifest.resources.len());
        }
        Commands::Apply { file } => {
            let manifest = Manifest::from_file(&file).await?;
            let provider = configured_provider(config, &manifest.provider).await?;
            let store = state_store(cli.state)?;
            let mut state = store.load().await?;
            let report = driver::apply(&provider, &manifest, &mut state).await;
            store.save(&state).await?;
            provider.shutdown().await;
            print_report(&report)?;
        }
        Commands::Refresh => {
            let provider = configured_provider(config, &Map::new()).await?;
            let store = state_store(cli.state)?;
            let mut state = store.load().await?;
            let report = driver::refresh(&provider, &mut state).await;
            store.save(&state).await?;
            provider.shutdown().await;
            print_report(&report)?;
        }
        Commands::Destroy => {
            let provider = configured_provider(config, &Map::new()).await?;
            let store = state_store(cli.state)?;
            let mut state = store.load().await?;
            let report = driver::destroy(&provider, &mut state).await;
            store.save(&state).await?;
            provider.shutdown().await;
            print_report(&report)?;
        }
        Commands::Import {
            type_name,
            name,
            id_or_name,
        } => {
            let provider = configured_provider(config, &Map::new()).await?;
            let store = state_store(cli.state)?;
            let mut state = store.load().await?;
            let report = driver::import(&provider, &mut state, &type_name, &name, &id_or_name).await;
            if !report.has_errors() {
                store.save(&state).await?;
            }
            provider.shutdown().await;
            print_report(&report)?;
        }
        Commands::Activate => {
            let provider = configured_provider(config, &Map::new()).await?;
            let result = provider.activate().await;
            provider.shutdown().await;
            let status = result.map_err(|diags| diags.to_string())?;
            println!("✓ Activation status: {status}");
        }
        Commands::Version => print_version(),
    }
    Ok(())
}

async fn configured_provider(
    config_path: Option<&Path>,
    block: &Map<String, Value>,
) -> Result<Arc<Provider>, Box<dyn Error>> {
    let config = ProviderConfig::load(config_path).await?;
    let mut provider = Provider::new();
    let diags = provider.configure(config, block);
    if diags.has_errors() {
        return Err(format!("Provider configuration failed:\n{diags}").into());
    }
    if !diags.is_empty() {
        eprintln!("{diags}");
    }
    Ok(Arc::new(provider))
}

fn state_store(path: Option<PathBuf>) -> Result<StateStore, Box<dyn Error>> {
    path.or_else(StateStore::default_path)
        .map(StateStore::new)
        .ok_or_else(|| "No data directory available; pass --state".into())
}

fn print_report(report: &Report) -> Result<(), Box<dyn Error>> {
    let mut changed = 0;
    for change in &report.changes {
        if change.action == Action::Unchanged {
            continue;
        }
        changed += 1;
        println!("{:>10}  {}", change.action, change.address);
        if let Some(diff) = &change.diff {
            for line in diff.lines() {
                println!("            {line}");
            }
        }
    }
    println!(
        "{changed} changed, {} unchanged.",
        report.changes.len() - changed
    );

    if report.has_errors() {
        return Err(report.diagnostics.to_string().into());
    }
    if !report.diagnostics.is_empty() {
        eprintln!("{}", report.diagnostics);
    }
    Ok(())
}
