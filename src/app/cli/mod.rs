//! CLI Adapter.

mod apps;
mod bulk;
mod deploy;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::app::config::load_config;
use crate::domain::AppError;

const DEFAULT_LOG_FILTER: &str = "capdeploy=info";

#[derive(Parser)]
#[command(name = "capdeploy")]
#[command(version)]
#[command(
    about = "Deploy one-click app bundles and manage apps on a CapRover controller",
    long_about = None
)]
struct Cli {
    /// Path to capdeploy.toml (defaults to ./capdeploy.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a one-click app bundle
    #[clap(visible_alias = "d")]
    Deploy(deploy::DeployArgs),
    /// Create an app, optionally with a custom domain
    Create(apps::CreateArgs),
    /// Change an app's configuration
    #[clap(visible_alias = "u")]
    Update(apps::UpdateArgs),
    /// Scale every app matching a pattern
    Scale(bulk::ScaleArgs),
    /// Stop every app matching a pattern
    Stop(bulk::PatternArgs),
    /// Delete every app matching a pattern
    Delete(bulk::DeleteArgs),
    /// Enable HTTPS for a custom domain
    Ssl {
        /// App name
        name: String,
        /// Custom domain
        domain: String,
    },
    /// List apps on the controller
    #[clap(visible_alias = "ls")]
    List,
}

/// Entry point for the CLI.
pub fn run() {
    let cli = Cli::parse();
    init_tracing();

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Deploy(args) => deploy::run_deploy(config, args),
        Commands::Create(args) => apps::run_create(&config, args).map(|_| 0),
        Commands::Update(args) => apps::run_update(&config, args).map(|_| 0),
        Commands::Scale(args) => bulk::run_scale(&config, args),
        Commands::Stop(args) => bulk::run_stop(&config, args),
        Commands::Delete(args) => bulk::run_delete(&config, args),
        Commands::Ssl { name, domain } => apps::run_ssl(&config, &name, &domain).map(|_| 0),
        Commands::List => apps::run_list(&config).map(|_| 0),
    });

    match result {
        Ok(exit_code) => {
            if exit_code != 0 {
                std::process::exit(exit_code);
            }
        }
        Err(AppError::Cancelled) => {
            println!("Aborted.");
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    // A subscriber may already be installed when embedded.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
