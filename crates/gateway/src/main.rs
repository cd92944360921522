use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use spool_domain::config::{Config, ConfigSeverity};
use spool_gateway::api;
use spool_gateway::runtime::sweeper::spawn_sweeper;
use spool_gateway::state::build_state;

#[derive(Parser)]
#[command(name = "spool", about = "Multi-tenant LLM inference gateway")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "spool.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway server (default).
    Serve,
    /// Validate the configuration and exit.
    Check,
    /// Print the version.
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let config = load_config(&cli.config)?;
            run_server(config).await
        }
        Some(Command::Check) => {
            let config = load_config(&cli.config)?;
            let issues = config.validate();
            for issue in &issues {
                println!("{:?}: {issue}", issue.severity);
            }
            if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
                std::process::exit(1);
            }
            println!("config ok");
            Ok(())
        }
        Some(Command::Version) => {
            println!("spool {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,spool_gateway=debug")),
        )
        .json()
        .init();
}

/// Load config from the given path; a missing file yields the defaults
/// (dev mode: in-memory cache and store, no providers).
fn load_config(path: &PathBuf) -> anyhow::Result<Config> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found; using defaults");
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    tracing::info!("spool gateway starting");

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = build_state(config)
        .await
        .map_err(|e| anyhow::anyhow!("state bootstrap failed: {e}"))?;

    // Background expiry sweep for consumer actions.
    let _sweeper = spawn_sweeper(state.clone());

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app).await.context("server exited")?;
    Ok(())
}
