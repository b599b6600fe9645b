mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nyx_client::{NyxClient, NyxServiceConfig};

#[derive(Parser)]
#[command(name = "nyx", about = "Inspect and drive triggers on the Nyx trigger service")]
pub struct Cli {
    /// TOML config file with `host`, `port` and `request_timeout_secs`
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Nyx service host (overrides config and NYX_SERVICE_HOST)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Nyx service port (overrides config and NYX_SERVICE_PORT)
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a trigger specification
    Validate {
        /// Inline JSON, or @path to a file
        spec: String,
    },
    /// Register a trigger specification and print its id
    Register {
        /// Inline JSON, or @path to a file
        spec: String,
    },
    /// Show ready/active flags of a registered trigger
    Status {
        /// Trigger id
        id: i64,
    },
    /// Show the full detail record of a registered trigger
    Detail {
        /// Trigger id
        id: i64,
    },
    /// Delete a registered trigger
    Unregister {
        /// Trigger id
        id: i64,
    },
    /// Poll a specification through the checker lifecycle until it is ready
    Watch {
        /// Inline JSON, or @path to a file
        spec: String,
        /// Checker label
        #[arg(long, default_value = "cli-watch")]
        id: String,
        /// Seconds between polls
        #[arg(long, default_value_t = 30)]
        interval: u64,
        /// Stop after this many polls
        #[arg(long)]
        max_polls: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    let client = Arc::new(NyxClient::new(config).context("Failed to build Nyx client")?);

    match cli.command {
        Commands::Validate { spec } => commands::trigger::validate(&client, &spec).await,
        Commands::Register { spec } => commands::trigger::register(&client, &spec).await,
        Commands::Status { id } => commands::trigger::status(&client, id).await,
        Commands::Detail { id } => commands::trigger::detail(&client, id).await,
        Commands::Unregister { id } => commands::trigger::unregister(&client, id).await,
        Commands::Watch {
            spec,
            id,
            interval,
            max_polls,
        } => commands::watch::handle(client, &spec, id, interval, max_polls).await,
    }
}

/// Defaults, then the config file, then environment, then flags.
fn resolve_config(cli: &Cli) -> Result<NyxServiceConfig> {
    let config = match &cli.config {
        Some(path) => NyxServiceConfig::load(path)?,
        None => NyxServiceConfig::default(),
    };
    let mut config = config.with_env_overrides()?;
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    Ok(config)
}
