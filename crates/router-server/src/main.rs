//! Binary TCP server for the channel router.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use router_server::config::{Cli, Config};
use router_server::server;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.dev { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(cli.log_level.as_deref().unwrap_or(default_filter)))?;

    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Arc::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    // A bad configuration exits non-zero before anything is bound.
    let config = Config::from_cli(cli)?;

    server::run(config).await
}
