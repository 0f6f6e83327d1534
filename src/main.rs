use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use raydium_cli::cli::Cli;
use raydium_cli::utils::config::Config;
use raydium_cli::utils::logger::init_logger;

/// Entry point for the Raydium trading CLI
///
/// Every subcommand lands its transactions through the retrying landing
/// engine; Ctrl-C cancels the operation in flight.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    config.validate()?;

    let _log_guard = init_logger(&config.logging)?;
    info!("Starting raydium-cli v{}", env!("CARGO_PKG_VERSION"));

    // Setup graceful shutdown handler
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown signal received, cancelling...");
            shutdown.cancel();
        }
    });

    cli.command.run(config, cancel).await
}
