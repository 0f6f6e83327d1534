//! Logging setup and operation summaries
//!
//! Compact console output plus an optional JSON file rotated daily.

use std::fs;

use colored::Colorize;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::utils::config::LoggingConfig;

/// Initialize the logging system. Keep the returned guard alive for the
/// life of the process so the file writer flushes.
pub fn init_logger(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .compact();

    if !config.json_file {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .try_init()?;
        return Ok(None);
    }

    fs::create_dir_all(&config.directory)?;
    let file_appender = tracing_appender::rolling::daily(&config.directory, &config.file_prefix);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer()
        .with_writer(writer)
        .json()
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    info!(directory = %config.directory.display(), "Logger initialized");
    Ok(Some(guard))
}

/// Log a landed transaction with its explorer link
pub fn log_transaction_landed(operation: &str, signature: &str, cluster: &str, attempts: u32) {
    info!(
        operation = operation,
        signature = signature,
        attempts = attempts,
        "Transaction landed"
    );
    println!(
        "{} {}",
        format!("[{}]", operation.to_uppercase()).green().bold(),
        format!("https://solscan.io/tx/{}?cluster={}", signature, cluster).cyan()
    );
}

/// Log an operation that gave up
pub fn log_operation_failed(operation: &str, error: &str) {
    tracing::error!(operation = operation, error = error, "Operation failed");
    println!(
        "{} {}",
        format!("[{}]", operation.to_uppercase()).red().bold(),
        error.red()
    );
}
