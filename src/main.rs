mod app;
mod cli;
mod commands;
mod config;
mod models;
mod session;
mod utils;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Logging goes to a file; stdout belongs to the UI.
fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = dirs::data_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("corral")
        .join("logs");
    std::fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let appender = tracing_appender::rolling::daily(log_dir, "corral.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_logging()?;

    let cli = cli::Cli::parse();
    let path = match &cli.path {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("Failed to resolve current directory")?,
    };

    match cli.command {
        Some(cli::Commands::Sessions) => commands::sessions::execute().await,
        Some(cli::Commands::Reset { force }) => commands::reset::execute(force).await,
        Some(cli::Commands::Run { program }) => commands::run::execute(path, program).await,
        None => commands::run::execute(path, None).await,
    }
}
