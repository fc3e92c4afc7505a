//! pagewright CLI entrypoint

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pagewright::cli::Cli;

/// Log filter override, consulted before `RUST_LOG`
const LOG_ENV: &str = "PAGEWRIGHT_LOG";

/// Filter from `PAGEWRIGHT_LOG`, then `RUST_LOG`, else `info`
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the ack and command output
    tracing_subscriber::registry()
        .with(log_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    Cli::parse().execute().await
}
