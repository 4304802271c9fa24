//! graceful-server
//!
//! An HTTP server whose lifetime is bound to the process: termination signals
//! cancel a Root Context shared with every connection, then the server drains
//! within a bounded grace period before exiting.
//!
//! # Architecture Overview
//!
//! ```text
//!   SIGINT / SIGTERM
//!          │
//!          ▼
//!   ┌──────────────┐   cancel    ┌──────────────┐
//!   │  lifecycle   │────────────▶│ Root Context │
//!   │ coordinator  │             └──────┬───────┘
//!   └──────┬───────┘                    │ derived at accept-time
//!          │ graceful stop              ▼
//!          │ (bounded)         ┌─────────────────┐     ┌──────────┐
//!          └──────────────────▶│ net + http      │────▶│ handlers │
//!                              │ connection loop │     └──────────┘
//!                              └─────────────────┘
//!
//!   config · observability (logging, /metrics, runtime sampler)
//! ```
//!
//! Exits 0 after any shutdown, including one that hit the grace period.
//! Exits nonzero only when configuration or binding fails.

use std::path::PathBuf;

use clap::Parser;

use graceful_server::config::load_config;
use graceful_server::lifecycle::{Coordinator, TerminationSignals};
use graceful_server::observability::logging;

#[derive(Parser)]
#[command(name = "graceful-server")]
#[command(about = "HTTP server with cancellation-aware graceful shutdown", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref(), cli.bind)?;

    logging::init(&config.observability);
    tracing::info!("graceful-server v{} starting", env!("CARGO_PKG_VERSION"));

    let signals = TerminationSignals::install()?;

    let coordinator = match Coordinator::start(config).await {
        Ok(coordinator) => coordinator,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return Err(e.into());
        }
    };

    let report = coordinator.run(signals).await;
    tracing::info!(
        signal = ?report.signal,
        graceful = report.is_graceful(),
        force_closed = report.force_closed,
        total_ms = report.total_time.as_millis() as u64,
        "Shutdown complete"
    );
    Ok(())
}
