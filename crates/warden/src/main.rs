//! Warden - self-healing monitor for a local development server
//!
//! Watches one service, restarts or repairs it when it fails, and escalates
//! to a human when automated fixes do not hold.

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use warden::{api, config::DaemonConfig};
use warden_lib::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting warden");

    let config = DaemonConfig::load()?;
    info!(
        target_url = %config.target_url,
        working_dir = %config.working_dir.display(),
        "Warden configured"
    );

    let orchestrator = Orchestrator::from_config(config.to_warden_config())
        .context("Failed to assemble pipeline")?;
    orchestrator.start().await;

    let app_state = Arc::new(api::AppState::new(orchestrator.clone()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            info!("SIGINT received");
            signal.context("Failed to listen for shutdown signal")
        }
        served = api_handle => match served {
            Ok(Ok(())) => Err(anyhow!("API server exited unexpectedly")),
            Ok(Err(e)) => Err(e.context("API server failed")),
            Err(e) => Err(anyhow!("API server task panicked: {}", e)),
        },
    };

    if let Err(e) = &outcome {
        error!(error = %format!("{:#}", e), "Fatal error, shutting down");
        orchestrator.log_fatal(format!("{:#}", e)).await;
    }

    orchestrator.stop().await;
    info!("Shutting down");

    outcome
}
