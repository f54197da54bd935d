//! State Sync Client - client-side prediction and reconciliation
//!
//! This is the main entry point for the client. It runs:
//! - The fixed-step simulation loop with local input prediction
//! - Snapshot reconciliation against the authoritative server
//! - A periodic latency probe
//! - An in-process loopback server standing in for the real one

mod app;
mod config;
mod input;
mod net;
mod sync;
mod util;

use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::ClientApp;
use crate::config::Config;
use crate::sync::latency::LatencySample;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    info!("Starting State Sync Client");
    info!(
        tick_rate = config.tick_rate,
        prediction = config.prediction_enabled,
        simulated_latency_ms = config.simulated_latency.as_millis() as u64,
        "Client configuration"
    );

    let app = ClientApp::start(&config);
    let latency_reporter = tokio::spawn(report_latency(app.latency()));

    match config.run_for {
        Some(duration) => {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    info!("Run time elapsed, shutting down");
                }
                _ = shutdown_signal() => {}
            }
        }
        None => shutdown_signal().await,
    }

    let report = app.shutdown().await;
    latency_reporter.abort();

    info!(
        ticks = report.ticks,
        snapshots = report.snapshots_applied,
        inputs_logged = report.inputs_logged,
        inputs_sent = report.inputs_sent,
        probes = report.probes_sent,
        dropped = report.dropped_messages,
        "Session summary"
    );
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Log each new latency sample, the stand-in for an on-screen display
async fn report_latency(mut latency: watch::Receiver<Option<LatencySample>>) {
    while latency.changed().await.is_ok() {
        let sample = *latency.borrow_and_update();
        if let Some(sample) = sample {
            info!(round_trip_ms = sample.round_trip_ms(), "Latency");
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
