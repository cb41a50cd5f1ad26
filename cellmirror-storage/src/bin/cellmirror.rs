//! Cellmirror entry point.
//!
//! Loads configuration from a TOML file given as the first argument, or from
//! `CELLMIRROR_*` environment variables, starts the mirror and keeps it
//! running until Ctrl-C. Ctrl-C during bootstrap skips the tables not yet
//! loaded.

use std::sync::Arc;

use cellmirror_core::{ConfigError, MirrorConfig, MirrorResult};
use cellmirror_storage::{MirrorMode, MirrorRuntime, TracingErrorSink};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> MirrorResult<()> {
    init_tracing()?;

    let config = match std::env::args().nth(1) {
        Some(path) => MirrorConfig::from_file(&path)?.overlay(|key| std::env::var(key).ok())?,
        None => MirrorConfig::from_env()?,
    };

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                shutdown_tx.send_replace(true);
            }
            Err(e) => tracing::error!(error = %e, "Could not listen for shutdown signal"),
        }
    });

    let runtime =
        MirrorRuntime::start_cancellable(config, Arc::new(TracingErrorSink), shutdown_rx.clone())
            .await?;

    if let Some(report) = runtime.bootstrap_report() {
        for (table, reason) in &report.failed {
            tracing::warn!(table = %table, reason = %reason, "Table not populated");
        }
        for table in &report.cancelled {
            tracing::warn!(table = %table, "Table load cancelled by shutdown");
        }
    }
    for (table, rows) in runtime.row_counts().await {
        tracing::info!(table = %table, rows, "Mirrored table ready");
    }
    if runtime.mode() == MirrorMode::Offline {
        tracing::warn!("Serving the last mirror contents read-only");
    }

    // An error means the listener died, which also ends the run.
    let _ = shutdown_rx.wait_for(|stop| *stop).await;

    runtime.shutdown().await;
    Ok(())
}

fn init_tracing() -> MirrorResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cellmirror_storage=debug,info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| ConfigError::Parse {
            reason: format!("Failed to init subscriber: {}", e),
        })?;
    Ok(())
}
