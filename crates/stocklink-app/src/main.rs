//! Stock-Link - Main Application Entry Point
//!
//! Boots the retail terminal: configuration, logging, the offline
//! cache/update worker, the backend client, and the local sales store.
//! The UI layer drives everything through [`state::AppState`].

mod net;
mod state;

use std::path::PathBuf;

use tracing::{error, info};

use state::AppState;
use stocklink_core::{init_logging, AppConfig, LogConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Route `log` records (sales store, session vault) into tracing.
    tracing_log::LogTracer::init().ok();
    init_logging(LogConfig::default().with_filter(
        std::env::var("STOCKLINK_LOG").unwrap_or_else(|_| "info,stocklink=debug".to_string()),
    ));

    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load(&PathBuf::from(path))?,
        None => AppConfig::default(),
    };
    info!(
        version = %config.cache.version,
        backend = %config.backend_base_url,
        "Starting Stock-Link"
    );

    let app = AppState::new(config)?;

    // Populate and promote this deployment's cache before anything is
    // intercepted. An install failure is retried on the next launch.
    if let Err(e) = app.start_offline_worker().await {
        error!(error = %e, "Offline worker failed to start; continuing online-only");
    }

    let poller = app.spawn_update_poller();
    if poller.is_some() {
        info!(
            interval_secs = app.config().update_poll.interval_secs,
            "Version poll running"
        );
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    if let Some(handle) = poller {
        handle.abort();
    }

    Ok(())
}
