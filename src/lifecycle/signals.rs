//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - SIGTERM/SIGINT trigger graceful shutdown
//! - SIGHUP reloads the config file into the router
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A failed SIGHUP reload is logged; the current generation keeps serving

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::load_config;
use crate::gateway::GatewayRouter;
use crate::lifecycle::Shutdown;

/// Reload `path` into `router`, logging the outcome.
pub fn reload_from_file(router: &GatewayRouter, path: &Path) {
    match load_config(path) {
        Ok(config) => {
            if let Ok(generation) = router.reload(config) {
                tracing::info!(path = %path.display(), generation, "Reloaded configuration from disk");
            }
        }
        Err(e) => tracing::error!(path = %path.display(), error = %e, "Failed to read configuration"),
    }
}

/// Handle signals until shutdown is triggered.
#[cfg(unix)]
pub async fn listen(router: Arc<GatewayRouter>, config_path: Option<PathBuf>, shutdown: Arc<Shutdown>) {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut term, mut int, mut hup) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
        signal(SignalKind::hangup()),
    ) {
        (Ok(term), Ok(int), Ok(hup)) => (term, int, hup),
        _ => {
            tracing::error!("Failed to install signal handlers");
            return;
        }
    };
    let mut stop = shutdown.subscribe();

    loop {
        tokio::select! {
            _ = term.recv() => {
                tracing::info!(signal = "SIGTERM", "Shutdown signal received");
                shutdown.trigger();
            }
            _ = int.recv() => {
                tracing::info!(signal = "SIGINT", "Shutdown signal received");
                shutdown.trigger();
            }
            _ = hup.recv() => {
                match &config_path {
                    Some(path) => reload_from_file(&router, path),
                    None => tracing::warn!("SIGHUP ignored: gateway was started without a config file"),
                }
            }
            _ = stop.recv() => break,
        }
    }
}

#[cfg(not(unix))]
pub async fn listen(_router: Arc<GatewayRouter>, _config_path: Option<PathBuf>, shutdown: Arc<Shutdown>) {
    let mut stop = shutdown.subscribe();
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                return;
            }
            tracing::info!("Shutdown signal received");
            shutdown.trigger();
        }
        _ = stop.recv() => {}
    }
}
