//! policy-gateway
//!
//! ```text
//!     Client Request
//!     ───────────────▶ http server ──▶ GatewayRouter ──▶ RouteMatcher
//!                      (request id,    (current            │
//!                       tracing,        generation)        ▼
//!                       body limit)                   CompiledPipeline
//!                                                     (policies, request phase)
//!                                                          │
//!                                                          ▼
//!     Client Response                                 ProxyDispatcher ──▶ Backend
//!     ◀─────────────── response phase ◀─────────────── (target selection,    group
//!                                                       timeout, retries)
//!
//!     Cross-cutting: config + watcher, health monitor, admin API,
//!                    metrics, signals (SIGHUP reload, SIGTERM/SIGINT stop)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use policy_gateway::admin::{setup_admin_router, AdminState};
use policy_gateway::config::watcher::ConfigWatcher;
use policy_gateway::config::{load_config, GatewayConfig};
use policy_gateway::gateway::Generation;
use policy_gateway::lifecycle::{shutdown::wait, signals};
use policy_gateway::observability::{init_logging, init_metrics};
use policy_gateway::{GatewayRouter, HttpServer, PolicyRegistry, Shutdown};

#[derive(Parser)]
#[command(name = "policy-gateway", version, about = "Config-driven HTTP API gateway")]
struct Args {
    /// Path to the YAML or TOML configuration file.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration, compile every route and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                init_logging(&Default::default());
                tracing::error!(path = %path.display(), error = %e, "Failed to load configuration");
                return Err(e.into());
            }
        },
        None => GatewayConfig::default(),
    };
    init_logging(&config.observability);

    let registry = PolicyRegistry::with_builtins();

    if args.check {
        return check(config, &registry);
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        backend_groups = config.backend_groups.len(),
        "policy-gateway starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let gateway = Arc::new(GatewayRouter::new(config.clone(), registry)?);
    let shutdown = Arc::new(Shutdown::new());

    tokio::spawn(signals::listen(
        gateway.clone(),
        args.config.clone(),
        shutdown.clone(),
    ));

    // The notify watcher stops when dropped; keep it for the process lifetime.
    let (_watcher, updates) = match &args.config {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(w) => (Some(w), Some(rx)),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, hot reload via SIGHUP/admin only");
                    (None, None)
                }
            }
        }
        None => (None, None),
    };

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
        let app = setup_admin_router(AdminState {
            router: gateway.clone(),
            api_key: config.admin.api_key.as_str().into(),
            config_path: args.config.clone(),
        });
        let stop = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(admin_listener, app).with_graceful_shutdown(wait(stop)).await {
                tracing::error!(error = %e, "Admin server failed");
            }
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    HttpServer::new(gateway, &config, shutdown)
        .run(listener, updates)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// `--check`: every route must load and compile.
fn check(config: GatewayConfig, registry: &PolicyRegistry) -> Result<(), Box<dyn std::error::Error>> {
    let generation = Generation::build(0, config, registry)?;
    let disabled: Vec<_> = generation
        .route_summaries()
        .into_iter()
        .filter(|r| !r.enabled)
        .collect();

    if disabled.is_empty() {
        println!("configuration OK: {} routes", generation.routes().len());
        return Ok(());
    }
    for route in &disabled {
        eprintln!(
            "route '{}' disabled: {}",
            route.id,
            route.disabled_reason.as_deref().unwrap_or("unknown")
        );
    }
    Err(format!("{} route(s) failed to compile", disabled.len()).into())
}
