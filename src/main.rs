//! Blog Cache - two-tier response cache for a content-serving blog
//!
//! Runs the admin and health surface over the configured cache backend.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blog_cache::cache::SystemClock;
use blog_cache::{build_cache, create_router, spawn_sweep_task, AppState, Config};

/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the cache backend (tiered when `REDIS_HOST` is set)
/// 4. Start background sweep task
/// 5. Create Axum router and serve until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blog_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting blog cache service");

    let config = Config::from_env();
    info!(
        port = config.server_port,
        local_max_keys = config.local_max_keys,
        sweep_interval = config.sweep_interval,
        version = %config.cache_version,
        remote = config.remote.is_some(),
        admin = config.admin_token.is_some(),
        "Configuration loaded"
    );
    if config.admin_token.is_none() {
        warn!("ADMIN_TOKEN not set, admin routes will reject every request");
    }

    // A remote tier that is down at startup is not fatal
    let cache = build_cache(&config, Arc::new(SystemClock))
        .await
        .context("failed to build cache backend")?;

    let sweep_handle = spawn_sweep_task(cache.clone(), config.sweep_interval);

    let app = create_router(AppState::new(cache, &config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sweep_handle))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM, then stops the sweep task.
async fn shutdown_signal(sweep_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    sweep_handle.abort();
    warn!("Sweep task aborted");
}
