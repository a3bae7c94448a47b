//! LMA Edge - Loan Management API server
//! Mission: Serve the authenticated loan API over HTTP

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use lma_edge_backend::{
    build_router,
    cache::MemoryCache,
    db::Database,
    AppState, Config,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, signal, time::interval};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Command line overrides. Everything else comes from the environment.
#[derive(Parser, Debug)]
#[command(name = "lma-edge", version, about = "Loan management API server")]
struct Cli {
    /// Listen port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database file (overrides DATABASE_PATH)
    #[arg(long)]
    database_path: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    load_env();
    init_tracing();

    let mut config = Config::from_env().context("Invalid configuration")?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(path) = cli.database_path {
        config.database_path = path;
    }

    if cli.check_config {
        info!(
            "Configuration OK: port={} database={} environment={} revocation_fail_policy={:?}",
            config.port,
            config.database_path,
            config.environment.as_str(),
            config.revocation_fail_policy
        );
        return Ok(());
    }

    info!("LMA Edge backend starting ({})", config.environment.as_str());

    let db = Database::open(&config.database_path, config.store_timeout)?;
    let memory_cache = MemoryCache::new();
    let bootstrap_admin = config.bootstrap_admin.clone();
    let port = config.port;

    let state = AppState::new(config, db, Arc::new(memory_cache.clone()));

    if let Some(admin) = bootstrap_admin {
        if let Err(e) = state.sessions.bootstrap_admin(&admin).await {
            error!("Failed to create bootstrap admin: {:#}", e);
        }
    }

    spawn_maintenance(memory_cache, state.clone());

    let app = build_router(state)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("API server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

/// Purge expired cache entries and finished rate-limit windows
fn spawn_maintenance(cache: MemoryCache, state: AppState) {
    tokio::spawn(async move {
        let mut ticker = interval(MAINTENANCE_INTERVAL);
        loop {
            ticker.tick().await;
            let purged = cache.purge_expired();
            let windows = state.rate_limiter.cleanup();
            if purged > 0 || windows > 0 {
                debug!(
                    "Maintenance: purged {} cache entries, {} rate-limit windows",
                    purged, windows
                );
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

/// Initialize tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lma_edge_backend=debug,lma_edge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the crate root when launched from elsewhere
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}
