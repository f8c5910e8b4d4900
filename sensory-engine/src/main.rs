//! sensory-engine - assignment and delivery service for sensory panels
//!
//! Serves randomization, next-sample, submission and report endpoints over
//! the panel database shared with the CRUD front end.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sensory_common::config::{self, load_engine_settings, ROOT_FOLDER_ENV};
use sensory_common::db::init_database;
use sensory_engine::store::SqliteStore;
use sensory_engine::{build_router, AppState, Engine};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for sensory-engine
#[derive(Parser, Debug)]
#[command(name = "sensory-engine")]
#[command(about = "Balanced assignment and delivery engine for sensory panels")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5790", env = "SENSORY_PORT")]
    port: u16,

    /// Address to bind
    #[arg(short, long, default_value = "127.0.0.1", env = "SENSORY_BIND")]
    bind: std::net::IpAddr,

    /// Root folder holding sensory.db (overrides env, config file and default)
    #[arg(short, long)]
    root_folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sensory_engine=debug,sensory_common=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Build identification first, before any database delay
    info!(
        "Starting sensory-engine v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV);
    let db_path = config::database_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let settings = load_engine_settings(&pool)
        .await
        .context("Failed to load engine settings")?;
    info!(
        evaluator_slots = settings.evaluator_slots,
        persistence_timeout_ms = settings.persistence_timeout.as_millis() as u64,
        jar_policy = ?settings.jar_range_policy,
        "Engine settings loaded"
    );

    let store = Arc::new(SqliteStore::new(pool));
    let engine = Arc::new(Engine::new(store, settings));
    let app = build_router(AppState::new(engine));

    let addr = SocketAddr::new(args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("sensory-engine listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
