//! # Bistro API Server
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. tracing      RUST_LOG or "info,bistro=debug,sqlx=warn"              │
//! │  2. config       defaults → bistro.toml → BISTRO_* env                  │
//! │  3. database     SQLite file, migrations applied on connect             │
//! │  4. serve        axum on [server] bind_addr:port until Ctrl+C / TERM    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bistro_api::{router, ApiConfig, AppState};
use bistro_db::{Database, DbConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting Bistro API server...");

    let config_path = std::env::var_os("BISTRO_CONFIG").map(PathBuf::from);
    let config = ApiConfig::load(config_path).context("failed to load configuration")?;

    let db_path = config.database_path()?;
    info!(?db_path, "Opening database");
    let db = Database::new(
        DbConfig::new(db_path).max_connections(config.database.max_connections),
    )
    .await
    .context("failed to open database")?;
    info!("Database connected and migrations applied");

    let addr = config.server.bind_address();
    let state = Arc::new(AppState::new(db.clone(), config));
    let app = router(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bistro=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received, starting graceful shutdown...");
}
