//! Placement API
//!
//! Records where the scheduler decided each pod should run, records what
//! executors actually did, and reports whether the two agree.

use std::sync::Arc;

use anyhow::Result;
use placement_api::{
    api,
    config::{self, StoreKind},
    db::{Database, MemoryStore, Store},
    state::AppState,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Prefer RUST_LOG, fall back to PLACEMENT_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting placement API");
    info!(listen_addr = %config.listen_addr, store = ?config.store, "Configuration loaded");

    let store: Arc<dyn Store> = match config.store {
        StoreKind::Postgres => {
            let db = match Database::connect(&config.database).await {
                Ok(db) => db,
                Err(e) => {
                    error!(error = %e, "Failed to connect to database");
                    return Err(e.into());
                }
            };

            if config.dev_mode {
                info!("Running database migrations (dev mode)");
                if let Err(e) = db.run_migrations().await {
                    error!(error = %e, "Failed to run migrations");
                    return Err(e.into());
                }
            }

            Arc::new(db.store())
        }
        StoreKind::Memory => {
            warn!("Using in-memory store; records are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let app = api::create_router(AppState::new(store));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Received shutdown signal");
        })
        .await?;

    info!("Placement API shutdown complete");
    Ok(())
}
