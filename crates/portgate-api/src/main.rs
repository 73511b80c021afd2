//! Portgate API Service
//!
//! REST API for gate scans, slot allocation, ticket tracking and pickup
//! appointments at a port terminal.

use anyhow::{Context, Result};
use portgate_api::config::{Config, StorageBackendKind};
use portgate_api::{create_router, AppState, Storage};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portgate_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Portgate API Service");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "Configuration loaded - listening on {}",
        config.api_address()
    );

    // Initialize storage
    let storage = match config.storage_backend {
        StorageBackendKind::Redis => {
            info!("Redis URL: {}", config.redis_url);
            Storage::redis(&config.redis_url)
                .await
                .context("Failed to initialize storage")?
        }
        StorageBackendKind::Memory => {
            warn!("Using in-memory storage, records are lost on restart");
            Storage::in_memory()
        }
    };

    match &config.bootstrap_admin {
        Some(admin) => {
            let user = storage
                .ensure_admin(&admin.email, &admin.password, &admin.name)
                .await
                .context("Failed to create bootstrap administrator")?;
            info!("Administrator account: {} (#{})", user.email, user.id);
        }
        None => info!("No bootstrap administrator configured"),
    }

    // Create router
    let state = AppState::new(storage, config.session_ttl_secs);
    let app = create_router(state);

    // Start server
    let listener = TcpListener::bind(&config.api_address())
        .await
        .with_context(|| format!("Failed to bind to {}", config.api_address()))?;

    info!("Portgate API listening on {}", config.api_address());
    info!("Health check: http://{}/health", config.api_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Portgate API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
