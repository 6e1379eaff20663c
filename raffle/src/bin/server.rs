//! Raffle Platform Server
//!
//! This binary:
//! - Loads configuration from the environment (and `.env`)
//! - Connects to `PostgreSQL` (or runs on in-memory storage)
//! - Serves the HTTP API, function endpoints and Telegram webhook
//! - Runs the reservation expiry sweep and notification cleanup jobs
//!
//! # Usage
//!
//! ```bash
//! # Start infrastructure
//! docker compose up -d
//!
//! # Run server
//! cargo run --bin raffle-server
//! ```

use raffle::config::{Config, StorageBackend};
use raffle::maintenance::{spawn_expiry_sweeper, spawn_notification_cleanup};
use raffle::server::{await_jobs, build_router, shutdown_signal, AppState, Integrations};
use raffle::store::{PostgresStore, Storage};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,raffle=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting raffle server...");

    let config = Config::from_env();
    tracing::info!(
        storage = ?config.storage,
        bind = %config.bind_address(),
        "Configuration loaded"
    );

    let storage = match config.storage {
        StorageBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.postgres.max_connections)
                .min_connections(config.postgres.min_connections)
                .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
                .idle_timeout(Duration::from_secs(config.postgres.idle_timeout))
                .connect(&config.postgres.url)
                .await?;
            if config.postgres.run_migrations {
                PostgresStore::new(pool.clone()).migrate().await?;
                tracing::info!("Migrations applied");
            }
            Storage::postgres(pool)
        },
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, data is lost on restart");
            Storage::memory()
        },
    };

    let metrics = raffle::metrics::install_recorder()?;
    let integrations = Integrations::from_config(&config);
    let state = AppState::new(config.clone(), storage.clone(), integrations).with_metrics(metrics);

    // Background jobs
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut jobs = Vec::new();
    if let Some(handle) = spawn_expiry_sweeper(
        state.tickets.clone(),
        Duration::from_secs(config.jobs.expiry_sweep_interval),
        shutdown_rx.clone(),
    ) {
        jobs.push(("expiry_sweeper", handle));
    }
    if let Some(handle) = spawn_notification_cleanup(
        Arc::clone(&storage.notifications),
        Arc::clone(&state.clock),
        Duration::from_secs(config.jobs.cleanup_interval),
        shutdown_rx,
    ) {
        jobs.push(("notification_cleanup", handle));
    }

    let executor = state.tickets.executor().clone();
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    tracing::info!(address = %config.bind_address(), "Raffle server listening");

    if let Err(error) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(%error, "HTTP server failed");
    }

    tracing::info!("HTTP server stopped, initiating graceful shutdown...");
    let _ = shutdown_tx.send(true);

    let timeout = Duration::from_secs(config.server.shutdown_timeout);
    await_jobs(jobs, timeout).await;
    if let Err(error) = executor.shutdown(timeout).await {
        tracing::warn!(%error, "Pending notifications did not finish");
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}
