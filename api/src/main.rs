use anyhow::{Context, Result};
use api::config::Config;
use api::db::{self, PgStore};
use api::metrics;
use api::rest::{self, AppState};
use api::store::{MemoryStore, ReadingStore};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    info!("Starting telemetry API");
    info!("HTTP server: {}", config.http_addr);
    info!("Database: {}", config.redacted_database_url());
    info!("Bucket timezone: {}", config.bucket_timezone.name());
    if config.keys.ingest.is_none() {
        warn!("INGEST_API_KEY not set, all ingestion requests will be rejected");
    }
    if config.keys.dashboard.is_none() {
        warn!("DASHBOARD_API_KEY not set, /api endpoints will fail closed");
    }

    metrics::init_metrics().context("failed to register metrics")?;

    // The store handle lives for the whole process and is dropped on shutdown
    let pg_store = if config.uses_memory_store() {
        warn!("Using in-memory store, readings are lost on restart");
        None
    } else {
        let pool = db::make_pool(&config.database_url, config.db_max_connections)
            .await
            .context("failed to connect to database")?;
        Some(PgStore::new(pool))
    };
    let store: Arc<dyn ReadingStore> = match &pg_store {
        Some(pg) => Arc::new(pg.clone()),
        None => Arc::new(MemoryStore::new()),
    };

    let state = AppState::new(store, config.keys.clone(), config.bucket_timezone);
    let app = rest::create_router(state, config.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.http_addr))?;

    info!("HTTP server listening on {}", config.http_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("HTTP server error: {}", e);
    }

    info!("Shutting down");
    if let Some(pg) = pg_store {
        pg.close().await;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
