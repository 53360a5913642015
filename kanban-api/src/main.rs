//! # Kanban API Server
//!
//! Multi-user Kanban boards over HTTP: boards with WIP-limited columns,
//! cards that move between them, and a per-card history.
//!
//! ## Usage
//!
//! ```bash
//! TOKEN_SECRET=$(openssl rand -hex 32) DATABASE_URL=postgresql://... cargo run -p kanban-api
//! STORAGE_BACKEND=memory TOKEN_SECRET=... cargo run -p kanban-api
//! ```

use anyhow::Context;
use kanban_api::{
    app::{build_router, AppState},
    config::{Config, StorageBackend},
};
use kanban_shared::{
    db::{migrations, pool},
    store::{memory::MemoryStore, postgres::PgStore, Store},
};
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "kanban_api=debug,kanban_shared=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT").map(|f| f.eq_ignore_ascii_case("json")).unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Opens the configured store; the pool is returned so it can be closed on shutdown
async fn open_store(config: &Config) -> anyhow::Result<(Arc<dyn Store>, Option<PgPool>)> {
    match config.database.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Ok((Arc::new(MemoryStore::new()), None))
        }
        StorageBackend::Postgres => {
            migrations::ensure_database_exists(&config.database.url)
                .await
                .context("Failed to ensure database exists")?;

            let pool = pool::create_pool(pool::DatabaseConfig {
                url: config.database.url.clone(),
                max_connections: config.database.max_connections,
                ..Default::default()
            })
            .await
            .context("Failed to connect to database")?;

            migrations::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;

            Ok((Arc::new(PgStore::new(pool.clone())), Some(pool)))
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env must be loaded before the filter reads RUST_LOG
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("Kanban API Server v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let bind_address = config.bind_address();

    let (store, pool) = open_store(&config).await?;
    let state = AppState::new(store, config)?;

    if let Err(e) = state.tokens.prune_expired().await {
        tracing::warn!(error = %e, "Failed to prune expired tokens");
    }

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(pool) = pool {
        pool::close_pool(pool).await;
    }

    tracing::info!("Server stopped");
    Ok(())
}
