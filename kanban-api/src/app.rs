/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use kanban_api::{app::{build_router, AppState}, config::Config};
/// use kanban_shared::store::memory::MemoryStore;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let state = AppState::new(Arc::new(MemoryStore::new()), config)?;
/// let app = build_router(state);
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, error::ApiError, middleware::security::SecurityHeadersLayer, routes};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use kanban_shared::{
    auth::tokens::{SecretHasher, TokenService},
    kanban::service::Kanban,
    store::Store,
};
use std::{sync::Arc, time::Duration};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state, cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,

    pub kanban: Kanban,

    pub tokens: Arc<TokenService>,

    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the services onto `store`
    ///
    /// # Errors
    ///
    /// Fails if `TOKEN_SECRET` cannot key the secret hasher.
    pub fn new(store: Arc<dyn Store>, config: Config) -> anyhow::Result<Self> {
        let hasher = SecretHasher::new(config.auth.token_secret.as_bytes())
            .map_err(|e| anyhow::anyhow!("TOKEN_SECRET cannot be used as an HMAC key: {}", e))?;
        let tokens = TokenService::new(store.clone(), hasher, config.auth.token_policy());

        Ok(Self {
            kanban: Kanban::new(store.clone()),
            tokens: Arc::new(tokens),
            store,
            config: Arc::new(config),
        })
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.api.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}

/// Builds the complete router
///
/// ```text
/// /
/// ├── GET    /health
/// ├── POST   /register | /login | /refresh
/// ├── POST   /logout                      (auth)
/// ├── GET    /boards
/// ├── POST   /boards                      (auth)
/// ├── GET    /boards/:id
/// ├── PATCH  /boards/:id                  (owner)
/// ├── DELETE /boards/:id                  (owner)
/// ├── POST   /boards/:id/columns          (owner)
/// ├── POST   /boards/:id/cards            (auth)
/// ├── GET    /boards/:id/history
/// ├── PATCH  /columns/:id                 (owner)
/// ├── DELETE /columns/:id                 (owner)
/// ├── GET    /cards/:id
/// ├── PATCH  /cards/:id                   (auth)
/// ├── DELETE /cards/:id                   (auth)
/// ├── POST   /cards/:id/move              (auth)
/// └── GET    /cards/:id/history
/// ```
///
/// Authentication is enforced per handler by the
/// [`AuthContext`](crate::middleware::auth::AuthContext) extractor.
pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh))
        .route("/logout", post(routes::auth::logout));

    let board_routes = Router::new()
        .route(
            "/boards",
            get(routes::boards::list_boards).post(routes::boards::create_board),
        )
        .route(
            "/boards/:id",
            get(routes::boards::show_board)
                .patch(routes::boards::update_board)
                .delete(routes::boards::delete_board),
        )
        .route("/boards/:id/columns", post(routes::columns::create_column))
        .route("/boards/:id/cards", post(routes::cards::create_card))
        .route("/boards/:id/history", get(routes::history::board_history));

    let column_routes = Router::new().route(
        "/columns/:id",
        axum::routing::patch(routes::columns::update_column).delete(routes::columns::delete_column),
    );

    let card_routes = Router::new()
        .route(
            "/cards/:id",
            get(routes::cards::show_card)
                .patch(routes::cards::update_card)
                .delete(routes::cards::delete_card),
        )
        .route("/cards/:id/move", post(routes::cards::move_card))
        .route("/cards/:id/history", get(routes::history::card_history));

    let cors = cors_layer(&state.config);
    let production = state.config.api.production;

    Router::new()
        .route("/health", get(routes::health::health_check))
        .merge(auth_routes)
        .merge(board_routes)
        .merge(column_routes)
        .merge(card_routes)
        .fallback(|| async { ApiError::NotFound("Route not found".to_string()) })
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(production))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, AuthConfig, DatabaseConfig, StorageBackend};
    use kanban_shared::store::memory::MemoryStore;

    fn config(origins: &[&str]) -> Config {
        Config {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                production: false,
                cors_origins: origins.iter().map(|o| o.to_string()).collect(),
            },
            database: DatabaseConfig {
                backend: StorageBackend::Memory,
                url: String::new(),
                max_connections: 1,
            },
            auth: AuthConfig {
                token_secret: "test-secret-key-at-least-32-bytes-long".to_string(),
                access_ttl_minutes: 60,
                refresh_ttl_days: 30,
                rotate_refresh: true,
            },
        }
    }

    #[test]
    fn test_app_state_shares_one_store() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), config(&["*"])).unwrap();

        assert!(Arc::ptr_eq(&state.store, &store));
        assert!(Arc::ptr_eq(state.kanban.store(), &store));
        assert_eq!(state.tokens.policy().refresh_ttl, chrono::Duration::days(30));
    }

    #[test]
    fn test_router_builds_with_explicit_origins() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let state = AppState::new(store, config(&["https://board.example"])).unwrap();
        let _router = build_router(state);
    }
}
