/// Common test utilities for integration tests
///
/// Every [`TestContext`] runs the full router on a fresh in-memory store, so
/// tests need no database and never share state.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use kanban_api::app::{build_router, AppState};
use kanban_api::config::{ApiConfig, AuthConfig, Config, DatabaseConfig, StorageBackend};
use kanban_shared::store::{memory::MemoryStore, Store};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::Service as _;

pub const PASSWORD: &str = "secret123";

/// A registered user and the tokens returned at registration
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
}

pub struct TestContext {
    pub app: Router,
    pub store: Arc<dyn Store>,
}

pub fn test_config(rotate_refresh: bool) -> Config {
    Config {
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            production: false,
            cors_origins: vec!["*".to_string()],
        },
        database: DatabaseConfig {
            backend: StorageBackend::Memory,
            url: String::new(),
            max_connections: 1,
        },
        auth: AuthConfig {
            token_secret: "integration-test-secret-at-least-32-bytes".to_string(),
            access_ttl_minutes: 60,
            refresh_ttl_days: 30,
            rotate_refresh,
        },
    }
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(test_config(true))
    }

    pub fn with_config(config: Config) -> Self {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), config).expect("Failed to build state");

        TestContext {
            app: build_router(state),
            store,
        }
    }

    /// Sends a request and returns the status with the parsed JSON body
    ///
    /// Empty bodies (204) come back as `Value::Null`.
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.app.clone().call(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                panic!("Non-JSON body ({}): {}", status, String::from_utf8_lossy(&bytes))
            })
        };

        (status, value)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send("GET", uri, None, None).await
    }

    pub async fn register(&self, name: &str) -> Session {
        let (status, body) = self
            .send(
                "POST",
                "/register",
                None,
                Some(json!({
                    "name": name,
                    "email": format!("{}@example.com", name.to_lowercase()),
                    "password": PASSWORD,
                    "password_confirmation": PASSWORD,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);

        Session {
            user_id: body["user"]["id"].as_str().unwrap().to_string(),
            access_token: body["access_token"].as_str().unwrap().to_string(),
            refresh_token: body["refresh_token"].as_str().unwrap().to_string(),
        }
    }

    /// Creates a board and returns its JSON (board fields plus `columns`)
    pub async fn create_board(&self, session: &Session, title: &str) -> Value {
        let (status, body) = self
            .send(
                "POST",
                "/boards",
                Some(&session.access_token),
                Some(json!({ "title": title })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create board failed: {}", body);
        body
    }

    pub async fn create_card(
        &self,
        session: &Session,
        board_id: &str,
        column_id: &str,
        title: &str,
    ) -> (StatusCode, Value) {
        self.send(
            "POST",
            &format!("/boards/{}/cards", board_id),
            Some(&session.access_token),
            Some(json!({ "title": title, "column_id": column_id })),
        )
        .await
    }
}

/// Id of the column called `name` in a board payload
pub fn column_id(board: &Value, name: &str) -> String {
    board["columns"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == name)
        .and_then(|c| c["id"].as_str())
        .unwrap_or_else(|| panic!("no column named {}", name))
        .to_string()
}
