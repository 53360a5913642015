/// Configuration management for the API server
///
/// Configuration comes from environment variables; a `.env` file is honoured
/// in development.
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `API_PRODUCTION`: Enables HSTS (default: false)
/// - `CORS_ORIGINS`: Comma-separated allowed origins (default: `*`)
/// - `STORAGE_BACKEND`: `postgres` or `memory` (default: postgres)
/// - `DATABASE_URL`: PostgreSQL connection string (required for postgres)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `TOKEN_SECRET`: Key for hashing bearer secrets (required, >= 32 chars)
/// - `ACCESS_TOKEN_TTL_MINUTES`: Access token lifetime (default: 60)
/// - `REFRESH_TOKEN_TTL_DAYS`: Refresh token lifetime (default: 30)
/// - `ROTATE_REFRESH_TOKENS`: Issue a new refresh secret on refresh (default: true)
/// - `RUST_LOG`, `LOG_FORMAT`: read by `main` when tracing starts
///
/// # Example
///
/// ```no_run
/// use kanban_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use anyhow::Context;
use chrono::Duration;
use kanban_shared::auth::tokens::TokenPolicy;
use std::{env, fmt, str::FromStr};

/// Shortest accepted `TOKEN_SECRET`
pub const MIN_TOKEN_SECRET_LEN: usize = 32;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,

    pub database: DatabaseConfig,

    pub auth: AuthConfig,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,

    pub port: u16,

    /// Production mode adds HSTS
    pub production: bool,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,
}

/// Where boards, users and tokens live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => anyhow::bail!("unknown storage backend '{}', expected postgres or memory", other),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: StorageBackend,

    /// PostgreSQL connection URL, empty for the memory backend
    pub url: String,

    pub max_connections: u32,
}

/// Bearer token configuration
#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC key for bearer secrets
    ///
    /// Generate with: `openssl rand -hex 32`
    pub token_secret: String,

    pub access_ttl_minutes: i64,

    pub refresh_ttl_days: i64,

    pub rotate_refresh: bool,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token_secret", &"<redacted>")
            .field("access_ttl_minutes", &self.access_ttl_minutes)
            .field("refresh_ttl_days", &self.refresh_ttl_days)
            .field("rotate_refresh", &self.rotate_refresh)
            .finish()
    }
}

impl AuthConfig {
    pub fn token_policy(&self) -> TokenPolicy {
        TokenPolicy {
            access_ttl: Duration::minutes(self.access_ttl_minutes),
            refresh_ttl: Duration::days(self.refresh_ttl_days),
            rotate_refresh: self.rotate_refresh,
        }
    }
}

/// Reads `name` through `lookup`, falling back to `default` when unset
fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", name, raw, e)),
        None => Ok(default),
    }
}

fn positive(name: &str, value: i64) -> anyhow::Result<i64> {
    if value <= 0 {
        anyhow::bail!("{} must be greater than zero", name);
    }
    Ok(value)
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does
    /// not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&lookup, "API_PORT", 8080u16)?;
        let production = parse_or(&lookup, "API_PRODUCTION", false)?;
        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let backend = parse_or(&lookup, "STORAGE_BACKEND", StorageBackend::Postgres)?;
        let url = match backend {
            StorageBackend::Postgres => lookup("DATABASE_URL")
                .context("DATABASE_URL environment variable is required for the postgres backend")?,
            StorageBackend::Memory => lookup("DATABASE_URL").unwrap_or_default(),
        };
        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10u32)?;

        let token_secret = lookup("TOKEN_SECRET").context("TOKEN_SECRET environment variable is required")?;
        if token_secret.len() < MIN_TOKEN_SECRET_LEN {
            anyhow::bail!("TOKEN_SECRET must be at least {} characters long", MIN_TOKEN_SECRET_LEN);
        }

        let access_ttl_minutes = positive(
            "ACCESS_TOKEN_TTL_MINUTES",
            parse_or(&lookup, "ACCESS_TOKEN_TTL_MINUTES", 60i64)?,
        )?;
        let refresh_ttl_days = positive(
            "REFRESH_TOKEN_TTL_DAYS",
            parse_or(&lookup, "REFRESH_TOKEN_TTL_DAYS", 30i64)?,
        )?;
        let rotate_refresh = parse_or(&lookup, "ROTATE_REFRESH_TOKENS", true)?;

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                production,
                cors_origins,
            },
            database: DatabaseConfig {
                backend,
                url,
                max_connections,
            },
            auth: AuthConfig {
                token_secret,
                access_ttl_minutes,
                refresh_ttl_days,
                rotate_refresh,
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}
