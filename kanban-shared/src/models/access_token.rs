/// Personal access token model and database operations
///
/// One row per signed-in device. Only keyed hashes of the access and refresh
/// secrets are stored; the raw secrets exist only in the response that issued
/// them. Every operation that reads a token for authentication is a single
/// `UPDATE`/`DELETE ... RETURNING` statement, so concurrent validate, refresh
/// and revoke calls on the same row are serialised by its row lock.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE personal_access_tokens (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     token_hash VARCHAR(64) NOT NULL UNIQUE,
///     refresh_token_hash VARCHAR(64) NOT NULL UNIQUE,
///     expires_at TIMESTAMPTZ NOT NULL,
///     refresh_expires_at TIMESTAMPTZ NOT NULL,
///     last_used_at TIMESTAMPTZ,
///     ip_address VARCHAR(45),
///     user_agent TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessToken {
    pub id: Uuid,

    pub user_id: Uuid,

    /// Keyed hash of the access secret
    #[serde(skip_serializing)]
    pub token_hash: String,

    /// Keyed hash of the refresh secret
    #[serde(skip_serializing)]
    pub refresh_token_hash: String,

    pub expires_at: DateTime<Utc>,

    pub refresh_expires_at: DateTime<Utc>,

    pub last_used_at: Option<DateTime<Utc>>,

    pub ip_address: Option<String>,

    pub user_agent: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for persisting a freshly issued token pair
#[derive(Debug, Clone)]
pub struct NewAccessToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub refresh_token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Replacement values applied by a refresh
///
/// `refresh` is `None` when refresh secrets do not rotate; the stored refresh
/// hash and its expiry are then left as they are.
#[derive(Debug, Clone)]
pub struct TokenRotation {
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub refresh: Option<(String, DateTime<Utc>)>,
}

impl AccessToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_refresh_expired(&self, now: DateTime<Utc>) -> bool {
        self.refresh_expires_at <= now
    }
}

const TOKEN_COLUMNS: &str = "id, user_id, token_hash, refresh_token_hash, expires_at, \
    refresh_expires_at, last_used_at, ip_address, user_agent, created_at, updated_at";

impl AccessToken {
    pub async fn insert(db: impl PgExecutor<'_>, data: &NewAccessToken) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AccessToken>(&format!(
            r#"
            INSERT INTO personal_access_tokens
                (user_id, token_hash, refresh_token_hash, expires_at, refresh_expires_at, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            TOKEN_COLUMNS
        ))
        .bind(data.user_id)
        .bind(&data.token_hash)
        .bind(&data.refresh_token_hash)
        .bind(data.expires_at)
        .bind(data.refresh_expires_at)
        .bind(&data.ip_address)
        .bind(&data.user_agent)
        .fetch_one(db)
        .await
    }

    /// Finds a live token by access hash and stamps `last_used_at`
    ///
    /// Returns `None` when the hash is unknown or the access secret expired.
    pub async fn touch(
        db: impl PgExecutor<'_>,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AccessToken>(&format!(
            r#"
            UPDATE personal_access_tokens
            SET last_used_at = $2
            WHERE token_hash = $1 AND expires_at > $2
            RETURNING {}
            "#,
            TOKEN_COLUMNS
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(db)
        .await
    }

    /// Swaps in new secrets for the token whose refresh hash matches
    ///
    /// Returns `None` when the refresh hash is unknown or expired.
    pub async fn rotate(
        db: impl PgExecutor<'_>,
        refresh_token_hash: &str,
        now: DateTime<Utc>,
        rotation: &TokenRotation,
    ) -> Result<Option<Self>, sqlx::Error> {
        let (new_refresh_hash, new_refresh_expiry) = match &rotation.refresh {
            Some((hash, expires_at)) => (Some(hash.as_str()), Some(*expires_at)),
            None => (None, None),
        };

        sqlx::query_as::<_, AccessToken>(&format!(
            r#"
            UPDATE personal_access_tokens
            SET token_hash = $3,
                expires_at = $4,
                refresh_token_hash = COALESCE($5, refresh_token_hash),
                refresh_expires_at = COALESCE($6, refresh_expires_at),
                last_used_at = $2,
                updated_at = $2
            WHERE refresh_token_hash = $1 AND refresh_expires_at > $2
            RETURNING {}
            "#,
            TOKEN_COLUMNS
        ))
        .bind(refresh_token_hash)
        .bind(now)
        .bind(&rotation.token_hash)
        .bind(rotation.expires_at)
        .bind(new_refresh_hash)
        .bind(new_refresh_expiry)
        .fetch_optional(db)
        .await
    }

    /// Deletes the token with the given access hash
    pub async fn delete_by_hash(db: impl PgExecutor<'_>, token_hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM personal_access_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes tokens whose refresh secret has expired
    pub async fn delete_expired(db: impl PgExecutor<'_>, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM personal_access_tokens WHERE refresh_expires_at <= $1")
            .bind(now)
            .execute(db)
            .await?;

        Ok(result.rows_affected())
    }
}
