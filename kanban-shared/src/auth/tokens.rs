/// Opaque bearer tokens with refresh and rotation
///
/// Each sign-in yields a token pair:
///
/// - an access secret `kat_{40 chars}`, short-lived (60 minutes by default)
/// - a refresh secret `krt_{40 chars}`, long-lived (30 days by default)
///
/// Only HMAC-SHA256 digests of the secrets, keyed with the server's
/// `TOKEN_SECRET`, are persisted; lookups are an equality match on the hex
/// digest.
///
/// Every failure, whatever its cause, collapses into
/// [`KanbanError::InvalidToken`] or [`KanbanError::InvalidOrExpiredRefreshToken`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use kanban_shared::auth::tokens::{ClientInfo, SecretHasher, TokenPolicy, TokenService};
/// use kanban_shared::models::user::CreateUser;
/// use kanban_shared::store::{memory::MemoryStore, Store};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
/// let tokens = TokenService::new(
///     store.clone(),
///     SecretHasher::new("a-very-long-server-side-token-secret").expect("HMAC takes any key length"),
///     TokenPolicy::default(),
/// );
///
/// let user = store.create_user(CreateUser {
///     name: "Ada".to_string(),
///     email: "ada@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
/// }).await?;
///
/// let issued = tokens.issue(&user, ClientInfo::default()).await?;
/// let (who, _) = tokens.validate_access(&issued.access_token).await?;
/// assert_eq!(who.id, user.id);
///
/// tokens.revoke(&issued.access_token).await?;
/// assert!(tokens.validate_access(&issued.access_token).await.is_err());
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::Serialize;
use sha2::Sha256;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{KanbanError, KanbanResult};
use crate::models::access_token::{AccessToken, NewAccessToken, TokenRotation};
use crate::models::user::User;
use crate::store::Store;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of access secrets
pub const ACCESS_PREFIX: &str = "kat_";

/// Prefix of refresh secrets
pub const REFRESH_PREFIX: &str = "krt_";

/// Length of the random part of a secret
const SECRET_RANDOM_LENGTH: usize = 40;

fn generate_secret(prefix: &str) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();

    let random: String = (0..SECRET_RANDOM_LENGTH)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();

    format!("{}{}", prefix, random)
}

/// True when `secret` has the shape of a secret with this prefix
pub fn has_secret_format(secret: &str, prefix: &str) -> bool {
    secret
        .strip_prefix(prefix)
        .map(|rest| rest.len() == SECRET_RANDOM_LENGTH && rest.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(false)
}

/// Pulls the credential out of an `Authorization: Bearer ...` header value
pub fn extract_bearer(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Keyed one-way hash applied to every secret before it is stored or looked up
#[derive(Clone)]
pub struct SecretHasher {
    mac: HmacSha256,
}

impl SecretHasher {
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self, hmac::digest::InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(key.as_ref())?,
        })
    }

    /// Hex-encoded HMAC-SHA256 of the secret (64 characters)
    pub fn hash(&self, secret: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(secret.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for SecretHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretHasher(..)")
    }
}

/// Lifetimes and refresh behaviour of issued tokens
#[derive(Debug, Clone)]
pub struct TokenPolicy {
    pub access_ttl: Duration,

    pub refresh_ttl: Duration,

    /// Replace the refresh secret on every refresh
    pub rotate_refresh: bool,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            access_ttl: Duration::minutes(60),
            refresh_ttl: Duration::days(30),
            rotate_refresh: true,
        }
    }
}

/// Client metadata recorded with a token
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Raw secrets handed to the client exactly once
#[derive(Debug, Clone, Serialize)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

pub struct TokenService {
    store: Arc<dyn Store>,
    hasher: SecretHasher,
    policy: TokenPolicy,
}

impl TokenService {
    pub fn new(store: Arc<dyn Store>, hasher: SecretHasher, policy: TokenPolicy) -> Self {
        Self {
            store,
            hasher,
            policy,
        }
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    /// Issues a fresh token pair for `user`
    pub async fn issue(&self, user: &User, client: ClientInfo) -> KanbanResult<IssuedTokens> {
        let now = Utc::now();
        let access_token = generate_secret(ACCESS_PREFIX);
        let refresh_token = generate_secret(REFRESH_PREFIX);

        let record = self
            .store
            .insert_token(NewAccessToken {
                user_id: user.id,
                token_hash: self.hasher.hash(&access_token),
                refresh_token_hash: self.hasher.hash(&refresh_token),
                expires_at: now + self.policy.access_ttl,
                refresh_expires_at: now + self.policy.refresh_ttl,
                // Only a parseable address fits the `ip_address` column
                ip_address: client
                    .ip_address
                    .filter(|ip| ip.parse::<IpAddr>().is_ok()),
                user_agent: client.user_agent,
            })
            .await?;

        info!(user_id = %user.id, token_id = %record.id, "Issued access token");

        Ok(IssuedTokens {
            access_token,
            refresh_token,
            expires_at: record.expires_at,
            refresh_expires_at: record.refresh_expires_at,
        })
    }

    /// Resolves a live access secret to its user, stamping `last_used_at`
    pub async fn validate_access(&self, secret: &str) -> KanbanResult<(User, AccessToken)> {
        if !has_secret_format(secret, ACCESS_PREFIX) {
            return Err(KanbanError::InvalidToken);
        }

        let token = self
            .store
            .touch_token(&self.hasher.hash(secret), Utc::now())
            .await?
            .ok_or(KanbanError::InvalidToken)?;

        let user = self
            .store
            .find_user(token.user_id)
            .await?
            .ok_or(KanbanError::InvalidToken)?;

        debug!(user_id = %user.id, token_id = %token.id, "Access token validated");
        Ok((user, token))
    }

    /// Exchanges a live refresh secret for a new access secret
    ///
    /// With rotation on, the refresh secret is replaced too and the presented
    /// one stops working. With rotation off, the presented refresh secret is
    /// returned unchanged and keeps its original expiry.
    pub async fn refresh(&self, refresh_secret: &str) -> KanbanResult<IssuedTokens> {
        if !has_secret_format(refresh_secret, REFRESH_PREFIX) {
            return Err(KanbanError::InvalidOrExpiredRefreshToken);
        }

        let now = Utc::now();
        let access_token = generate_secret(ACCESS_PREFIX);
        let new_refresh = self
            .policy
            .rotate_refresh
            .then(|| generate_secret(REFRESH_PREFIX));

        let rotation = TokenRotation {
            token_hash: self.hasher.hash(&access_token),
            expires_at: now + self.policy.access_ttl,
            refresh: new_refresh
                .as_ref()
                .map(|secret| (self.hasher.hash(secret), now + self.policy.refresh_ttl)),
        };

        let record = self
            .store
            .rotate_token(&self.hasher.hash(refresh_secret), now, rotation)
            .await?
            .ok_or(KanbanError::InvalidOrExpiredRefreshToken)?;

        info!(
            user_id = %record.user_id,
            token_id = %record.id,
            rotated = self.policy.rotate_refresh,
            "Refreshed access token"
        );

        Ok(IssuedTokens {
            access_token,
            refresh_token: new_refresh.unwrap_or_else(|| refresh_secret.to_string()),
            expires_at: record.expires_at,
            refresh_expires_at: record.refresh_expires_at,
        })
    }

    /// Deletes the token holding this access secret; unknown secrets are ignored
    pub async fn revoke(&self, access_secret: &str) -> KanbanResult<()> {
        let removed = self.store.delete_token(&self.hasher.hash(access_secret)).await?;
        debug!(removed, "Access token revoked");
        Ok(())
    }

    /// Drops tokens whose refresh secret has expired
    pub async fn prune_expired(&self) -> KanbanResult<u64> {
        let pruned = self.store.prune_tokens(Utc::now()).await?;
        if pruned > 0 {
            info!(pruned, "Pruned expired tokens");
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::CreateUser;
    use crate::store::memory::MemoryStore;

    const KEY: &str = "test-token-secret-that-is-long-enough";

    async fn setup(policy: TokenPolicy) -> (TokenService, User) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let user = store
            .create_user(CreateUser {
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap();
        let service = TokenService::new(store, SecretHasher::new(KEY).unwrap(), policy);
        (service, user)
    }

    #[test]
    fn test_generated_secrets_have_expected_shape() {
        let secret = generate_secret(ACCESS_PREFIX);
        assert_eq!(secret.len(), ACCESS_PREFIX.len() + SECRET_RANDOM_LENGTH);
        assert!(has_secret_format(&secret, ACCESS_PREFIX));
        assert!(!has_secret_format(&secret, REFRESH_PREFIX));
        assert!(!has_secret_format("kat_short", ACCESS_PREFIX));
        assert_ne!(secret, generate_secret(ACCESS_PREFIX));
    }

    #[test]
    fn test_hasher_is_keyed_and_deterministic() {
        let a = SecretHasher::new(KEY).unwrap();
        let b = SecretHasher::new("another-key-of-sufficient-length!!").unwrap();

        assert_eq!(a.hash("kat_x"), a.hash("kat_x"));
        assert_eq!(a.hash("kat_x").len(), 64);
        assert_ne!(a.hash("kat_x"), b.hash("kat_x"));
        assert_ne!(a.hash("kat_x"), a.hash("kat_y"));
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer kat_abc"), Some("kat_abc"));
        assert_eq!(extract_bearer("bearer   kat_abc "), Some("kat_abc"));
        assert_eq!(extract_bearer("Basic dXNlcg=="), None);
        assert_eq!(extract_bearer("Bearer"), None);
        assert_eq!(extract_bearer("Bearer  "), None);
    }

    #[tokio::test]
    async fn test_issue_and_validate() {
        let (service, user) = setup(TokenPolicy::default()).await;

        let issued = service
            .issue(
                &user,
                ClientInfo {
                    ip_address: Some("10.0.0.1".to_string()),
                    user_agent: Some("curl/8".to_string()),
                },
            )
            .await
            .unwrap();

        assert!(issued.access_token.starts_with(ACCESS_PREFIX));
        assert!(issued.refresh_token.starts_with(REFRESH_PREFIX));
        assert!(issued.expires_at > Utc::now());
        assert!(issued.refresh_expires_at > issued.expires_at);

        let (who, token) = service.validate_access(&issued.access_token).await.unwrap();
        assert_eq!(who.id, user.id);
        assert!(token.last_used_at.is_some());
        assert_eq!(token.ip_address.as_deref(), Some("10.0.0.1"));
        assert_ne!(token.token_hash, issued.access_token);
    }

    #[tokio::test]
    async fn test_issue_drops_client_address_that_is_not_an_ip() {
        let (service, user) = setup(TokenPolicy::default()).await;

        let issued = service
            .issue(
                &user,
                ClientInfo {
                    ip_address: Some("x".repeat(46)),
                    user_agent: None,
                },
            )
            .await
            .unwrap();

        let (_, token) = service.validate_access(&issued.access_token).await.unwrap();
        assert!(token.ip_address.is_none());
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_secrets_are_invalid() {
        let (service, _) = setup(TokenPolicy::default()).await;

        let forged = format!("{}{}", ACCESS_PREFIX, "a".repeat(40));
        assert!(matches!(
            service.validate_access(&forged).await,
            Err(KanbanError::InvalidToken)
        ));
        assert!(matches!(
            service.validate_access("garbage").await,
            Err(KanbanError::InvalidToken)
        ));
        assert!(matches!(
            service.refresh("garbage").await,
            Err(KanbanError::InvalidOrExpiredRefreshToken)
        ));
    }

    #[tokio::test]
    async fn test_expired_access_token_is_rejected() {
        let (service, user) = setup(TokenPolicy {
            access_ttl: Duration::seconds(-1),
            ..TokenPolicy::default()
        })
        .await;

        let issued = service.issue(&user, ClientInfo::default()).await.unwrap();
        assert!(matches!(
            service.validate_access(&issued.access_token).await,
            Err(KanbanError::InvalidToken)
        ));

        // the refresh secret is still live and yields a usable pair
        let refreshed = service.refresh(&issued.refresh_token).await;
        assert!(refreshed.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_rotates_by_default() {
        let (service, user) = setup(TokenPolicy::default()).await;
        let issued = service.issue(&user, ClientInfo::default()).await.unwrap();

        let refreshed = service.refresh(&issued.refresh_token).await.unwrap();
        assert_ne!(refreshed.access_token, issued.access_token);
        assert_ne!(refreshed.refresh_token, issued.refresh_token);
        assert!(refreshed.expires_at > Utc::now());

        // old secrets are dead, new ones work
        assert!(service.validate_access(&issued.access_token).await.is_err());
        assert!(matches!(
            service.refresh(&issued.refresh_token).await,
            Err(KanbanError::InvalidOrExpiredRefreshToken)
        ));
        assert!(service.validate_access(&refreshed.access_token).await.is_ok());
        assert!(service.refresh(&refreshed.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_without_rotation_keeps_refresh_secret() {
        let (service, user) = setup(TokenPolicy {
            rotate_refresh: false,
            ..TokenPolicy::default()
        })
        .await;
        let issued = service.issue(&user, ClientInfo::default()).await.unwrap();

        let first = service.refresh(&issued.refresh_token).await.unwrap();
        assert_eq!(first.refresh_token, issued.refresh_token);
        assert_eq!(first.refresh_expires_at, issued.refresh_expires_at);

        let second = service.refresh(&issued.refresh_token).await.unwrap();
        assert_ne!(second.access_token, first.access_token);
        assert!(service.validate_access(&first.access_token).await.is_err());
        assert!(service.validate_access(&second.access_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_refresh_secret_fails() {
        let (service, user) = setup(TokenPolicy {
            refresh_ttl: Duration::seconds(-1),
            ..TokenPolicy::default()
        })
        .await;
        let issued = service.issue(&user, ClientInfo::default()).await.unwrap();

        assert!(matches!(
            service.refresh(&issued.refresh_token).await,
            Err(KanbanError::InvalidOrExpiredRefreshToken)
        ));
        assert_eq!(service.prune_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent_and_final() {
        let (service, user) = setup(TokenPolicy::default()).await;
        let issued = service.issue(&user, ClientInfo::default()).await.unwrap();
        let other_device = service.issue(&user, ClientInfo::default()).await.unwrap();

        service.revoke(&issued.access_token).await.unwrap();
        service.revoke(&issued.access_token).await.unwrap();
        service.revoke("never-issued").await.unwrap();

        assert!(service.validate_access(&issued.access_token).await.is_err());
        assert!(service.refresh(&issued.refresh_token).await.is_err());
        assert!(service.validate_access(&other_device.access_token).await.is_ok());
    }
}
