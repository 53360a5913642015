/// Bearer authentication
///
/// [`AuthContext`] is an extractor: handlers that take it require a live
/// access token, handlers that don't are public. Extraction runs before the
/// body is read, so an unauthenticated request never reaches the domain.
///
/// ```text
/// Authorization: Bearer kat_...
/// ```

use crate::app::AppState;
use crate::error::{ApiError, INVALID_TOKEN_MESSAGE};
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts},
};
use kanban_shared::{
    auth::{authorization::require_identity, tokens::{extract_bearer, ClientInfo}},
    error::KanbanError,
    models::{access_token::AccessToken, user::User},
};
use std::net::{IpAddr, SocketAddr};
use tracing::debug;

/// The authenticated caller and the token it presented
#[derive(Clone)]
pub struct AuthContext {
    pub user: User,

    pub token: AccessToken,

    /// Raw secret, kept only for the lifetime of the request (logout needs it)
    pub secret: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let secret = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(extract_bearer)
            .map(str::to_string);

        let (user, token) = require_identity(&state.tokens, secret.as_deref())
            .await
            .map_err(|e| {
                debug!(error = %e, "Bearer authentication failed");
                match e {
                    KanbanError::Database(_) => ApiError::from(e),
                    _ => ApiError::Unauthenticated(INVALID_TOKEN_MESSAGE.to_string()),
                }
            })?;

        Ok(AuthContext {
            user,
            token,
            secret: secret.unwrap_or_default(),
        })
    }
}

/// Client address and user agent recorded with issued tokens
///
/// The first `X-Forwarded-For` hop wins over the socket address when it
/// parses as an IP address; anything else in the header is ignored.
pub fn client_info(parts: &Parts) -> ClientInfo {
    let forwarded = parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse::<IpAddr>().ok())
        .map(|ip| ip.to_string());

    let socket = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    ClientInfo {
        ip_address: forwarded.or(socket),
        user_agent: parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

/// Extractor wrapper around [`client_info`]
#[derive(Debug, Clone)]
pub struct Client(pub ClientInfo);

#[async_trait]
impl<S> FromRequestParts<S> for Client
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Client(client_info(parts)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_client_info_prefers_forwarded_for() {
        let mut p = parts(
            Request::builder()
                .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
                .header(header::USER_AGENT, "curl/8.0"),
        );
        p.extensions
            .insert(ConnectInfo("127.0.0.1:4000".parse::<SocketAddr>().unwrap()));

        let info = client_info(&p);
        assert_eq!(info.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(info.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[test]
    fn test_client_info_falls_back_to_socket() {
        let mut p = parts(Request::builder());
        p.extensions
            .insert(ConnectInfo("192.0.2.1:4000".parse::<SocketAddr>().unwrap()));

        let info = client_info(&p);
        assert_eq!(info.ip_address.as_deref(), Some("192.0.2.1"));
        assert!(info.user_agent.is_none());
    }

    #[test]
    fn test_client_info_ignores_forwarded_for_that_is_not_an_ip() {
        let junk = "x".repeat(200);
        let mut p = parts(Request::builder().header("x-forwarded-for", junk.as_str()));
        p.extensions
            .insert(ConnectInfo("192.0.2.1:4000".parse::<SocketAddr>().unwrap()));

        let info = client_info(&p);
        assert_eq!(info.ip_address.as_deref(), Some("192.0.2.1"));

        let p = parts(Request::builder().header("x-forwarded-for", "not-an-ip, 10.0.0.1"));
        assert!(client_info(&p).ip_address.is_none());
    }

    #[test]
    fn test_client_info_keeps_forwarded_ipv6() {
        let p = parts(Request::builder().header("x-forwarded-for", " 2001:db8::1 "));
        assert_eq!(client_info(&p).ip_address.as_deref(), Some("2001:db8::1"));
    }
}
