/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /register` - Create an account and sign in
/// - `POST /login` - Exchange credentials for a token pair
/// - `POST /refresh` - Exchange a refresh secret for a new token pair
/// - `POST /logout` - Revoke the presented access token
///
/// Token pairs are opaque: `access_token` is sent as `Authorization: Bearer`
/// on every authenticated request; `refresh_token` is only ever sent to
/// `/refresh`.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult, ValidatedJson},
    middleware::auth::{AuthContext, Client},
};
use axum::{extract::State, http::StatusCode, Json};
use kanban_shared::{
    auth::{password, tokens::IssuedTokens},
    models::user::{CreateUser, UserProfile},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 255, message = "The name field is required and must be at most 255 characters."))]
    pub name: String,

    #[validate(
        email(message = "The email must be a valid email address."),
        length(max = 255, message = "The email must be at most 255 characters.")
    )]
    pub email: String,

    pub password: String,

    pub password_confirmation: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "The email must be a valid email address."))]
    pub email: String,

    #[validate(length(min = 1, message = "The password field is required."))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "The refresh token field is required."))]
    pub refresh_token: String,
}

/// Signed-in user with a fresh token pair
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: UserProfile,

    #[serde(flatten)]
    pub tokens: IssuedTokens,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Register a new user
///
/// ```text
/// POST /register
/// { "name": "Ada", "email": "ada@example.com", "password": "secret1", "password_confirmation": "secret1" }
/// ```
///
/// # Errors
///
/// - `422 Unprocessable Entity`: invalid fields, mismatched confirmation or
///   an email that is already registered
pub async fn register(
    State(state): State<AppState>,
    Client(client): Client,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    password::validate_new_password(&req.password, &req.password_confirmation)
        .map_err(|(field, message)| ApiError::invalid(field, message))?;

    let password_hash = password::hash_password(&req.password)?;

    let user = state
        .store
        .create_user(CreateUser {
            name: req.name.trim().to_string(),
            email: req.email.trim().to_string(),
            password_hash,
        })
        .await?;

    let tokens = state.tokens.issue(&user, client).await?;

    info!(user_id = %user.id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            user: UserProfile::from(&user),
            tokens,
        }),
    ))
}

/// Login with email and password
///
/// Unknown emails and wrong passwords get the same 401, and both pay for
/// one Argon2id verification.
pub async fn login(
    State(state): State<AppState>,
    Client(client): Client,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let Some(user) = state.store.find_user_by_email(req.email.trim()).await? else {
        password::verify_dummy(&req.password);
        return Err(ApiError::Unauthenticated(INVALID_CREDENTIALS.to_string()));
    };

    if !password::verify_password(&req.password, &user.password_hash)? {
        warn!(user_id = %user.id, "Login rejected");
        return Err(ApiError::Unauthenticated(INVALID_CREDENTIALS.to_string()));
    }

    let tokens = state.tokens.issue(&user, client).await?;

    info!(user_id = %user.id, "User logged in");

    Ok(Json(SessionResponse {
        user: UserProfile::from(&user),
        tokens,
    }))
}

/// Exchange a refresh secret for a new token pair
///
/// With rotation enabled the presented refresh secret stops working.
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> ApiResult<Json<IssuedTokens>> {
    let tokens = state.tokens.refresh(&req.refresh_token).await?;
    Ok(Json(tokens))
}

/// Revoke the access token used for this request
///
/// Tokens issued to the same user on other devices stay valid.
pub async fn logout(State(state): State<AppState>, auth: AuthContext) -> ApiResult<Json<MessageResponse>> {
    state.tokens.revoke(&auth.secret).await?;

    info!(user_id = %auth.user.id, token_id = %auth.token.id, "User logged out");

    Ok(Json(MessageResponse {
        message: "Logged out successfully".to_string(),
    }))
}
