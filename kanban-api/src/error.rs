/// Error handling for the API server
///
/// Every handler returns `Result<T, ApiError>`. Domain errors convert with
/// `?` and render as:
///
/// ```json
/// {
///   "message": "WIP limit of 3 reached for column ...",
///   "error": { "code": "WIP_LIMIT_REACHED" },
///   "errors": [{ "field": "title", "message": "..." }]
/// }
/// ```
///
/// `errors` is only present on `VALIDATION_ERROR`.
///
/// # Example
///
/// ```
/// use kanban_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::json;
///
/// async fn handler() -> ApiResult<Json<serde_json::Value>> {
///     Err(ApiError::NotFound("Board not found".to_string()))
/// }
/// ```

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kanban_shared::{auth::password::PasswordError, error::KanbanError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Generic message for every access-token failure
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired token";

/// Generic message for every refresh-token failure
pub const INVALID_REFRESH_MESSAGE: &str = "Invalid or expired refresh token";

#[derive(Debug)]
pub enum ApiError {
    /// Malformed request (400)
    BadRequest(String),

    /// Missing, unknown or expired credential (401)
    Unauthenticated(String),

    /// Authenticated but not the board owner (403)
    Forbidden(String),

    /// Not found (404)
    NotFound(String),

    /// Field-level validation failures (422)
    ValidationError(Vec<ValidationErrorDetail>),

    /// Target column is full (422)
    WipLimitReached(String),

    /// Move into the column the card already sits in (400)
    SameColumnMove(String),

    /// Internal server error (500)
    InternalError(String),

    /// Service unavailable (503)
    ServiceUnavailable(String),
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,

    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorCode {
    pub code: String,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,

    pub error: ErrorCode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    /// Single-field validation failure
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: field.into(),
            message: message.into(),
        }])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::SameColumnMove(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ValidationError(_) | ApiError::WipLimitReached(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthenticated(_) => "UNAUTHENTICATED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::WipLimitReached(_) => "WIP_LIMIT_REACHED",
            ApiError::SameColumnMove(_) => "SAME_COLUMN_MOVE",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthenticated(msg) => write!(f, "Unauthenticated: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::WipLimitReached(msg) => write!(f, "WIP limit reached: {}", msg),
            ApiError::SameColumnMove(msg) => write!(f, "Same column move: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code().to_string();

        let (message, errors) = match self {
            ApiError::ValidationError(errors) => {
                let message = errors
                    .first()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| "The given data was invalid.".to_string());
                (message, Some(errors))
            }
            ApiError::InternalError(msg) => {
                // Details stay in the log
                tracing::error!("Internal error: {}", msg);
                ("An internal error occurred".to_string(), None)
            }
            ApiError::BadRequest(msg)
            | ApiError::Unauthenticated(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::WipLimitReached(msg)
            | ApiError::SameColumnMove(msg)
            | ApiError::ServiceUnavailable(msg) => (msg, None),
        };

        let body = Json(ErrorResponse {
            message,
            error: ErrorCode { code },
            errors,
        });

        (status, body).into_response()
    }
}

impl From<KanbanError> for ApiError {
    fn from(err: KanbanError) -> Self {
        match err {
            KanbanError::Validation { field, message } => ApiError::invalid(field, message),
            KanbanError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            KanbanError::Forbidden => ApiError::Forbidden(err.to_string()),
            KanbanError::WipLimitReached { .. } => ApiError::WipLimitReached(err.to_string()),
            KanbanError::SameColumnMove { .. } => ApiError::SameColumnMove(err.to_string()),
            KanbanError::InvalidToken => ApiError::Unauthenticated(INVALID_TOKEN_MESSAGE.to_string()),
            KanbanError::InvalidOrExpiredRefreshToken => {
                ApiError::Unauthenticated(INVALID_REFRESH_MESSAGE.to_string())
            }
            KanbanError::EmailTaken => ApiError::invalid("email", "The email has already been taken."),
            KanbanError::Database(e) => ApiError::InternalError(format!("Database error: {}", e)),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationErrorDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("The {} field is invalid.", field)),
                })
            })
            .collect();

        // HashMap order is unstable
        details.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::ValidationError(details)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => ApiError::invalid("body", e.body_text()),
            other => ApiError::BadRequest(other.body_text()),
        }
    }
}

/// JSON body that is deserialized and then checked with `validator`
///
/// Both failures render through [`ApiError`], so malformed bodies get the
/// same error shape as domain rejections.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        validated_body(Json::<T>::from_request(req, state).await).map(ValidatedJson)
    }
}

/// Finishes a body extraction that the handler deferred
///
/// Owner-only handlers take `Result<Json<T>, JsonRejection>` so a non-owner
/// gets 403 before the body is looked at; they call this once the ownership
/// check passed.
pub fn validated_body<T: Validate>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    let Json(value) = body?;
    value.validate()?;
    Ok(value)
}
