/// Error taxonomy for the Kanban core
///
/// Every domain and storage failure is expressed as a [`KanbanError`]. The HTTP
/// layer maps each variant to exactly one status code, so the variants follow
/// the failure classes clients need to tell apart rather than the place the
/// failure happened.
///
/// Storage contention (serialization failures, deadlocks) never shows up here:
/// the PostgreSQL store retries it before returning.

use uuid::Uuid;

/// Result alias used throughout the shared crate
pub type KanbanResult<T> = Result<T, KanbanError>;

/// Entity kinds that can be missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Board,
    Column,
    Card,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::User => "User",
            Entity::Board => "Board",
            Entity::Column => "Column",
            Entity::Card => "Card",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KanbanError {
    /// Malformed or inconsistent input detected by the core
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// The referenced entity does not exist
    #[error("{} not found: {id}", .entity.as_str())]
    NotFound { entity: Entity, id: Uuid },

    /// Authenticated, but not the owner of the board
    #[error("Only the board owner may perform this action")]
    Forbidden,

    /// The target column already holds `wip_limit` cards
    #[error("WIP limit of {wip_limit} reached for column {column_id}")]
    WipLimitReached { column_id: Uuid, wip_limit: i32 },

    /// A card was asked to move into the column it already sits in
    #[error("Card {card_id} is already in column {column_id}")]
    SameColumnMove { card_id: Uuid, column_id: Uuid },

    /// Access secret unknown, revoked or expired
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Refresh secret unknown, revoked or expired
    #[error("Invalid or expired refresh token")]
    InvalidOrExpiredRefreshToken,

    /// Registration with an email that already belongs to a user
    #[error("Email already registered")]
    EmailTaken,

    /// Unrecoverable storage failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl KanbanError {
    pub fn not_found(entity: Entity, id: Uuid) -> Self {
        KanbanError::NotFound { entity, id }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        KanbanError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// True for failures the storage layer should retry instead of surfacing
    ///
    /// PostgreSQL reports `40001` for serialization failures and `40P01` for
    /// deadlocks; both resolve themselves when the transaction is replayed.
    pub fn is_transient(&self) -> bool {
        match self {
            KanbanError::Database(sqlx::Error::Database(db_err)) => {
                matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => false,
        }
    }
}
