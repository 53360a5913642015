/// Board model and database operations
///
/// A board has exactly one owner, fixed at creation. It owns an ordered set of
/// columns and a flat set of cards; deleting it cascades to both.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE boards (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     owner_id UUID NOT NULL REFERENCES users(id),
///     title VARCHAR(80) NOT NULL,
///     description VARCHAR(255),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use super::card::CardView;
use super::column::Column;
use super::user::UserRef;

/// Maximum board title length
pub const TITLE_MAX_LEN: usize = 80;

/// Maximum board description length
pub const DESCRIPTION_MAX_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Board {
    pub id: Uuid,

    /// Owning user, immutable after creation
    pub owner_id: Uuid,

    pub title: String,

    pub description: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateBoard {
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
}

/// Partial board update; `None` leaves the field untouched
///
/// `description: Some(None)` clears the description.
#[derive(Debug, Clone, Default)]
pub struct UpdateBoard {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
}

impl Board {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }

    /// Applies a partial update, returning the next snapshot
    pub fn with_update(&self, update: &UpdateBoard, now: DateTime<Utc>) -> Self {
        Self {
            title: update.title.clone().unwrap_or_else(|| self.title.clone()),
            description: update
                .description
                .clone()
                .unwrap_or_else(|| self.description.clone()),
            updated_at: now,
            ..self.clone()
        }
    }
}

/// Column in the board listing, with its live card count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSummary {
    #[serde(flatten)]
    pub column: Column,

    pub count: i64,
}

/// Entry of `GET /boards`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSummary {
    #[serde(flatten)]
    pub board: Board,

    pub owner: Option<UserRef>,

    pub columns: Vec<ColumnSummary>,
}

/// Column with its cards, top to bottom
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnWithCards {
    #[serde(flatten)]
    pub column: Column,

    pub cards: Vec<CardView>,
}

/// Full board payload of `GET /boards/{id}`
///
/// Cards appear both nested in their column and as a flat list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardDetail {
    #[serde(flatten)]
    pub board: Board,

    pub owner: Option<UserRef>,

    pub columns: Vec<ColumnWithCards>,

    pub cards: Vec<CardView>,
}

/// Board together with its freshly seeded columns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardWithColumns {
    #[serde(flatten)]
    pub board: Board,

    pub columns: Vec<Column>,
}

const BOARD_COLUMNS: &str = "id, owner_id, title, description, created_at, updated_at";

impl Board {
    pub async fn create(db: impl PgExecutor<'_>, data: CreateBoard) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Board>(&format!(
            "INSERT INTO boards (owner_id, title, description) VALUES ($1, $2, $3) RETURNING {}",
            BOARD_COLUMNS
        ))
        .bind(data.owner_id)
        .bind(data.title)
        .bind(data.description)
        .fetch_one(db)
        .await
    }

    pub async fn find_by_id(db: impl PgExecutor<'_>, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Board>(&format!("SELECT {} FROM boards WHERE id = $1", BOARD_COLUMNS))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Locks the board row for the rest of the transaction
    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Board>(&format!(
            "SELECT {} FROM boards WHERE id = $1 FOR UPDATE",
            BOARD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    /// Lists every board, newest first
    pub async fn list(db: impl PgExecutor<'_>) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Board>(&format!(
            "SELECT {} FROM boards ORDER BY created_at DESC, id",
            BOARD_COLUMNS
        ))
        .fetch_all(db)
        .await
    }

    /// Persists a snapshot produced by [`Board::with_update`]
    pub async fn save(db: impl PgExecutor<'_>, board: &Board) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Board>(&format!(
            r#"
            UPDATE boards
            SET title = $2, description = $3, updated_at = $4
            WHERE id = $1
            RETURNING {}
            "#,
            BOARD_COLUMNS
        ))
        .bind(board.id)
        .bind(&board.title)
        .bind(&board.description)
        .bind(board.updated_at)
        .fetch_one(db)
        .await
    }

    /// Deletes the board; columns and cards go with it via `ON DELETE CASCADE`
    pub async fn delete(db: impl PgExecutor<'_>, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM boards WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
