/// Card model and database operations
///
/// A card sits in exactly one column of its board. `position` orders cards
/// within the column (ascending = top to bottom) and is unique per column;
/// gaps are allowed and positions may go negative after moves to the top.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE cards (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     board_id UUID NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
///     column_id UUID NOT NULL REFERENCES columns(id) ON DELETE CASCADE,
///     title VARCHAR(120) NOT NULL,
///     description TEXT,
///     position BIGINT NOT NULL,
///     created_by UUID NOT NULL REFERENCES users(id),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (column_id, position)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use super::user::UserRef;
use crate::kanban::rules::Occupancy;

/// Maximum card title length
pub const TITLE_MAX_LEN: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Card {
    pub id: Uuid,

    /// Always equal to the board of `column_id`
    pub board_id: Uuid,

    pub column_id: Uuid,

    pub title: String,

    pub description: Option<String>,

    pub position: i64,

    /// Creator, immutable
    pub created_by: Uuid,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateCard {
    pub board_id: Uuid,
    pub column_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub created_by: Uuid,
}

/// Partial card update; column and position are only changed by moves
#[derive(Debug, Clone, Default)]
pub struct UpdateCard {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
}

impl Card {
    /// Applies a partial update, returning the next snapshot
    pub fn with_update(&self, update: &UpdateCard, now: DateTime<Utc>) -> Self {
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

/// Card with its creator, as nested in board payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardView {
    #[serde(flatten)]
    pub card: Card,

    pub creator: Option<UserRef>,
}

/// Column reference embedded in card and history payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub id: Uuid,
    pub name: String,
}

/// Payload of `GET /cards/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardDetail {
    #[serde(flatten)]
    pub card: Card,

    pub creator: Option<UserRef>,

    pub column: Option<ColumnRef>,
}

const CARD_COLUMNS: &str =
    "id, board_id, column_id, title, description, position, created_by, created_at, updated_at";

impl Card {
    pub async fn insert(
        db: impl PgExecutor<'_>,
        data: &CreateCard,
        position: i64,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Card>(&format!(
            r#"
            INSERT INTO cards (board_id, column_id, title, description, position, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            CARD_COLUMNS
        ))
        .bind(data.board_id)
        .bind(data.column_id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(position)
        .bind(data.created_by)
        .fetch_one(db)
        .await
    }

    pub async fn find_by_id(db: impl PgExecutor<'_>, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Card>(&format!("SELECT {} FROM cards WHERE id = $1", CARD_COLUMNS))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Locks the card row for the rest of the transaction
    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Card>(&format!(
            "SELECT {} FROM cards WHERE id = $1 FOR UPDATE",
            CARD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    /// Live card count and position bounds of a column
    ///
    /// Callers must hold the column lock for the result to stay accurate.
    pub async fn occupancy(
        db: impl PgExecutor<'_>,
        column_id: Uuid,
    ) -> Result<Occupancy, sqlx::Error> {
        let (count, min_position, max_position): (i64, Option<i64>, Option<i64>) = sqlx::query_as(
            "SELECT COUNT(*), MIN(position), MAX(position) FROM cards WHERE column_id = $1",
        )
        .bind(column_id)
        .fetch_one(db)
        .await?;

        Ok(Occupancy {
            count,
            min_position,
            max_position,
        })
    }

    /// Cards of the given boards, grouped by column, top to bottom
    pub async fn list_for_boards(
        db: impl PgExecutor<'_>,
        board_ids: &[Uuid],
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Card>(&format!(
            "SELECT {} FROM cards WHERE board_id = ANY($1) ORDER BY column_id, position",
            CARD_COLUMNS
        ))
        .bind(board_ids)
        .fetch_all(db)
        .await
    }

    /// Cards of a single column, top to bottom
    pub async fn list_in_column(
        db: impl PgExecutor<'_>,
        column_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Card>(&format!(
            "SELECT {} FROM cards WHERE column_id = $1 ORDER BY position",
            CARD_COLUMNS
        ))
        .bind(column_id)
        .fetch_all(db)
        .await
    }

    /// Cards of a single board, top to bottom within each column
    pub async fn list_in_board(
        db: impl PgExecutor<'_>,
        board_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        Self::list_for_boards(db, &[board_id]).await
    }

    /// Live card count per column for the given boards
    pub async fn counts_by_column(
        db: impl PgExecutor<'_>,
        board_ids: &[Uuid],
    ) -> Result<Vec<(Uuid, i64)>, sqlx::Error> {
        sqlx::query_as(
            "SELECT column_id, COUNT(*) FROM cards WHERE board_id = ANY($1) GROUP BY column_id",
        )
        .bind(board_ids)
        .fetch_all(db)
        .await
    }

    /// Persists title, description and timestamp of a snapshot
    pub async fn save(db: impl PgExecutor<'_>, card: &Card) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Card>(&format!(
            r#"
            UPDATE cards
            SET title = $2, description = $3, updated_at = $4
            WHERE id = $1
            RETURNING {}
            "#,
            CARD_COLUMNS
        ))
        .bind(card.id)
        .bind(&card.title)
        .bind(&card.description)
        .bind(card.updated_at)
        .fetch_one(db)
        .await
    }

    /// Re-homes a card in a single statement so no intermediate state exists
    pub async fn relocate(
        db: impl PgExecutor<'_>,
        id: Uuid,
        column_id: Uuid,
        position: i64,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Card>(&format!(
            r#"
            UPDATE cards
            SET column_id = $2, position = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            CARD_COLUMNS
        ))
        .bind(id)
        .bind(column_id)
        .bind(position)
        .fetch_one(db)
        .await
    }

    pub async fn delete(db: impl PgExecutor<'_>, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cards WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
