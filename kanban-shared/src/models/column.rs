/// Column model and database operations
///
/// Columns belong to one board, are displayed left to right by `order`, and
/// cap how many cards they accept through `wip_limit`.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE columns (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     board_id UUID NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
///     name VARCHAR(40) NOT NULL,
///     wip_limit INTEGER NOT NULL CHECK (wip_limit >= 0),
///     "order" INTEGER NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (board_id, "order")
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

/// Maximum column name length
pub const NAME_MAX_LEN: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Column {
    pub id: Uuid,

    pub board_id: Uuid,

    pub name: String,

    /// Maximum live cards; 0 accepts none
    pub wip_limit: i32,

    /// Left-to-right position, unique within the board
    pub order: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateColumn {
    pub name: String,
    pub wip_limit: i32,
}

/// Partial column update
///
/// Lowering `wip_limit` below the current card count is accepted and evicts
/// nothing; the column simply refuses new cards until it drains.
#[derive(Debug, Clone, Default)]
pub struct UpdateColumn {
    pub name: Option<String>,
    pub wip_limit: Option<i32>,
}

impl Column {
    /// Applies a partial update, returning the next snapshot
    pub fn with_update(&self, update: &UpdateColumn, now: DateTime<Utc>) -> Self {
        Self {
            name: update.name.clone().unwrap_or_else(|| self.name.clone()),
            wip_limit: update.wip_limit.unwrap_or(self.wip_limit),
            updated_at: now,
            ..self.clone()
        }
    }
}

const COLUMN_COLUMNS: &str = r#"id, board_id, name, wip_limit, "order", created_at, updated_at"#;

impl Column {
    pub async fn insert(
        db: impl PgExecutor<'_>,
        board_id: Uuid,
        name: &str,
        wip_limit: i32,
        order: i32,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Column>(&format!(
            r#"
            INSERT INTO columns (board_id, name, wip_limit, "order")
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            COLUMN_COLUMNS
        ))
        .bind(board_id)
        .bind(name)
        .bind(wip_limit)
        .bind(order)
        .fetch_one(db)
        .await
    }

    pub async fn find_by_id(db: impl PgExecutor<'_>, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Column>(&format!("SELECT {} FROM columns WHERE id = $1", COLUMN_COLUMNS))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Locks the given column rows in ascending id order
    ///
    /// Every writer that needs more than one column goes through here, so two
    /// concurrent moves between the same pair of columns always acquire their
    /// locks in the same order.
    pub async fn lock_many(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Column>(&format!(
            "SELECT {} FROM columns WHERE id = ANY($1) ORDER BY id FOR UPDATE",
            COLUMN_COLUMNS
        ))
        .bind(ids)
        .fetch_all(conn)
        .await
    }

    /// Columns of the given boards, each board's columns in display order
    pub async fn list_for_boards(
        db: impl PgExecutor<'_>,
        board_ids: &[Uuid],
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Column>(&format!(
            r#"SELECT {} FROM columns WHERE board_id = ANY($1) ORDER BY board_id, "order""#,
            COLUMN_COLUMNS
        ))
        .bind(board_ids)
        .fetch_all(db)
        .await
    }

    /// Every `order` value currently used in a board
    pub async fn orders_in_board(
        db: impl PgExecutor<'_>,
        board_id: Uuid,
    ) -> Result<Vec<i32>, sqlx::Error> {
        sqlx::query_scalar(r#"SELECT "order" FROM columns WHERE board_id = $1"#)
            .bind(board_id)
            .fetch_all(db)
            .await
    }

    pub async fn save(db: impl PgExecutor<'_>, column: &Column) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Column>(&format!(
            r#"
            UPDATE columns
            SET name = $2, wip_limit = $3, updated_at = $4
            WHERE id = $1
            RETURNING {}
            "#,
            COLUMN_COLUMNS
        ))
        .bind(column.id)
        .bind(&column.name)
        .bind(column.wip_limit)
        .bind(column.updated_at)
        .fetch_one(db)
        .await
    }

    /// Deletes the column; its cards go with it via `ON DELETE CASCADE`
    pub async fn delete(db: impl PgExecutor<'_>, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM columns WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_update_keeps_order_and_board() {
        let column = Column {
            id: Uuid::new_v4(),
            board_id: Uuid::new_v4(),
            name: "Doing".to_string(),
            wip_limit: 3,
            order: 2,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let updated = column.with_update(
            &UpdateColumn {
                name: None,
                wip_limit: Some(1),
            },
            Utc::now(),
        );

        assert_eq!(updated.name, "Doing");
        assert_eq!(updated.wip_limit, 1);
        assert_eq!(updated.order, 2);
        assert_eq!(updated.board_id, column.board_id);
    }
}
