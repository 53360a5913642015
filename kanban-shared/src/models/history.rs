/// Card history ledger
///
/// Append-only record of every card mutation. Entries are never updated or
/// deleted and carry snapshots of the card title and column names, so the
/// ledger stays readable after the card, its columns or its board are gone.
/// No foreign keys point at cards, columns or boards.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE history_action AS ENUM ('created', 'updated', 'moved', 'deleted');
///
/// CREATE TABLE card_history (
///     id BIGSERIAL PRIMARY KEY,
///     card_id UUID NOT NULL,
///     board_id UUID NOT NULL,
///     action history_action NOT NULL,
///     card_title VARCHAR(120) NOT NULL,
///     from_column_id UUID,
///     from_column_name VARCHAR(40),
///     to_column_id UUID,
///     to_column_name VARCHAR(40),
///     user_id UUID,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// `id` is the ordering key: entries are always returned oldest first by id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

use super::card::{Card, ColumnRef};
use super::column::Column;
use super::user::UserRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "history_action", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Created,
    Updated,
    Moved,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HistoryEntry {
    pub id: i64,
    pub card_id: Uuid,
    pub board_id: Uuid,
    pub action: HistoryAction,
    pub card_title: String,
    pub from_column_id: Option<Uuid>,
    pub from_column_name: Option<String>,
    pub to_column_id: Option<Uuid>,
    pub to_column_name: Option<String>,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Entry about to be appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub card_id: Uuid,
    pub board_id: Uuid,
    pub action: HistoryAction,
    pub card_title: String,
    pub from_column: Option<ColumnRef>,
    pub to_column: Option<ColumnRef>,
    pub user_id: Option<Uuid>,
}

fn column_ref(column: &Column) -> ColumnRef {
    ColumnRef {
        id: column.id,
        name: column.name.clone(),
    }
}

impl NewHistoryEntry {
    pub fn created(card: &Card, column: &Column, actor: Uuid) -> Self {
        Self {
            card_id: card.id,
            board_id: card.board_id,
            action: HistoryAction::Created,
            card_title: card.title.clone(),
            from_column: None,
            to_column: Some(column_ref(column)),
            user_id: Some(actor),
        }
    }

    pub fn updated(card: &Card, actor: Uuid) -> Self {
        Self {
            card_id: card.id,
            board_id: card.board_id,
            action: HistoryAction::Updated,
            card_title: card.title.clone(),
            from_column: None,
            to_column: None,
            user_id: Some(actor),
        }
    }

    pub fn moved(card: &Card, from: &Column, to: &Column, actor: Uuid) -> Self {
        Self {
            card_id: card.id,
            board_id: card.board_id,
            action: HistoryAction::Moved,
            card_title: card.title.clone(),
            from_column: Some(column_ref(from)),
            to_column: Some(column_ref(to)),
            user_id: Some(actor),
        }
    }

    /// `column` is the column the card was in when it was removed
    pub fn deleted(card: &Card, column: Option<&Column>, actor: Uuid) -> Self {
        Self {
            card_id: card.id,
            board_id: card.board_id,
            action: HistoryAction::Deleted,
            card_title: card.title.clone(),
            from_column: column.map(column_ref),
            to_column: None,
            user_id: Some(actor),
        }
    }
}

/// History entry as returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryView {
    pub id: i64,
    pub card_id: Uuid,
    pub board_id: Uuid,
    #[serde(rename = "type")]
    pub action: HistoryAction,
    pub card_title: String,
    pub from_column: Option<ColumnRef>,
    pub to_column: Option<ColumnRef>,
    pub by_user: Option<UserRef>,
    pub at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn from_column(&self) -> Option<ColumnRef> {
        self.from_column_id.map(|id| ColumnRef {
            id,
            name: self.from_column_name.clone().unwrap_or_default(),
        })
    }

    pub fn to_column(&self) -> Option<ColumnRef> {
        self.to_column_id.map(|id| ColumnRef {
            id,
            name: self.to_column_name.clone().unwrap_or_default(),
        })
    }

    pub fn into_view(self, by_user: Option<UserRef>) -> HistoryView {
        HistoryView {
            from_column: self.from_column(),
            to_column: self.to_column(),
            id: self.id,
            card_id: self.card_id,
            board_id: self.board_id,
            action: self.action,
            card_title: self.card_title,
            by_user,
            at: self.created_at,
        }
    }
}

const HISTORY_COLUMNS: &str = "id, card_id, board_id, action, card_title, from_column_id, \
    from_column_name, to_column_id, to_column_name, user_id, created_at";

impl HistoryEntry {
    pub async fn append(db: impl PgExecutor<'_>, entry: &NewHistoryEntry) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, HistoryEntry>(&format!(
            r#"
            INSERT INTO card_history
                (card_id, board_id, action, card_title, from_column_id, from_column_name,
                 to_column_id, to_column_name, user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            HISTORY_COLUMNS
        ))
        .bind(entry.card_id)
        .bind(entry.board_id)
        .bind(entry.action)
        .bind(&entry.card_title)
        .bind(entry.from_column.as_ref().map(|c| c.id))
        .bind(entry.from_column.as_ref().map(|c| c.name.clone()))
        .bind(entry.to_column.as_ref().map(|c| c.id))
        .bind(entry.to_column.as_ref().map(|c| c.name.clone()))
        .bind(entry.user_id)
        .fetch_one(db)
        .await
    }

    /// Every entry of one card, oldest first
    pub async fn for_card(db: impl PgExecutor<'_>, card_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, HistoryEntry>(&format!(
            "SELECT {} FROM card_history WHERE card_id = $1 ORDER BY id",
            HISTORY_COLUMNS
        ))
        .bind(card_id)
        .fetch_all(db)
        .await
    }

    /// Every entry of every card that belonged to the board, oldest first
    pub async fn for_board(db: impl PgExecutor<'_>, board_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, HistoryEntry>(&format!(
            "SELECT {} FROM card_history WHERE board_id = $1 ORDER BY id",
            HISTORY_COLUMNS
        ))
        .bind(board_id)
        .fetch_all(db)
        .await
    }
}
