/// Board, column and card operations
///
/// [`Kanban`] is the entry point for every board mutation and every board
/// read model. It validates input, runs the ownership checks, delegates the
/// atomic part of each operation to the [`Store`], and assembles the nested
/// payloads returned by the API.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use kanban_shared::kanban::rules::Placement;
/// use kanban_shared::kanban::service::{Kanban, NewBoard, NewCard};
/// use kanban_shared::models::user::CreateUser;
/// use kanban_shared::store::{memory::MemoryStore, Store};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
/// let kanban = Kanban::new(store.clone());
///
/// let ada = store.create_user(CreateUser {
///     name: "Ada".to_string(),
///     email: "ada@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
/// }).await?;
///
/// let board = kanban.create_board(&ada, NewBoard { title: "Launch".into(), description: None }).await?;
/// let (todo, doing) = (board.columns[0].id, board.columns[1].id);
///
/// let card = kanban.create_card(&ada, board.board.id, NewCard {
///     column_id: todo,
///     title: "Write announcement".into(),
///     description: None,
/// }).await?;
///
/// let moved = kanban.move_card(&ada, card.id, doing, Placement::Top).await?;
/// assert_eq!(moved.column_id, doing);
/// # Ok(())
/// # }
/// ```

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::rules::{self, Placement, DEFAULT_COLUMNS};
use crate::auth::authorization::{authorize_board, BoardTarget};
use crate::error::{Entity, KanbanError, KanbanResult};
use crate::models::board::{
    Board, BoardDetail, BoardSummary, BoardWithColumns, ColumnSummary, ColumnWithCards, CreateBoard,
    UpdateBoard,
};
use crate::models::card::{Card, CardDetail, CardView, ColumnRef, CreateCard, UpdateCard};
use crate::models::column::{Column, CreateColumn, UpdateColumn};
use crate::models::history::{HistoryEntry, HistoryView};
use crate::models::user::{User, UserRef};
use crate::store::Store;

/// Input for [`Kanban::create_board`]
#[derive(Debug, Clone)]
pub struct NewBoard {
    pub title: String,
    pub description: Option<String>,
}

/// Input for [`Kanban::create_card`]
#[derive(Debug, Clone)]
pub struct NewCard {
    pub column_id: Uuid,
    pub title: String,
    pub description: Option<String>,
}

/// Logs a failed operation at the level its cause deserves
fn log_failure(operation: &'static str, err: &KanbanError) {
    match err {
        KanbanError::Database(e) => error!(operation, error = %e, "Storage failure"),
        KanbanError::WipLimitReached { .. }
        | KanbanError::SameColumnMove { .. }
        | KanbanError::Forbidden => warn!(operation, error = %err, "Operation rejected"),
        _ => {}
    }
}

#[derive(Clone)]
pub struct Kanban {
    store: Arc<dyn Store>,
}

impl Kanban {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    async fn user_refs(&self, ids: impl IntoIterator<Item = Uuid>) -> KanbanResult<HashMap<Uuid, UserRef>> {
        let mut ids: Vec<Uuid> = ids.into_iter().collect();
        ids.sort();
        ids.dedup();

        Ok(self
            .store
            .find_users(&ids)
            .await?
            .iter()
            .map(|u| (u.id, UserRef::from(u)))
            .collect())
    }

    async fn require_board(&self, id: Uuid) -> KanbanResult<Board> {
        self.store
            .find_board(id)
            .await?
            .ok_or_else(|| KanbanError::not_found(Entity::Board, id))
    }

    // ---- read models ----

    /// Every board, newest first, with owner and per-column card counts
    pub async fn list_boards(&self) -> KanbanResult<Vec<BoardSummary>> {
        let boards = self.store.list_boards().await?;
        let ids: Vec<Uuid> = boards.iter().map(|b| b.id).collect();

        let columns = self.store.columns_for_boards(&ids).await?;
        let counts: HashMap<Uuid, i64> = self.store.card_counts(&ids).await?.into_iter().collect();
        let owners = self.user_refs(boards.iter().map(|b| b.owner_id)).await?;

        let mut by_board: HashMap<Uuid, Vec<ColumnSummary>> = HashMap::new();
        for column in columns {
            let count = counts.get(&column.id).copied().unwrap_or(0);
            by_board
                .entry(column.board_id)
                .or_default()
                .push(ColumnSummary { column, count });
        }

        Ok(boards
            .into_iter()
            .map(|board| BoardSummary {
                owner: owners.get(&board.owner_id).cloned(),
                columns: by_board.remove(&board.id).unwrap_or_default(),
                board,
            })
            .collect())
    }

    /// One board with its columns in order and their cards top to bottom
    pub async fn board_detail(&self, id: Uuid) -> KanbanResult<BoardDetail> {
        let board = self.require_board(id).await?;
        let columns = self.store.columns_for_boards(&[id]).await?;
        let cards = self.store.cards_for_boards(&[id]).await?;

        let users = self
            .user_refs(cards.iter().map(|c| c.created_by).chain([board.owner_id]))
            .await?;

        let mut by_column: HashMap<Uuid, Vec<CardView>> = HashMap::new();
        for card in cards {
            by_column.entry(card.column_id).or_default().push(CardView {
                creator: users.get(&card.created_by).cloned(),
                card,
            });
        }

        let columns: Vec<ColumnWithCards> = columns
            .into_iter()
            .map(|column| {
                let mut cards = by_column.remove(&column.id).unwrap_or_default();
                cards.sort_by_key(|c| c.card.position);
                ColumnWithCards { column, cards }
            })
            .collect();

        let flat = columns.iter().flat_map(|c| c.cards.iter().cloned()).collect();

        Ok(BoardDetail {
            owner: users.get(&board.owner_id).cloned(),
            board,
            columns,
            cards: flat,
        })
    }

    pub async fn card_detail(&self, id: Uuid) -> KanbanResult<CardDetail> {
        let card = self
            .store
            .find_card(id)
            .await?
            .ok_or_else(|| KanbanError::not_found(Entity::Card, id))?;

        let column = self.store.find_column(card.column_id).await?.map(|c| ColumnRef {
            id: c.id,
            name: c.name,
        });
        let creator = self
            .store
            .find_user(card.created_by)
            .await?
            .map(|u| UserRef::from(&u));

        Ok(CardDetail {
            card,
            creator,
            column,
        })
    }

    // ---- boards ----

    /// Creates a board owned by `owner`, seeded with "To Do", "Doing" and "Done"
    pub async fn create_board(&self, owner: &User, input: NewBoard) -> KanbanResult<BoardWithColumns> {
        rules::validate_board_title(&input.title)?;
        rules::validate_board_description(input.description.as_deref())?;

        let created = self
            .store
            .create_board(
                CreateBoard {
                    owner_id: owner.id,
                    title: input.title,
                    description: input.description,
                },
                &DEFAULT_COLUMNS,
            )
            .await
            .inspect_err(|e| log_failure("create_board", e))?;

        info!(board_id = %created.board.id, owner_id = %owner.id, "Board created");
        Ok(created)
    }

    /// Resolves `target` and checks that `actor` owns it
    ///
    /// Owner-only operations call this themselves; it is public for callers
    /// that must reject a non-owner before reading the rest of the request.
    pub async fn authorize(&self, actor: &User, target: BoardTarget) -> KanbanResult<Board> {
        authorize_board(self.store.as_ref(), actor, target)
            .await
            .inspect_err(|e| log_failure("authorize", e))
    }

    pub async fn update_board(&self, actor: &User, id: Uuid, update: UpdateBoard) -> KanbanResult<Board> {
        authorize_board(self.store.as_ref(), actor, BoardTarget::ById(id))
            .await
            .inspect_err(|e| log_failure("update_board", e))?;

        if let Some(title) = &update.title {
            rules::validate_board_title(title)?;
        }
        if let Some(description) = &update.description {
            rules::validate_board_description(description.as_deref())?;
        }

        let board = self
            .store
            .update_board(id, update)
            .await
            .inspect_err(|e| log_failure("update_board", e))?;

        info!(board_id = %id, user_id = %actor.id, "Board updated");
        Ok(board)
    }

    /// Deletes a board with its columns and cards; the cards' history is kept
    pub async fn delete_board(&self, actor: &User, id: Uuid) -> KanbanResult<()> {
        authorize_board(self.store.as_ref(), actor, BoardTarget::ById(id))
            .await
            .inspect_err(|e| log_failure("delete_board", e))?;

        self.store
            .delete_board(id, actor.id)
            .await
            .inspect_err(|e| log_failure("delete_board", e))?;

        info!(board_id = %id, user_id = %actor.id, "Board deleted");
        Ok(())
    }

    // ---- columns ----

    /// Appends a column to the right of the board's existing columns
    pub async fn add_column(&self, actor: &User, board_id: Uuid, data: CreateColumn) -> KanbanResult<Column> {
        authorize_board(self.store.as_ref(), actor, BoardTarget::ById(board_id))
            .await
            .inspect_err(|e| log_failure("add_column", e))?;

        rules::validate_column_name(&data.name)?;
        rules::validate_wip_limit(data.wip_limit)?;

        let column = self
            .store
            .add_column(board_id, data)
            .await
            .inspect_err(|e| log_failure("add_column", e))?;

        info!(board_id = %board_id, column_id = %column.id, order = column.order, "Column added");
        Ok(column)
    }

    /// Renames a column or changes its WIP limit
    ///
    /// A limit below the current card count is accepted; existing cards stay.
    pub async fn update_column(&self, actor: &User, id: Uuid, update: UpdateColumn) -> KanbanResult<Column> {
        authorize_board(self.store.as_ref(), actor, BoardTarget::ViaColumn(id))
            .await
            .inspect_err(|e| log_failure("update_column", e))?;

        if let Some(name) = &update.name {
            rules::validate_column_name(name)?;
        }
        if let Some(wip_limit) = update.wip_limit {
            rules::validate_wip_limit(wip_limit)?;
        }

        let column = self
            .store
            .update_column(id, update)
            .await
            .inspect_err(|e| log_failure("update_column", e))?;

        info!(column_id = %id, wip_limit = column.wip_limit, "Column updated");
        Ok(column)
    }

    /// Deletes a column and every card in it; the cards' history is kept
    pub async fn delete_column(&self, actor: &User, id: Uuid) -> KanbanResult<()> {
        authorize_board(self.store.as_ref(), actor, BoardTarget::ViaColumn(id))
            .await
            .inspect_err(|e| log_failure("delete_column", e))?;

        self.store
            .delete_column(id, actor.id)
            .await
            .inspect_err(|e| log_failure("delete_column", e))?;

        info!(column_id = %id, user_id = %actor.id, "Column deleted");
        Ok(())
    }

    // ---- cards ----

    /// Adds a card to the bottom of a column of `board_id`
    pub async fn create_card(&self, actor: &User, board_id: Uuid, input: NewCard) -> KanbanResult<Card> {
        rules::validate_card_title(&input.title)?;
        self.require_board(board_id).await?;

        let card = self
            .store
            .create_card(CreateCard {
                board_id,
                column_id: input.column_id,
                title: input.title,
                description: input.description,
                created_by: actor.id,
            })
            .await
            .inspect_err(|e| log_failure("create_card", e))?;

        info!(card_id = %card.id, column_id = %card.column_id, position = card.position, "Card created");
        Ok(card)
    }

    pub async fn update_card(&self, actor: &User, id: Uuid, update: UpdateCard) -> KanbanResult<Card> {
        if let Some(title) = &update.title {
            rules::validate_card_title(title)?;
        }

        let card = self
            .store
            .update_card(id, update, actor.id)
            .await
            .inspect_err(|e| log_failure("update_card", e))?;

        info!(card_id = %id, user_id = %actor.id, "Card updated");
        Ok(card)
    }

    /// Moves a card to the top or bottom of another column of its board
    ///
    /// # Errors
    ///
    /// - `SameColumnMove` when the card already sits in `to_column_id`
    /// - `Validation` when the column belongs to another board
    /// - `WipLimitReached` when the target column is full
    pub async fn move_card(
        &self,
        actor: &User,
        id: Uuid,
        to_column_id: Uuid,
        placement: Placement,
    ) -> KanbanResult<Card> {
        let card = self
            .store
            .move_card(id, to_column_id, placement, actor.id)
            .await
            .inspect_err(|e| log_failure("move_card", e))?;

        info!(
            card_id = %id,
            to_column_id = %to_column_id,
            placement = ?placement,
            position = card.position,
            "Card moved"
        );
        Ok(card)
    }

    pub async fn delete_card(&self, actor: &User, id: Uuid) -> KanbanResult<()> {
        self.store
            .delete_card(id, actor.id)
            .await
            .inspect_err(|e| log_failure("delete_card", e))?;

        info!(card_id = %id, user_id = %actor.id, "Card deleted");
        Ok(())
    }

    // ---- history ----

    async fn into_views(&self, entries: Vec<HistoryEntry>) -> KanbanResult<Vec<HistoryView>> {
        let users = self.user_refs(entries.iter().filter_map(|e| e.user_id)).await?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                let by_user = entry.user_id.and_then(|id| users.get(&id).cloned());
                entry.into_view(by_user)
            })
            .collect())
    }

    /// History of one card, oldest first; works after the card was deleted
    pub async fn card_history(&self, card_id: Uuid) -> KanbanResult<Vec<HistoryView>> {
        let entries = self.store.card_history(card_id).await?;

        if entries.is_empty() && self.store.find_card(card_id).await?.is_none() {
            return Err(KanbanError::not_found(Entity::Card, card_id));
        }

        self.into_views(entries).await
    }

    /// History of every card that belonged to the board, oldest first
    pub async fn board_history(&self, board_id: Uuid) -> KanbanResult<Vec<HistoryView>> {
        let entries = self.store.board_history(board_id).await?;

        if entries.is_empty() {
            self.require_board(board_id).await?;
        }

        self.into_views(entries).await
    }
}
