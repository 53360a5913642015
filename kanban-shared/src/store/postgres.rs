/// PostgreSQL store
///
/// Every mutation runs in its own transaction:
///
/// - card creation locks the target column row (`SELECT ... FOR UPDATE`)
///   before counting its cards, so two concurrent creates cannot both pass the
///   WIP check
/// - moves lock the card, then the source and target column rows in
///   ascending id order
/// - column creation locks the board row before computing `max(order) + 1`
/// - column and board deletion lock what they remove and log a `deleted`
///   entry for each card before the cascade
///
/// Serialization failures and deadlocks are replayed through
/// [`with_retry`]. The `(board_id, "order")` and `(column_id, position)`
/// unique constraints back the locking up.
///
/// # Example
///
/// ```no_run
/// use kanban_shared::db::pool::{create_pool, DatabaseConfig};
/// use kanban_shared::store::{postgres::PgStore, Store};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig {
///     url: std::env::var("DATABASE_URL")?,
///     ..Default::default()
/// })
/// .await?;
///
/// let store = PgStore::new(pool);
/// store.ping().await?;
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{with_retry, RetryPolicy, Store};
use crate::db::pool;
use crate::error::{Entity, KanbanError, KanbanResult};
use crate::kanban::rules::{self, ColumnSeed, Placement};
use crate::models::access_token::{AccessToken, NewAccessToken, TokenRotation};
use crate::models::board::{Board, BoardWithColumns, CreateBoard, UpdateBoard};
use crate::models::card::{Card, CreateCard, UpdateCard};
use crate::models::column::{Column, CreateColumn, UpdateColumn};
use crate::models::history::{HistoryEntry, NewHistoryEntry};
use crate::models::user::{CreateUser, User};

/// Unique index guarding case-insensitive email uniqueness
const USERS_EMAIL_KEY: &str = "users_email_key";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_retry_policy(pool, RetryPolicy::default())
    }

    pub fn with_retry_policy(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn create_board_tx(
        &self,
        data: &CreateBoard,
        seed: &[ColumnSeed],
    ) -> KanbanResult<BoardWithColumns> {
        let mut tx = self.pool.begin().await?;

        let board = Board::create(&mut *tx, data.clone()).await?;

        let mut columns = Vec::with_capacity(seed.len());
        for s in seed {
            columns.push(Column::insert(&mut *tx, board.id, s.name, s.wip_limit, s.order).await?);
        }

        tx.commit().await?;
        Ok(BoardWithColumns { board, columns })
    }

    async fn update_board_tx(&self, id: Uuid, update: &UpdateBoard) -> KanbanResult<Board> {
        let mut tx = self.pool.begin().await?;

        let current = Board::lock(&mut tx, id)
            .await?
            .ok_or_else(|| KanbanError::not_found(Entity::Board, id))?;
        let board = Board::save(&mut *tx, &current.with_update(update, Utc::now())).await?;

        tx.commit().await?;
        Ok(board)
    }

    async fn delete_board_tx(&self, id: Uuid, actor: Uuid) -> KanbanResult<()> {
        let mut tx = self.pool.begin().await?;

        Board::lock(&mut tx, id)
            .await?
            .ok_or_else(|| KanbanError::not_found(Entity::Board, id))?;

        let column_ids: Vec<Uuid> = Column::list_for_boards(&mut *tx, &[id])
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        let columns = Column::lock_many(&mut tx, &column_ids).await?;

        for card in Card::list_in_board(&mut *tx, id).await? {
            let column = columns.iter().find(|c| c.id == card.column_id);
            HistoryEntry::append(&mut *tx, &NewHistoryEntry::deleted(&card, column, actor)).await?;
        }

        Board::delete(&mut *tx, id).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn add_column_tx(&self, board_id: Uuid, data: &CreateColumn) -> KanbanResult<Column> {
        let mut tx = self.pool.begin().await?;

        Board::lock(&mut tx, board_id)
            .await?
            .ok_or_else(|| KanbanError::not_found(Entity::Board, board_id))?;

        let order = rules::next_order(Column::orders_in_board(&mut *tx, board_id).await?);
        let column = Column::insert(&mut *tx, board_id, &data.name, data.wip_limit, order).await?;

        tx.commit().await?;
        Ok(column)
    }

    async fn update_column_tx(&self, id: Uuid, update: &UpdateColumn) -> KanbanResult<Column> {
        let mut tx = self.pool.begin().await?;

        let current = Column::lock_many(&mut tx, &[id])
            .await?
            .pop()
            .ok_or_else(|| KanbanError::not_found(Entity::Column, id))?;
        let column = Column::save(&mut *tx, &current.with_update(update, Utc::now())).await?;

        tx.commit().await?;
        Ok(column)
    }

    async fn delete_column_tx(&self, id: Uuid, actor: Uuid) -> KanbanResult<()> {
        let mut tx = self.pool.begin().await?;

        let column = Column::lock_many(&mut tx, &[id])
            .await?
            .pop()
            .ok_or_else(|| KanbanError::not_found(Entity::Column, id))?;

        for card in Card::list_in_column(&mut *tx, id).await? {
            HistoryEntry::append(&mut *tx, &NewHistoryEntry::deleted(&card, Some(&column), actor))
                .await?;
        }

        Column::delete(&mut *tx, id).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn create_card_tx(&self, data: &CreateCard) -> KanbanResult<Card> {
        let mut tx = self.pool.begin().await?;

        let column = Column::lock_many(&mut tx, &[data.column_id])
            .await?
            .pop()
            .ok_or_else(|| KanbanError::not_found(Entity::Column, data.column_id))?;
        rules::ensure_column_in_board(&column, data.board_id)?;

        let occupancy = Card::occupancy(&mut *tx, column.id).await?;
        rules::ensure_capacity(&column, &occupancy)?;

        let position = rules::position_for(Placement::Bottom, &occupancy);
        let card = Card::insert(&mut *tx, data, position).await?;
        HistoryEntry::append(
            &mut *tx,
            &NewHistoryEntry::created(&card, &column, data.created_by),
        )
        .await?;

        tx.commit().await?;
        Ok(card)
    }

    async fn update_card_tx(&self, id: Uuid, update: &UpdateCard, actor: Uuid) -> KanbanResult<Card> {
        let mut tx = self.pool.begin().await?;

        let current = Card::lock(&mut tx, id)
            .await?
            .ok_or_else(|| KanbanError::not_found(Entity::Card, id))?;
        let card = Card::save(&mut *tx, &current.with_update(update, Utc::now())).await?;
        HistoryEntry::append(&mut *tx, &NewHistoryEntry::updated(&card, actor)).await?;

        tx.commit().await?;
        Ok(card)
    }

    async fn move_card_tx(
        &self,
        id: Uuid,
        to_column_id: Uuid,
        placement: Placement,
        actor: Uuid,
    ) -> KanbanResult<Card> {
        let mut tx = self.pool.begin().await?;

        let card = Card::lock(&mut tx, id)
            .await?
            .ok_or_else(|| KanbanError::not_found(Entity::Card, id))?;

        let mut column_ids = vec![card.column_id, to_column_id];
        column_ids.sort();
        column_ids.dedup();
        let columns = Column::lock_many(&mut tx, &column_ids).await?;

        let target = columns
            .iter()
            .find(|c| c.id == to_column_id)
            .cloned()
            .ok_or_else(|| KanbanError::not_found(Entity::Column, to_column_id))?;
        let source = columns
            .iter()
            .find(|c| c.id == card.column_id)
            .cloned()
            .ok_or_else(|| KanbanError::not_found(Entity::Column, card.column_id))?;

        rules::check_move(&card, &target)?;

        let occupancy = Card::occupancy(&mut *tx, target.id).await?;
        rules::ensure_capacity(&target, &occupancy)?;

        let position = rules::position_for(placement, &occupancy);
        let moved = Card::relocate(&mut *tx, id, target.id, position).await?;
        HistoryEntry::append(
            &mut *tx,
            &NewHistoryEntry::moved(&moved, &source, &target, actor),
        )
        .await?;

        tx.commit().await?;
        Ok(moved)
    }

    async fn delete_card_tx(&self, id: Uuid, actor: Uuid) -> KanbanResult<()> {
        let mut tx = self.pool.begin().await?;

        let card = Card::lock(&mut tx, id)
            .await?
            .ok_or_else(|| KanbanError::not_found(Entity::Card, id))?;
        let column = Column::find_by_id(&mut *tx, card.column_id).await?;

        HistoryEntry::append(
            &mut *tx,
            &NewHistoryEntry::deleted(&card, column.as_ref(), actor),
        )
        .await?;
        Card::delete(&mut *tx, id).await?;

        tx.commit().await?;
        Ok(())
    }
}

fn is_email_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint() == Some(USERS_EMAIL_KEY),
        _ => false,
    }
}

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> KanbanResult<()> {
        pool::health_check(&self.pool).await?;
        Ok(())
    }

    async fn create_user(&self, data: CreateUser) -> KanbanResult<User> {
        User::create(&self.pool, data).await.map_err(|e| {
            if is_email_conflict(&e) {
                KanbanError::EmailTaken
            } else {
                KanbanError::Database(e)
            }
        })
    }

    async fn find_user(&self, id: Uuid) -> KanbanResult<Option<User>> {
        Ok(User::find_by_id(&self.pool, id).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> KanbanResult<Option<User>> {
        Ok(User::find_by_email(&self.pool, email).await?)
    }

    async fn find_users(&self, ids: &[Uuid]) -> KanbanResult<Vec<User>> {
        Ok(User::find_many(&self.pool, ids).await?)
    }

    async fn insert_token(&self, token: NewAccessToken) -> KanbanResult<AccessToken> {
        Ok(AccessToken::insert(&self.pool, &token).await?)
    }

    async fn touch_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> KanbanResult<Option<AccessToken>> {
        Ok(AccessToken::touch(&self.pool, token_hash, now).await?)
    }

    async fn rotate_token(
        &self,
        refresh_token_hash: &str,
        now: DateTime<Utc>,
        rotation: TokenRotation,
    ) -> KanbanResult<Option<AccessToken>> {
        Ok(AccessToken::rotate(&self.pool, refresh_token_hash, now, &rotation).await?)
    }

    async fn delete_token(&self, token_hash: &str) -> KanbanResult<bool> {
        Ok(AccessToken::delete_by_hash(&self.pool, token_hash).await?)
    }

    async fn prune_tokens(&self, now: DateTime<Utc>) -> KanbanResult<u64> {
        Ok(AccessToken::delete_expired(&self.pool, now).await?)
    }

    async fn create_board(
        &self,
        data: CreateBoard,
        seed: &[ColumnSeed],
    ) -> KanbanResult<BoardWithColumns> {
        with_retry(&self.retry, "create_board", || self.create_board_tx(&data, seed)).await
    }

    async fn find_board(&self, id: Uuid) -> KanbanResult<Option<Board>> {
        Ok(Board::find_by_id(&self.pool, id).await?)
    }

    async fn list_boards(&self) -> KanbanResult<Vec<Board>> {
        Ok(Board::list(&self.pool).await?)
    }

    async fn update_board(&self, id: Uuid, update: UpdateBoard) -> KanbanResult<Board> {
        with_retry(&self.retry, "update_board", || self.update_board_tx(id, &update)).await
    }

    async fn delete_board(&self, id: Uuid, actor: Uuid) -> KanbanResult<()> {
        with_retry(&self.retry, "delete_board", || self.delete_board_tx(id, actor)).await
    }

    async fn add_column(&self, board_id: Uuid, data: CreateColumn) -> KanbanResult<Column> {
        with_retry(&self.retry, "add_column", || self.add_column_tx(board_id, &data)).await
    }

    async fn find_column(&self, id: Uuid) -> KanbanResult<Option<Column>> {
        Ok(Column::find_by_id(&self.pool, id).await?)
    }

    async fn columns_for_boards(&self, board_ids: &[Uuid]) -> KanbanResult<Vec<Column>> {
        Ok(Column::list_for_boards(&self.pool, board_ids).await?)
    }

    async fn update_column(&self, id: Uuid, update: UpdateColumn) -> KanbanResult<Column> {
        with_retry(&self.retry, "update_column", || self.update_column_tx(id, &update)).await
    }

    async fn delete_column(&self, id: Uuid, actor: Uuid) -> KanbanResult<()> {
        with_retry(&self.retry, "delete_column", || self.delete_column_tx(id, actor)).await
    }

    async fn create_card(&self, data: CreateCard) -> KanbanResult<Card> {
        with_retry(&self.retry, "create_card", || self.create_card_tx(&data)).await
    }

    async fn find_card(&self, id: Uuid) -> KanbanResult<Option<Card>> {
        Ok(Card::find_by_id(&self.pool, id).await?)
    }

    async fn cards_for_boards(&self, board_ids: &[Uuid]) -> KanbanResult<Vec<Card>> {
        Ok(Card::list_for_boards(&self.pool, board_ids).await?)
    }

    async fn card_counts(&self, board_ids: &[Uuid]) -> KanbanResult<Vec<(Uuid, i64)>> {
        Ok(Card::counts_by_column(&self.pool, board_ids).await?)
    }

    async fn update_card(&self, id: Uuid, update: UpdateCard, actor: Uuid) -> KanbanResult<Card> {
        with_retry(&self.retry, "update_card", || self.update_card_tx(id, &update, actor)).await
    }

    async fn move_card(
        &self,
        id: Uuid,
        to_column_id: Uuid,
        placement: Placement,
        actor: Uuid,
    ) -> KanbanResult<Card> {
        with_retry(&self.retry, "move_card", || {
            self.move_card_tx(id, to_column_id, placement, actor)
        })
        .await
    }

    async fn delete_card(&self, id: Uuid, actor: Uuid) -> KanbanResult<()> {
        with_retry(&self.retry, "delete_card", || self.delete_card_tx(id, actor)).await
    }

    async fn card_history(&self, card_id: Uuid) -> KanbanResult<Vec<HistoryEntry>> {
        Ok(HistoryEntry::for_card(&self.pool, card_id).await?)
    }

    async fn board_history(&self, board_id: Uuid) -> KanbanResult<Vec<HistoryEntry>> {
        Ok(HistoryEntry::for_board(&self.pool, board_id).await?)
    }
}
