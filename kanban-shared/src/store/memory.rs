/// In-memory store
///
/// All state sits behind one `tokio::sync::RwLock`. Every mutation takes the
/// write lock for its whole read-decide-write sequence, so mutations are
/// linearised exactly like the row-locked transactions of the PostgreSQL
/// store, and readers never observe a half-applied change.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::Store;
use crate::error::{Entity, KanbanError, KanbanResult};
use crate::kanban::rules::{self, ColumnSeed, Occupancy, Placement};
use crate::models::access_token::{AccessToken, NewAccessToken, TokenRotation};
use crate::models::board::{Board, BoardWithColumns, CreateBoard, UpdateBoard};
use crate::models::card::{Card, CreateCard, UpdateCard};
use crate::models::column::{Column, CreateColumn, UpdateColumn};
use crate::models::history::{HistoryEntry, NewHistoryEntry};
use crate::models::user::{CreateUser, User};

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    tokens: HashMap<Uuid, AccessToken>,
    boards: HashMap<Uuid, Board>,
    columns: HashMap<Uuid, Column>,
    cards: HashMap<Uuid, Card>,
    history: Vec<HistoryEntry>,
}

impl MemoryState {
    fn append_history(&mut self, entry: NewHistoryEntry) {
        let id = self.history.len() as i64 + 1;
        self.history.push(HistoryEntry {
            id,
            card_id: entry.card_id,
            board_id: entry.board_id,
            action: entry.action,
            card_title: entry.card_title,
            from_column_id: entry.from_column.as_ref().map(|c| c.id),
            from_column_name: entry.from_column.map(|c| c.name),
            to_column_id: entry.to_column.as_ref().map(|c| c.id),
            to_column_name: entry.to_column.map(|c| c.name),
            user_id: entry.user_id,
            created_at: Utc::now(),
        });
    }

    fn occupancy(&self, column_id: Uuid) -> Occupancy {
        Occupancy::of(self.cards.values().filter(|c| c.column_id == column_id))
    }

    fn column(&self, id: Uuid) -> KanbanResult<&Column> {
        self.columns
            .get(&id)
            .ok_or_else(|| KanbanError::not_found(Entity::Column, id))
    }

    /// Removes every card matching `doomed`, logging each as deleted
    ///
    /// Cards go in column then position order so the ledger reads naturally.
    fn remove_cards(&mut self, doomed: impl Fn(&Card) -> bool, actor: Uuid) {
        let mut removed: Vec<Card> = self.cards.values().filter(|c| doomed(c)).cloned().collect();
        removed.sort_by_key(|c| (c.column_id, c.position));

        for card in removed {
            self.cards.remove(&card.id);
            let entry = NewHistoryEntry::deleted(&card, self.columns.get(&card.column_id), actor);
            self.append_history(entry);
        }
    }
}

/// Process-local [`Store`]; contents are lost on restart
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> KanbanResult<()> {
        Ok(())
    }

    async fn create_user(&self, data: CreateUser) -> KanbanResult<User> {
        let mut state = self.state.write().await;

        let taken = state
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&data.email));
        if taken {
            return Err(KanbanError::EmailTaken);
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: data.name,
            email: data.email,
            password_hash: data.password_hash,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> KanbanResult<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> KanbanResult<Option<User>> {
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_users(&self, ids: &[Uuid]) -> KanbanResult<Vec<User>> {
        let state = self.state.read().await;
        Ok(ids.iter().filter_map(|id| state.users.get(id).cloned()).collect())
    }

    async fn insert_token(&self, token: NewAccessToken) -> KanbanResult<AccessToken> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        let record = AccessToken {
            id: Uuid::new_v4(),
            user_id: token.user_id,
            token_hash: token.token_hash,
            refresh_token_hash: token.refresh_token_hash,
            expires_at: token.expires_at,
            refresh_expires_at: token.refresh_expires_at,
            last_used_at: None,
            ip_address: token.ip_address,
            user_agent: token.user_agent,
            created_at: now,
            updated_at: now,
        };
        state.tokens.insert(record.id, record.clone());
        Ok(record)
    }

    async fn touch_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> KanbanResult<Option<AccessToken>> {
        let mut state = self.state.write().await;

        let token = state
            .tokens
            .values_mut()
            .find(|t| t.token_hash == token_hash && !t.is_expired(now));

        Ok(token.map(|t| {
            t.last_used_at = Some(now);
            t.clone()
        }))
    }

    async fn rotate_token(
        &self,
        refresh_token_hash: &str,
        now: DateTime<Utc>,
        rotation: TokenRotation,
    ) -> KanbanResult<Option<AccessToken>> {
        let mut state = self.state.write().await;

        let token = state
            .tokens
            .values_mut()
            .find(|t| t.refresh_token_hash == refresh_token_hash && !t.is_refresh_expired(now));

        Ok(token.map(|t| {
            t.token_hash = rotation.token_hash;
            t.expires_at = rotation.expires_at;
            if let Some((hash, expires_at)) = rotation.refresh {
                t.refresh_token_hash = hash;
                t.refresh_expires_at = expires_at;
            }
            t.last_used_at = Some(now);
            t.updated_at = now;
            t.clone()
        }))
    }

    async fn delete_token(&self, token_hash: &str) -> KanbanResult<bool> {
        let mut state = self.state.write().await;
        let before = state.tokens.len();
        state.tokens.retain(|_, t| t.token_hash != token_hash);
        Ok(state.tokens.len() < before)
    }

    async fn prune_tokens(&self, now: DateTime<Utc>) -> KanbanResult<u64> {
        let mut state = self.state.write().await;
        let before = state.tokens.len();
        state.tokens.retain(|_, t| !t.is_refresh_expired(now));
        Ok((before - state.tokens.len()) as u64)
    }

    async fn create_board(
        &self,
        data: CreateBoard,
        seed: &[ColumnSeed],
    ) -> KanbanResult<BoardWithColumns> {
        let mut state = self.state.write().await;

        if !state.users.contains_key(&data.owner_id) {
            return Err(KanbanError::not_found(Entity::User, data.owner_id));
        }

        let now = Utc::now();
        let board = Board {
            id: Uuid::new_v4(),
            owner_id: data.owner_id,
            title: data.title,
            description: data.description,
            created_at: now,
            updated_at: now,
        };

        let columns: Vec<Column> = seed
            .iter()
            .map(|s| Column {
                id: Uuid::new_v4(),
                board_id: board.id,
                name: s.name.to_string(),
                wip_limit: s.wip_limit,
                order: s.order,
                created_at: now,
                updated_at: now,
            })
            .collect();

        state.boards.insert(board.id, board.clone());
        for column in &columns {
            state.columns.insert(column.id, column.clone());
        }

        Ok(BoardWithColumns { board, columns })
    }

    async fn find_board(&self, id: Uuid) -> KanbanResult<Option<Board>> {
        Ok(self.state.read().await.boards.get(&id).cloned())
    }

    async fn list_boards(&self) -> KanbanResult<Vec<Board>> {
        let mut boards: Vec<Board> = self.state.read().await.boards.values().cloned().collect();
        boards.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(boards)
    }

    async fn update_board(&self, id: Uuid, update: UpdateBoard) -> KanbanResult<Board> {
        let mut state = self.state.write().await;

        let board = state
            .boards
            .get(&id)
            .ok_or_else(|| KanbanError::not_found(Entity::Board, id))?
            .with_update(&update, Utc::now());

        state.boards.insert(id, board.clone());
        Ok(board)
    }

    async fn delete_board(&self, id: Uuid, actor: Uuid) -> KanbanResult<()> {
        let mut state = self.state.write().await;

        if !state.boards.contains_key(&id) {
            return Err(KanbanError::not_found(Entity::Board, id));
        }

        state.remove_cards(|c| c.board_id == id, actor);
        state.columns.retain(|_, c| c.board_id != id);
        state.boards.remove(&id);
        Ok(())
    }

    async fn add_column(&self, board_id: Uuid, data: CreateColumn) -> KanbanResult<Column> {
        let mut state = self.state.write().await;

        if !state.boards.contains_key(&board_id) {
            return Err(KanbanError::not_found(Entity::Board, board_id));
        }

        let order = rules::next_order(
            state
                .columns
                .values()
                .filter(|c| c.board_id == board_id)
                .map(|c| c.order),
        );

        let now = Utc::now();
        let column = Column {
            id: Uuid::new_v4(),
            board_id,
            name: data.name,
            wip_limit: data.wip_limit,
            order,
            created_at: now,
            updated_at: now,
        };
        state.columns.insert(column.id, column.clone());
        Ok(column)
    }

    async fn find_column(&self, id: Uuid) -> KanbanResult<Option<Column>> {
        Ok(self.state.read().await.columns.get(&id).cloned())
    }

    async fn columns_for_boards(&self, board_ids: &[Uuid]) -> KanbanResult<Vec<Column>> {
        let state = self.state.read().await;
        let mut columns: Vec<Column> = state
            .columns
            .values()
            .filter(|c| board_ids.contains(&c.board_id))
            .cloned()
            .collect();
        columns.sort_by_key(|c| (c.board_id, c.order));
        Ok(columns)
    }

    async fn update_column(&self, id: Uuid, update: UpdateColumn) -> KanbanResult<Column> {
        let mut state = self.state.write().await;

        let column = state.column(id)?.with_update(&update, Utc::now());
        state.columns.insert(id, column.clone());
        Ok(column)
    }

    async fn delete_column(&self, id: Uuid, actor: Uuid) -> KanbanResult<()> {
        let mut state = self.state.write().await;

        state.column(id)?;
        state.remove_cards(|c| c.column_id == id, actor);
        state.columns.remove(&id);
        Ok(())
    }

    async fn create_card(&self, data: CreateCard) -> KanbanResult<Card> {
        let mut state = self.state.write().await;

        let column = state.column(data.column_id)?.clone();
        rules::ensure_column_in_board(&column, data.board_id)?;

        let occupancy = state.occupancy(column.id);
        rules::ensure_capacity(&column, &occupancy)?;

        let now = Utc::now();
        let card = Card {
            id: Uuid::new_v4(),
            board_id: data.board_id,
            column_id: column.id,
            title: data.title,
            description: data.description,
            position: rules::position_for(Placement::Bottom, &occupancy),
            created_by: data.created_by,
            created_at: now,
            updated_at: now,
        };

        state.cards.insert(card.id, card.clone());
        state.append_history(NewHistoryEntry::created(&card, &column, data.created_by));
        Ok(card)
    }

    async fn find_card(&self, id: Uuid) -> KanbanResult<Option<Card>> {
        Ok(self.state.read().await.cards.get(&id).cloned())
    }

    async fn cards_for_boards(&self, board_ids: &[Uuid]) -> KanbanResult<Vec<Card>> {
        let state = self.state.read().await;
        let mut cards: Vec<Card> = state
            .cards
            .values()
            .filter(|c| board_ids.contains(&c.board_id))
            .cloned()
            .collect();
        cards.sort_by_key(|c| (c.column_id, c.position));
        Ok(cards)
    }

    async fn card_counts(&self, board_ids: &[Uuid]) -> KanbanResult<Vec<(Uuid, i64)>> {
        let state = self.state.read().await;
        let mut counts: HashMap<Uuid, i64> = HashMap::new();
        for card in state.cards.values().filter(|c| board_ids.contains(&c.board_id)) {
            *counts.entry(card.column_id).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }

    async fn update_card(&self, id: Uuid, update: UpdateCard, actor: Uuid) -> KanbanResult<Card> {
        let mut state = self.state.write().await;

        let card = state
            .cards
            .get(&id)
            .ok_or_else(|| KanbanError::not_found(Entity::Card, id))?
            .with_update(&update, Utc::now());

        state.cards.insert(id, card.clone());
        state.append_history(NewHistoryEntry::updated(&card, actor));
        Ok(card)
    }

    async fn move_card(
        &self,
        id: Uuid,
        to_column_id: Uuid,
        placement: Placement,
        actor: Uuid,
    ) -> KanbanResult<Card> {
        let mut state = self.state.write().await;

        let card = state
            .cards
            .get(&id)
            .cloned()
            .ok_or_else(|| KanbanError::not_found(Entity::Card, id))?;
        let target = state.column(to_column_id)?.clone();
        let source = state.column(card.column_id)?.clone();

        rules::check_move(&card, &target)?;
        let occupancy = state.occupancy(target.id);
        rules::ensure_capacity(&target, &occupancy)?;

        let moved = Card {
            column_id: target.id,
            position: rules::position_for(placement, &occupancy),
            updated_at: Utc::now(),
            ..card
        };

        state.cards.insert(id, moved.clone());
        state.append_history(NewHistoryEntry::moved(&moved, &source, &target, actor));
        Ok(moved)
    }

    async fn delete_card(&self, id: Uuid, actor: Uuid) -> KanbanResult<()> {
        let mut state = self.state.write().await;

        if !state.cards.contains_key(&id) {
            return Err(KanbanError::not_found(Entity::Card, id));
        }

        state.remove_cards(|c| c.id == id, actor);
        Ok(())
    }

    async fn card_history(&self, card_id: Uuid) -> KanbanResult<Vec<HistoryEntry>> {
        let state = self.state.read().await;
        Ok(state
            .history
            .iter()
            .filter(|e| e.card_id == card_id)
            .cloned()
            .collect())
    }

    async fn board_history(&self, board_id: Uuid) -> KanbanResult<Vec<HistoryEntry>> {
        let state = self.state.read().await;
        Ok(state
            .history
            .iter()
            .filter(|e| e.board_id == board_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kanban::rules::DEFAULT_COLUMNS;
    use crate::models::history::HistoryAction;

    async fn seeded() -> (MemoryStore, User, BoardWithColumns) {
        let store = MemoryStore::new();
        let user = store
            .create_user(CreateUser {
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap();
        let board = store
            .create_board(
                CreateBoard {
                    owner_id: user.id,
                    title: "B".to_string(),
                    description: None,
                },
                &DEFAULT_COLUMNS,
            )
            .await
            .unwrap();
        (store, user, board)
    }

    fn new_card(board: &BoardWithColumns, column: usize, user: &User, title: &str) -> CreateCard {
        CreateCard {
            board_id: board.board.id,
            column_id: board.columns[column].id,
            title: title.to_string(),
            description: None,
            created_by: user.id,
        }
    }

    #[tokio::test]
    async fn test_email_uniqueness_ignores_case() {
        let (store, _, _) = seeded().await;

        let result = store
            .create_user(CreateUser {
                name: "Other".to_string(),
                email: "ADA@example.com".to_string(),
                password_hash: "hash".to_string(),
            })
            .await;

        assert!(matches!(result, Err(KanbanError::EmailTaken)));
    }

    #[tokio::test]
    async fn test_cards_append_to_bottom() {
        let (store, user, board) = seeded().await;

        let first = store.create_card(new_card(&board, 0, &user, "a")).await.unwrap();
        let second = store.create_card(new_card(&board, 0, &user, "b")).await.unwrap();

        assert_eq!(first.position, 1);
        assert_eq!(second.position, 2);
    }

    #[tokio::test]
    async fn test_move_to_top_of_empty_column() {
        let (store, user, board) = seeded().await;
        let card = store.create_card(new_card(&board, 0, &user, "a")).await.unwrap();

        let moved = store
            .move_card(card.id, board.columns[2].id, Placement::Top, user.id)
            .await
            .unwrap();

        assert_eq!(moved.column_id, board.columns[2].id);
        assert_eq!(moved.position, 1);
        assert_eq!(moved.created_by, card.created_by);
    }

    #[tokio::test]
    async fn test_delete_card_keeps_history() {
        let (store, user, board) = seeded().await;
        let card = store.create_card(new_card(&board, 0, &user, "a")).await.unwrap();

        store.delete_card(card.id, user.id).await.unwrap();

        assert!(store.find_card(card.id).await.unwrap().is_none());
        let actions: Vec<_> = store
            .card_history(card.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, [HistoryAction::Created, HistoryAction::Deleted]);
    }

    #[tokio::test]
    async fn test_touch_ignores_expired_tokens() {
        let (store, user, _) = seeded().await;
        let now = Utc::now();

        store
            .insert_token(NewAccessToken {
                user_id: user.id,
                token_hash: "expired".to_string(),
                refresh_token_hash: "refresh".to_string(),
                expires_at: now - chrono::Duration::minutes(1),
                refresh_expires_at: now + chrono::Duration::days(1),
                ip_address: None,
                user_agent: None,
            })
            .await
            .unwrap();

        assert!(store.touch_token("expired", now).await.unwrap().is_none());
        assert_eq!(store.prune_tokens(now).await.unwrap(), 0);
        assert!(store.delete_token("expired").await.unwrap());
        assert!(!store.delete_token("expired").await.unwrap());
    }
}
