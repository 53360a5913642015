/// Storage abstraction for the Kanban core
///
/// [`Store`] groups every persistence operation the services need. Each
/// mutating method is atomic: it applies completely, including the history
/// entries it records, or not at all. Implementations make every decision by
/// calling [`crate::kanban::rules`] while holding their locks, so the
/// WIP check, the position or order computation and the write all observe the
/// same state.
///
/// # Implementations
///
/// - [`postgres::PgStore`]: one transaction per mutation with row locks on the
///   affected board or columns, retrying serialization failures and deadlocks
/// - [`memory::MemoryStore`]: a single `RwLock` around in-process maps, used
///   by tests and for running without a database
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use kanban_shared::store::{memory::MemoryStore, Store};
///
/// let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
/// assert_eq!(store.backend(), "memory");
/// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

use crate::error::KanbanResult;
use crate::kanban::rules::{ColumnSeed, Placement};
use crate::models::access_token::{AccessToken, NewAccessToken, TokenRotation};
use crate::models::board::{Board, BoardWithColumns, CreateBoard, UpdateBoard};
use crate::models::card::{Card, CreateCard, UpdateCard};
use crate::models::column::{Column, CreateColumn, UpdateColumn};
use crate::models::history::HistoryEntry;
use crate::models::user::{CreateUser, User};

pub mod memory;
pub mod postgres;

#[async_trait]
pub trait Store: Send + Sync {
    /// Short backend name reported by the health check
    fn backend(&self) -> &'static str;

    /// Verifies the backend is reachable
    async fn ping(&self) -> KanbanResult<()>;

    // ---- users ----

    /// Fails with `EmailTaken` when the email is registered, ignoring case
    async fn create_user(&self, data: CreateUser) -> KanbanResult<User>;

    async fn find_user(&self, id: Uuid) -> KanbanResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> KanbanResult<Option<User>>;

    async fn find_users(&self, ids: &[Uuid]) -> KanbanResult<Vec<User>>;

    // ---- tokens ----

    async fn insert_token(&self, token: NewAccessToken) -> KanbanResult<AccessToken>;

    /// Returns the live token with this access hash after stamping `last_used_at`
    async fn touch_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> KanbanResult<Option<AccessToken>>;

    /// Applies `rotation` to the token with this live refresh hash
    async fn rotate_token(
        &self,
        refresh_token_hash: &str,
        now: DateTime<Utc>,
        rotation: TokenRotation,
    ) -> KanbanResult<Option<AccessToken>>;

    /// Returns whether a token was removed
    async fn delete_token(&self, token_hash: &str) -> KanbanResult<bool>;

    /// Removes tokens whose refresh secret expired, returning how many
    async fn prune_tokens(&self, now: DateTime<Utc>) -> KanbanResult<u64>;

    // ---- boards ----

    /// Creates the board and its seed columns together
    async fn create_board(
        &self,
        data: CreateBoard,
        seed: &[ColumnSeed],
    ) -> KanbanResult<BoardWithColumns>;

    async fn find_board(&self, id: Uuid) -> KanbanResult<Option<Board>>;

    /// Every board, newest first
    async fn list_boards(&self) -> KanbanResult<Vec<Board>>;

    async fn update_board(&self, id: Uuid, update: UpdateBoard) -> KanbanResult<Board>;

    /// Removes the board with its columns and cards, logging each card as deleted by `actor`
    async fn delete_board(&self, id: Uuid, actor: Uuid) -> KanbanResult<()>;

    // ---- columns ----

    /// Appends a column with `order = max + 1` under the board lock
    async fn add_column(&self, board_id: Uuid, data: CreateColumn) -> KanbanResult<Column>;

    async fn find_column(&self, id: Uuid) -> KanbanResult<Option<Column>>;

    /// Columns of the given boards, each board in display order
    async fn columns_for_boards(&self, board_ids: &[Uuid]) -> KanbanResult<Vec<Column>>;

    async fn update_column(&self, id: Uuid, update: UpdateColumn) -> KanbanResult<Column>;

    /// Removes the column and its cards, logging each card as deleted by `actor`
    async fn delete_column(&self, id: Uuid, actor: Uuid) -> KanbanResult<()>;

    // ---- cards ----

    /// Appends a card to the bottom of its column, enforcing the WIP limit
    async fn create_card(&self, data: CreateCard) -> KanbanResult<Card>;

    async fn find_card(&self, id: Uuid) -> KanbanResult<Option<Card>>;

    /// Cards of the given boards, each column top to bottom
    async fn cards_for_boards(&self, board_ids: &[Uuid]) -> KanbanResult<Vec<Card>>;

    /// Live card count per column id for the given boards; empty columns are absent
    async fn card_counts(&self, board_ids: &[Uuid]) -> KanbanResult<Vec<(Uuid, i64)>>;

    async fn update_card(&self, id: Uuid, update: UpdateCard, actor: Uuid) -> KanbanResult<Card>;

    async fn move_card(
        &self,
        id: Uuid,
        to_column_id: Uuid,
        placement: Placement,
        actor: Uuid,
    ) -> KanbanResult<Card>;

    async fn delete_card(&self, id: Uuid, actor: Uuid) -> KanbanResult<()>;

    // ---- history ----

    /// Entries of one card, oldest first
    async fn card_history(&self, card_id: Uuid) -> KanbanResult<Vec<HistoryEntry>>;

    /// Entries of every card that belonged to the board, oldest first
    async fn board_history(&self, board_id: Uuid) -> KanbanResult<Vec<HistoryEntry>>;
}

/// Backoff policy for transient storage failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    pub base_delay_ms: u64,

    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 20,
            max_delay_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, doubling each time
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(
            self.base_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }
}

/// Runs `op` until it succeeds, fails permanently or runs out of attempts
///
/// Only errors for which [`crate::error::KanbanError::is_transient`] holds are
/// retried; anything else is returned immediately.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> KanbanResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = KanbanResult<T>>,
{
    let mut attempt = 1;

    loop {
        match op().await {
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient storage failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KanbanError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 300,
        };

        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(300));
        assert_eq!(policy.delay(10), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_with_retry_returns_permanent_errors_immediately() {
        let calls = AtomicU32::new(0);

        let result: KanbanResult<()> = with_retry(&RetryPolicy::default(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(KanbanError::Forbidden)
        })
        .await;

        assert!(matches!(result, Err(KanbanError::Forbidden)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_passes_success_through() {
        let result = with_retry(&RetryPolicy::default(), "test", || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }
}
