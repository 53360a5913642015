/// Database models
///
/// Each model is a plain row struct with static query methods taking any
/// `PgExecutor`, so the same call works on a pool or inside a transaction.
///
/// # Models
///
/// - `user`: accounts that own boards and create cards
/// - `access_token`: hashed bearer credentials, one per device
/// - `board`: boards plus the listing/detail payload types
/// - `column`: ordered, WIP-limited columns of a board
/// - `card`: cards positioned within a column
/// - `history`: append-only card ledger
///
/// # Example
///
/// ```no_run
/// use kanban_shared::models::board::Board;
/// use kanban_shared::models::column::Column;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let boards = Board::list(&pool).await?;
/// let ids: Vec<_> = boards.iter().map(|b| b.id).collect();
/// let columns = Column::list_for_boards(&pool, &ids).await?;
/// # Ok(())
/// # }
/// ```

pub mod access_token;
pub mod board;
pub mod card;
pub mod column;
pub mod history;
pub mod user;
