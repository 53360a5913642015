/// Identity and board-ownership checks
///
/// # Permission Model
///
/// 1. **Identity**: every mutation needs a live access token
/// 2. **Board ownership**: editing or deleting a board, and adding, editing or
///    deleting its columns, is reserved to the board owner
/// 3. **Cards**: any authenticated user may create, edit, move or delete cards
///
/// Routes name the protected board in different ways (a loaded board, a board
/// id, a column id). [`resolve_board`] turns every [`BoardTarget`] into one
/// canonical [`Board`] before [`require_ownership`] decides.
///
/// # Example
///
/// ```no_run
/// use kanban_shared::auth::authorization::{authorize_board, BoardTarget};
/// use kanban_shared::models::user::User;
/// use kanban_shared::store::Store;
/// use uuid::Uuid;
///
/// # async fn example(store: &dyn Store, user: &User, column_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let board = authorize_board(store, user, BoardTarget::ViaColumn(column_id)).await?;
/// println!("{} may edit {}", user.name, board.title);
/// # Ok(())
/// # }
/// ```

use tracing::warn;
use uuid::Uuid;

use super::tokens::TokenService;
use crate::error::{Entity, KanbanError, KanbanResult};
use crate::models::access_token::AccessToken;
use crate::models::board::Board;
use crate::models::user::User;
use crate::store::Store;

/// The ways a request can point at the board it wants to change
#[derive(Debug, Clone)]
pub enum BoardTarget {
    /// Board already loaded by the caller
    Loaded(Board),

    /// Board id taken from the path
    ById(Uuid),

    /// Board owning the column with this id
    ViaColumn(Uuid),
}

/// Resolves the credential to a user, or fails before any domain state is read
pub async fn require_identity(
    tokens: &TokenService,
    credential: Option<&str>,
) -> KanbanResult<(User, AccessToken)> {
    let credential = credential.ok_or(KanbanError::InvalidToken)?;
    tokens.validate_access(credential).await
}

/// Resolves any [`BoardTarget`] to its board
///
/// # Errors
///
/// `NotFound` for the column or board that does not exist.
pub async fn resolve_board(store: &dyn Store, target: BoardTarget) -> KanbanResult<Board> {
    let board_id = match target {
        BoardTarget::Loaded(board) => return Ok(board),
        BoardTarget::ById(id) => id,
        BoardTarget::ViaColumn(column_id) => {
            store
                .find_column(column_id)
                .await?
                .ok_or_else(|| KanbanError::not_found(Entity::Column, column_id))?
                .board_id
        }
    };

    store
        .find_board(board_id)
        .await?
        .ok_or_else(|| KanbanError::not_found(Entity::Board, board_id))
}

/// Passes iff `user` owns `board`
pub fn require_ownership(user: &User, board: &Board) -> KanbanResult<()> {
    if !board.is_owned_by(user.id) {
        warn!(user_id = %user.id, board_id = %board.id, "Rejected non-owner board mutation");
        return Err(KanbanError::Forbidden);
    }

    Ok(())
}

/// [`resolve_board`] followed by [`require_ownership`]
pub async fn authorize_board(
    store: &dyn Store,
    user: &User,
    target: BoardTarget,
) -> KanbanResult<Board> {
    let board = resolve_board(store, target).await?;
    require_ownership(user, &board)?;
    Ok(board)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kanban::rules::DEFAULT_COLUMNS;
    use crate::models::board::CreateBoard;
    use crate::models::user::CreateUser;
    use crate::store::memory::MemoryStore;

    async fn user(store: &MemoryStore, email: &str) -> User {
        store
            .create_user(CreateUser {
                name: email.to_string(),
                email: email.to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_all_targets_resolve_to_the_same_board() {
        let store = MemoryStore::new();
        let owner = user(&store, "owner@example.com").await;
        let created = store
            .create_board(
                CreateBoard {
                    owner_id: owner.id,
                    title: "B".to_string(),
                    description: None,
                },
                &DEFAULT_COLUMNS,
            )
            .await
            .unwrap();

        let targets = vec![
            BoardTarget::Loaded(created.board.clone()),
            BoardTarget::ById(created.board.id),
            BoardTarget::ViaColumn(created.columns[1].id),
        ];

        for target in targets {
            let board = resolve_board(&store, target).await.unwrap();
            assert_eq!(board.id, created.board.id);
        }
    }

    #[tokio::test]
    async fn test_unresolvable_targets_are_not_found() {
        let store = MemoryStore::new();

        assert!(matches!(
            resolve_board(&store, BoardTarget::ById(Uuid::new_v4())).await,
            Err(KanbanError::NotFound { entity: Entity::Board, .. })
        ));
        assert!(matches!(
            resolve_board(&store, BoardTarget::ViaColumn(Uuid::new_v4())).await,
            Err(KanbanError::NotFound { entity: Entity::Column, .. })
        ));
    }

    #[tokio::test]
    async fn test_only_owner_passes() {
        let store = MemoryStore::new();
        let owner = user(&store, "owner@example.com").await;
        let stranger = user(&store, "stranger@example.com").await;
        let created = store
            .create_board(
                CreateBoard {
                    owner_id: owner.id,
                    title: "B".to_string(),
                    description: None,
                },
                &DEFAULT_COLUMNS,
            )
            .await
            .unwrap();

        assert!(require_ownership(&owner, &created.board).is_ok());
        assert!(matches!(
            require_ownership(&stranger, &created.board),
            Err(KanbanError::Forbidden)
        ));
        assert!(matches!(
            authorize_board(&store, &stranger, BoardTarget::ViaColumn(created.columns[0].id)).await,
            Err(KanbanError::Forbidden)
        ));
    }
}
