/// History endpoints
///
/// - `GET /cards/:id/history` - Entries of one card, oldest first
/// - `GET /boards/:id/history` - Entries of every card of the board, oldest first
///
/// Both keep working after the card, column or board was deleted.
///
/// ```json
/// [{
///   "id": 7,
///   "card_id": "uuid",
///   "board_id": "uuid",
///   "type": "moved",
///   "card_title": "Write announcement",
///   "from_column": { "id": "uuid", "name": "To Do" },
///   "to_column": { "id": "uuid", "name": "Doing" },
///   "by_user": { "id": "uuid", "name": "Ada" },
///   "at": "2025-01-01T10:00:00Z"
/// }]
/// ```

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, State},
    Json,
};
use kanban_shared::models::history::HistoryView;
use uuid::Uuid;

pub async fn card_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<HistoryView>>> {
    Ok(Json(state.kanban.card_history(id).await?))
}

pub async fn board_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<HistoryView>>> {
    Ok(Json(state.kanban.board_history(id).await?))
}
