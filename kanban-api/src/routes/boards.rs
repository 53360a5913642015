/// Board endpoints
///
/// Reads are public. Creating a board needs a signed-in user; editing and
/// deleting it is reserved to its owner.
///
/// # Endpoints
///
/// - `GET /boards` - All boards, newest first, with owner and column counts
/// - `POST /boards` - Create a board seeded with "To Do", "Doing", "Done"
/// - `GET /boards/:id` - Board with columns and their cards
/// - `PATCH /boards/:id` - Update title and/or description
/// - `DELETE /boards/:id` - Delete the board with its columns and cards

use super::double_option;
use crate::{
    app::AppState,
    error::{validated_body, ApiResult, ValidatedJson},
    middleware::auth::AuthContext,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use kanban_shared::{
    auth::authorization::BoardTarget,
    kanban::service::NewBoard,
    models::board::{Board, BoardDetail, BoardSummary, BoardWithColumns, UpdateBoard},
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBoardRequest {
    #[validate(length(min = 1, max = 80, message = "The title must be between 1 and 80 characters."))]
    pub title: String,

    #[validate(length(max = 255, message = "The description must be at most 255 characters."))]
    pub description: Option<String>,
}

/// Partial update; `"description": null` clears the description
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBoardRequest {
    #[validate(length(min = 1, max = 80, message = "The title must be between 1 and 80 characters."))]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

pub async fn list_boards(State(state): State<AppState>) -> ApiResult<Json<Vec<BoardSummary>>> {
    Ok(Json(state.kanban.list_boards().await?))
}

pub async fn show_board(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BoardDetail>> {
    Ok(Json(state.kanban.board_detail(id).await?))
}

/// Create a board owned by the caller
///
/// ```text
/// POST /boards
/// { "title": "Launch", "description": "Q3 launch plan" }
/// ```
///
/// Responds `201` with the board and its three seeded columns.
pub async fn create_board(
    State(state): State<AppState>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<CreateBoardRequest>,
) -> ApiResult<(StatusCode, Json<BoardWithColumns>)> {
    let created = state
        .kanban
        .create_board(
            &auth.user,
            NewBoard {
                title: req.title,
                description: req.description,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// Owner only; a non-owner gets 403 whatever the body contains
pub async fn update_board(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateBoardRequest>, JsonRejection>,
) -> ApiResult<Json<Board>> {
    state.kanban.authorize(&auth.user, BoardTarget::ById(id)).await?;
    let req = validated_body(body)?;

    let board = state
        .kanban
        .update_board(
            &auth.user,
            id,
            UpdateBoard {
                title: req.title,
                description: req.description,
            },
        )
        .await?;

    Ok(Json(board))
}

pub async fn delete_board(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.kanban.delete_board(&auth.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
