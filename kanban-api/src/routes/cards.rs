/// Card endpoints
///
/// Any signed-in user may create, edit, move or delete cards on any board.
///
/// # Endpoints
///
/// - `GET /cards/:id` - Card with creator and column
/// - `POST /boards/:id/cards` - Add a card to the bottom of a column
/// - `PATCH /cards/:id` - Update title and/or description
/// - `DELETE /cards/:id` - Delete the card (its history is kept)
/// - `POST /cards/:id/move` - Move to the top or bottom of another column
///
/// # Move
///
/// ```text
/// POST /cards/:id/move
/// { "to_column_id": "uuid", "position": "top" }
/// ```
///
/// - `400 SAME_COLUMN_MOVE`: the card already sits in `to_column_id`
/// - `404 NOT_FOUND`: unknown card or column
/// - `422 VALIDATION_ERROR`: the column belongs to another board
/// - `422 WIP_LIMIT_REACHED`: the target column is full

use super::double_option;
use crate::{
    app::AppState,
    error::{ApiResult, ValidatedJson},
    middleware::auth::AuthContext,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use kanban_shared::{
    kanban::{rules::Placement, service::NewCard},
    models::card::{Card, CardDetail, UpdateCard},
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCardRequest {
    #[validate(length(min = 1, max = 120, message = "The title must be between 1 and 120 characters."))]
    pub title: String,

    pub description: Option<String>,

    pub column_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCardRequest {
    #[validate(length(min = 1, max = 120, message = "The title must be between 1 and 120 characters."))]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MoveCardRequest {
    pub to_column_id: Uuid,

    /// `top` or `bottom`
    pub position: Placement,
}

pub async fn show_card(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CardDetail>> {
    Ok(Json(state.kanban.card_detail(id).await?))
}

pub async fn create_card(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(board_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<CreateCardRequest>,
) -> ApiResult<(StatusCode, Json<Card>)> {
    let card = state
        .kanban
        .create_card(
            &auth.user,
            board_id,
            NewCard {
                column_id: req.column_id,
                title: req.title,
                description: req.description,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(card)))
}

pub async fn update_card(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateCardRequest>,
) -> ApiResult<Json<Card>> {
    let card = state
        .kanban
        .update_card(
            &auth.user,
            id,
            UpdateCard {
                title: req.title,
                description: req.description,
            },
        )
        .await?;

    Ok(Json(card))
}

pub async fn delete_card(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.kanban.delete_card(&auth.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn move_card(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<MoveCardRequest>,
) -> ApiResult<Json<Card>> {
    let card = state
        .kanban
        .move_card(&auth.user, id, req.to_column_id, req.position)
        .await?;

    Ok(Json(card))
}
