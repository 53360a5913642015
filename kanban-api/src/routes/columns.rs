/// Column endpoints, all reserved to the board owner
///
/// - `POST /boards/:id/columns` - Append a column to the right
/// - `PATCH /columns/:id` - Rename or change the WIP limit
/// - `DELETE /columns/:id` - Delete the column and the cards in it
///
/// Lowering a WIP limit below the current card count is accepted; the
/// existing cards stay and new ones are refused until the column drains.
///
/// Ownership is checked before the body is parsed or validated.

use crate::{
    app::AppState,
    error::{validated_body, ApiResult},
    middleware::auth::AuthContext,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use kanban_shared::{
    auth::authorization::BoardTarget,
    models::column::{Column, CreateColumn, UpdateColumn},
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateColumnRequest {
    #[validate(length(min = 1, max = 40, message = "The name must be between 1 and 40 characters."))]
    pub name: String,

    #[validate(range(min = 0, message = "The WIP limit must be zero or greater."))]
    pub wip_limit: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateColumnRequest {
    #[validate(length(min = 1, max = 40, message = "The name must be between 1 and 40 characters."))]
    pub name: Option<String>,

    #[validate(range(min = 0, message = "The WIP limit must be zero or greater."))]
    pub wip_limit: Option<i32>,
}

pub async fn create_column(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(board_id): Path<Uuid>,
    body: Result<Json<CreateColumnRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Column>)> {
    state.kanban.authorize(&auth.user, BoardTarget::ById(board_id)).await?;
    let req = validated_body(body)?;

    let column = state
        .kanban
        .add_column(
            &auth.user,
            board_id,
            CreateColumn {
                name: req.name,
                wip_limit: req.wip_limit,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(column)))
}

pub async fn update_column(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateColumnRequest>, JsonRejection>,
) -> ApiResult<Json<Column>> {
    state.kanban.authorize(&auth.user, BoardTarget::ViaColumn(id)).await?;
    let req = validated_body(body)?;

    let column = state
        .kanban
        .update_column(
            &auth.user,
            id,
            UpdateColumn {
                name: req.name,
                wip_limit: req.wip_limit,
            },
        )
        .await?;

    Ok(Json(column))
}

pub async fn delete_column(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.kanban.delete_column(&auth.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
