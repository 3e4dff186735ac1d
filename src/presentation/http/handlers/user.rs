//! User Handlers

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};

use crate::application::dto::response::{IdResponse, UserRelationResponse};
use crate::application::dto::AddFriend;
use crate::application::services::RelationQuery;
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Current user with friends and rooms
pub async fn get_relation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<UserRelationResponse>, AppError> {
    let relation = state.queries.find_user_relation(auth.user_id).await?;
    Ok(Json(relation.into()))
}

/// Befriend another user
pub async fn add_friend(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<AddFriend>,
) -> Result<(StatusCode, Json<IdResponse>), AppError> {
    let id = state.commands.add_friend(auth.user_id, &body).await?;
    Ok((StatusCode::CREATED, Json(IdResponse { id })))
}
