//! Room Handlers
//!
//! REST counterparts of the room actions. Mutations go through the command
//! service, so connected clients are notified the same way as for actions
//! sent over the gateway.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::application::dto::request::{
    AddMemberRequest, MessageQuery, PostMessageRequest, ReadMessagesRequest, UnreadQuery,
};
use crate::application::dto::response::{
    IdResponse, MessageResponse, RoomInfoResponse, UnreadResponse,
};
use crate::application::dto::{CreateRoom, DeleteRoom, RemoveRoomMember};
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Create a room owned by the caller
pub async fn create_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<CreateRoom>,
) -> Result<(StatusCode, Json<IdResponse>), AppError> {
    let id = state.commands.create_room(auth.user_id, &body).await?;
    Ok((StatusCode::CREATED, Json(IdResponse { id })))
}

/// Room details with member profiles
pub async fn get_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(room_id): Path<u64>,
) -> Result<Json<RoomInfoResponse>, AppError> {
    let info = state.queries.find_room_info(auth.user_id, room_id).await?;
    Ok(Json(info.into()))
}

pub async fn delete_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(room_id): Path<u64>,
) -> Result<StatusCode, AppError> {
    state
        .commands
        .delete_room(auth.user_id, &DeleteRoom { room_id })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Messages of a room, newest first
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(room_id): Path<u64>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<Vec<MessageResponse>>, AppError> {
    let messages = state
        .queries
        .find_room_messages(auth.user_id, room_id, query.before, query.limit)
        .await?;
    Ok(Json(messages.into_iter().map(MessageResponse::from).collect()))
}

pub async fn post_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(room_id): Path<u64>,
    Json(body): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<IdResponse>), AppError> {
    let action = body.into_action(room_id);
    let id = state.commands.post_room_message(auth.user_id, &action).await?;
    Ok((StatusCode::CREATED, Json(IdResponse { id })))
}

/// Messages the caller has not read yet, oldest first
pub async fn get_unread(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(room_id): Path<u64>,
    Query(query): Query<UnreadQuery>,
) -> Result<Json<UnreadResponse>, AppError> {
    let unread = state
        .queries
        .find_unread_room_messages(auth.user_id, room_id, query.limit)
        .await?;
    Ok(Json(unread.into()))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(room_id): Path<u64>,
    Json(body): Json<ReadMessagesRequest>,
) -> Result<StatusCode, AppError> {
    let action = body.into_action(room_id);
    state.commands.read_room_messages(auth.user_id, &action).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(room_id): Path<u64>,
    Json(body): Json<AddMemberRequest>,
) -> Result<StatusCode, AppError> {
    let action = body.into_action(room_id);
    state.commands.add_room_member(auth.user_id, &action).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path((room_id, user_id)): Path<(u64, u64)>,
) -> Result<StatusCode, AppError> {
    state
        .commands
        .remove_room_member(auth.user_id, &RemoveRoomMember { room_id, user_id })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
