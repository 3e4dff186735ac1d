//! Query Service
//!
//! Read-only projections over the store, used by the REST handlers and by
//! the hub to load a connecting user's relations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Message, Room, Store, User};
use crate::shared::error::AppError;

/// Default page size for message listings
pub const DEFAULT_MESSAGE_LIMIT: usize = 50;

/// Largest accepted page size
pub const MAX_MESSAGE_LIMIT: usize = 100;

/// Query service errors
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Internal(#[from] AppError),
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::NotFound(what) => AppError::NotFound(format!("{} not found", what)),
            QueryError::Forbidden(msg) => AppError::Forbidden(msg),
            QueryError::Internal(e) => e,
        }
    }
}

/// A user with their friends and rooms.
#[derive(Debug, Clone)]
pub struct UserRelation {
    pub user: User,
    pub friends: Vec<User>,
    pub rooms: Vec<Room>,
}

/// A room with its member profiles.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub room: Room,
    pub members: Vec<User>,
}

/// Unread messages of one user in one room.
#[derive(Debug, Clone)]
pub struct UnreadMessages {
    pub count: u64,
    pub messages: Vec<Message>,
}

/// Lookups the hub needs, kept narrow so they can be mocked.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelationQuery: Send + Sync {
    /// Load a user together with their friends and rooms.
    async fn find_user_relation(&self, user_id: u64) -> Result<UserRelation, QueryError>;

    /// Load a room by ID.
    async fn find_room(&self, room_id: u64) -> Result<Room, QueryError>;
}

/// Store-backed query service.
pub struct QueryService {
    store: Arc<dyn Store>,
}

impl QueryService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Room details, visible to members only.
    pub async fn find_room_info(&self, user_id: u64, room_id: u64) -> Result<RoomInfo, QueryError> {
        let room = self.member_room(user_id, room_id).await?;
        let ids: Vec<u64> = room.member_ids.iter().copied().collect();
        let members = self.store.find_users(&ids).await?;
        Ok(RoomInfo { room, members })
    }

    /// Messages of a room, newest first, visible to members only.
    pub async fn find_room_messages(
        &self,
        user_id: u64,
        room_id: u64,
        before: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, QueryError> {
        self.member_room(user_id, room_id).await?;
        let messages = self
            .store
            .find_room_messages(room_id, before, clamp_limit(limit))
            .await?;
        Ok(messages)
    }

    /// Messages `user_id` has not read yet, oldest first, with the total count.
    pub async fn find_unread_room_messages(
        &self,
        user_id: u64,
        room_id: u64,
        limit: Option<usize>,
    ) -> Result<UnreadMessages, QueryError> {
        self.member_room(user_id, room_id).await?;
        let count = self.store.count_unread(room_id, user_id).await?;
        let messages = self
            .store
            .find_unread_messages(room_id, user_id, clamp_limit(limit))
            .await?;
        Ok(UnreadMessages { count, messages })
    }

    async fn member_room(&self, user_id: u64, room_id: u64) -> Result<Room, QueryError> {
        let room = RelationQuery::find_room(self, room_id).await?;
        if !room.has_member(user_id) {
            return Err(QueryError::Forbidden(format!(
                "User {} is not a member of room {}",
                user_id, room_id
            )));
        }
        Ok(room)
    }
}

#[async_trait]
impl RelationQuery for QueryService {
    async fn find_user_relation(&self, user_id: u64) -> Result<UserRelation, QueryError> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| QueryError::NotFound(format!("User {}", user_id)))?;

        let friend_ids: Vec<u64> = user.friend_ids.iter().copied().collect();
        let friends = self.store.find_users(&friend_ids).await?;
        let rooms = self.store.find_user_rooms(user_id).await?;

        Ok(UserRelation {
            user,
            friends,
            rooms,
        })
    }

    async fn find_room(&self, room_id: u64) -> Result<Room, QueryError> {
        self.store
            .find_room(room_id)
            .await?
            .ok_or_else(|| QueryError::NotFound(format!("Room {}", room_id)))
    }
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_MESSAGE_LIMIT).clamp(1, MAX_MESSAGE_LIMIT)
}
