//! Response DTOs
//!
//! Data structures for API response bodies. Password hashes never leave the
//! domain layer.

use serde::Serialize;

use crate::application::services::{RoomInfo, UnreadMessages, UserRelation};
use crate::domain::{Message, Room, User};

/// User response
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: u64,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            display_name: user.display_name(),
            name: user.name,
            first_name: user.first_name,
            last_name: user.last_name,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Room response
#[derive(Debug, Serialize)]
pub struct RoomResponse {
    pub id: u64,
    pub name: String,
    pub is_talk_room: bool,
    pub owner_id: u64,
    pub member_ids: Vec<u64>,
    pub created_at: String,
}

impl From<Room> for RoomResponse {
    fn from(room: Room) -> Self {
        Self {
            id: room.id,
            name: room.name,
            is_talk_room: room.is_talk_room,
            owner_id: room.owner_id,
            member_ids: room.member_ids.into_iter().collect(),
            created_at: room.created_at.to_rfc3339(),
        }
    }
}

/// Room with member profiles
#[derive(Debug, Serialize)]
pub struct RoomInfoResponse {
    #[serde(flatten)]
    pub room: RoomResponse,
    pub members: Vec<UserResponse>,
}

impl From<RoomInfo> for RoomInfoResponse {
    fn from(info: RoomInfo) -> Self {
        Self {
            room: info.room.into(),
            members: info.members.into_iter().map(UserResponse::from).collect(),
        }
    }
}

/// Message response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: u64,
    pub room_id: u64,
    pub user_id: u64,
    pub content: String,
    pub created_at: String,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            room_id: message.room_id,
            user_id: message.user_id,
            content: message.content,
            created_at: message.created_at.to_rfc3339(),
        }
    }
}

/// The caller with their friends and rooms
#[derive(Debug, Serialize)]
pub struct UserRelationResponse {
    pub user: UserResponse,
    pub friends: Vec<UserResponse>,
    pub rooms: Vec<RoomResponse>,
}

impl From<UserRelation> for UserRelationResponse {
    fn from(relation: UserRelation) -> Self {
        Self {
            user: relation.user.into(),
            friends: relation.friends.into_iter().map(UserResponse::from).collect(),
            rooms: relation.rooms.into_iter().map(RoomResponse::from).collect(),
        }
    }
}

/// Unread messages of a room
#[derive(Debug, Serialize)]
pub struct UnreadResponse {
    pub count: u64,
    pub messages: Vec<MessageResponse>,
}

impl From<UnreadMessages> for UnreadResponse {
    fn from(unread: UnreadMessages) -> Self {
        Self {
            count: unread.count,
            messages: unread
                .messages
                .into_iter()
                .map(MessageResponse::from)
                .collect(),
        }
    }
}

/// ID of a created or affected resource
#[derive(Debug, Serialize)]
pub struct IdResponse {
    pub id: u64,
}
