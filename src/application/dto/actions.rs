//! Inbound action DTOs
//!
//! Actions arrive as `{"action": <tag>, "data": {...}}` over the WebSocket
//! gateway. The REST handlers reuse the payload structs as request bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Post a message in a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ChatMessage {
    pub room_id: u64,

    #[validate(length(min = 1, max = 2000, message = "Content must be 1-2000 characters"))]
    pub content: String,
}

/// Mark room messages as read. `read_at` defaults to now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ReadMessage {
    pub room_id: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

/// Typing indicator started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TypeStart {
    pub room_id: u64,
}

/// Typing indicator ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TypeEnd {
    pub room_id: u64,
}

/// Create a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateRoom {
    #[validate(length(min = 1, max = 64, message = "Name must be 1-64 characters"))]
    pub name: String,

    #[serde(default)]
    #[validate(length(max = 256, message = "At most 256 members"))]
    pub member_ids: Vec<u64>,

    #[serde(default)]
    pub is_talk_room: bool,
}

/// Delete a room (owner only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DeleteRoom {
    pub room_id: u64,
}

/// Add a user to a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AddRoomMember {
    pub room_id: u64,
    pub user_id: u64,
}

/// Remove a user from a room (owner, or the user leaving)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RemoveRoomMember {
    pub room_id: u64,
    pub user_id: u64,
}

/// Befriend a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AddFriend {
    pub user_id: u64,
}

/// Closed set of inbound actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "snake_case")]
pub enum ActionMessage {
    ChatMessage(ChatMessage),
    ReadMessage(ReadMessage),
    TypeStart(TypeStart),
    TypeEnd(TypeEnd),
    CreateRoom(CreateRoom),
    DeleteRoom(DeleteRoom),
    AddRoomMember(AddRoomMember),
    RemoveRoomMember(RemoveRoomMember),
    AddFriend(AddFriend),
}

/// Failure to decode an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Malformed action: {0}")]
    Malformed(String),
}

impl ActionMessage {
    /// Every accepted action tag.
    pub const TAGS: [&'static str; 9] = [
        "chat_message",
        "read_message",
        "type_start",
        "type_end",
        "create_room",
        "delete_room",
        "add_room_member",
        "remove_room_member",
        "add_friend",
    ];

    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self, ActionError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| ActionError::Malformed(e.to_string()))?;

        let tag = value
            .get("action")
            .and_then(|a| a.as_str())
            .ok_or_else(|| ActionError::Malformed("missing \"action\" field".into()))?;

        if !Self::TAGS.contains(&tag) {
            return Err(ActionError::UnknownAction(tag.to_string()));
        }

        serde_json::from_value(value).map_err(|e| ActionError::Malformed(e.to_string()))
    }

    /// Wire tag of this action.
    pub fn name(&self) -> &'static str {
        match self {
            ActionMessage::ChatMessage(_) => "chat_message",
            ActionMessage::ReadMessage(_) => "read_message",
            ActionMessage::TypeStart(_) => "type_start",
            ActionMessage::TypeEnd(_) => "type_end",
            ActionMessage::CreateRoom(_) => "create_room",
            ActionMessage::DeleteRoom(_) => "delete_room",
            ActionMessage::AddRoomMember(_) => "add_room_member",
            ActionMessage::RemoveRoomMember(_) => "remove_room_member",
            ActionMessage::AddFriend(_) => "add_friend",
        }
    }

    /// Room the sender must already belong to, if the action is room-scoped.
    pub fn room_id(&self) -> Option<u64> {
        match self {
            ActionMessage::ChatMessage(a) => Some(a.room_id),
            ActionMessage::ReadMessage(a) => Some(a.room_id),
            ActionMessage::TypeStart(a) => Some(a.room_id),
            ActionMessage::TypeEnd(a) => Some(a.room_id),
            ActionMessage::DeleteRoom(a) => Some(a.room_id),
            ActionMessage::AddRoomMember(a) => Some(a.room_id),
            ActionMessage::RemoveRoomMember(a) => Some(a.room_id),
            ActionMessage::CreateRoom(_) | ActionMessage::AddFriend(_) => None,
        }
    }

    /// JSON form, attached as the cause of error events.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
