//! Request DTOs
//!
//! Data structures for REST request bodies and query strings. The room ID
//! comes from the path, so these omit it and are turned into the matching
//! action with `into_action`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;

use super::actions::{AddRoomMember, ChatMessage, ReadMessage};

/// Post message request
#[derive(Debug, Deserialize, Validate)]
pub struct PostMessageRequest {
    #[validate(length(min = 1, max = 2000, message = "Content must be 1-2000 characters"))]
    pub content: String,
}

impl PostMessageRequest {
    pub fn into_action(self, room_id: u64) -> ChatMessage {
        ChatMessage {
            room_id,
            content: self.content,
        }
    }
}

/// Mark-as-read request; an empty body means "now"
#[derive(Debug, Default, Deserialize)]
pub struct ReadMessagesRequest {
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

impl ReadMessagesRequest {
    pub fn into_action(self, room_id: u64) -> ReadMessage {
        ReadMessage {
            room_id,
            read_at: self.read_at,
        }
    }
}

/// Add member request
#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: u64,
}

impl AddMemberRequest {
    pub fn into_action(self, room_id: u64) -> AddRoomMember {
        AddRoomMember {
            room_id,
            user_id: self.user_id,
        }
    }
}

/// Message listing query (`?before=<rfc3339>&limit=<n>`)
#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Unread listing query (`?limit=<n>`)
#[derive(Debug, Default, Deserialize)]
pub struct UnreadQuery {
    pub limit: Option<usize>,
}
