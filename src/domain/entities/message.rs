//! Message entity.
//!
//! Maps to the `messages` table in the database schema.

use chrono::{DateTime, Utc};

use crate::domain::error::DomainError;
use crate::domain::events::{Event, MessageCreated};

use super::{Room, User};

/// Represents a message posted in a room.
///
/// Maps to the `messages` table:
/// - id: BIGSERIAL PRIMARY KEY
/// - room_id: BIGINT NOT NULL
/// - user_id: BIGINT NOT NULL REFERENCES users(id)
/// - content: TEXT NOT NULL
/// - created_at: TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// - deleted: BOOLEAN NOT NULL DEFAULT FALSE
///
/// `room_id` deliberately has no foreign key: messages outlive their room
/// until the cleaner soft-deletes them.
#[derive(Debug, Clone)]
pub struct Message {
    /// Auto-incremented ID (primary key), 0 until stored
    pub id: u64,

    pub room_id: u64,

    /// Author
    pub user_id: u64,

    pub content: String,

    pub created_at: DateTime<Utc>,

    /// Soft-deleted together with its room
    pub deleted: bool,

    events: Vec<Event>,
}

impl Message {
    /// Build a message from `user` in `room`.
    pub fn new(room: &Room, user: &User, content: impl Into<String>) -> Result<Self, DomainError> {
        room.ensure_member(user.id)?;

        let content = content.into();
        if content.trim().is_empty() {
            return Err(DomainError::EmptyContent);
        }

        Ok(Self {
            id: 0,
            room_id: room.id,
            user_id: user.id,
            content,
            created_at: Utc::now(),
            deleted: false,
            events: Vec::new(),
        })
    }

    /// Rebuild a stored message without validation or events.
    pub fn from_parts(
        id: u64,
        room_id: u64,
        user_id: u64,
        content: String,
        created_at: DateTime<Utc>,
        deleted: bool,
    ) -> Self {
        Self {
            id,
            room_id,
            user_id,
            content,
            created_at,
            deleted,
            events: Vec::new(),
        }
    }

    /// Assign the storage ID and record `MessageCreated`.
    pub fn mark_created(&mut self, id: u64) {
        self.id = id;
        self.events.push(Event::new(MessageCreated {
            message_id: id,
            room_id: self.room_id,
            user_id: self.user_id,
            content: self.content.clone(),
            created_at: self.created_at,
        }));
    }

    /// Get the content length in characters.
    pub fn content_length(&self) -> usize {
        self.content.chars().count()
    }

    /// Drain recorded events.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}
