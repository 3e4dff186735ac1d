//! User entity.
//!
//! Maps to the `users` and `user_friends` tables in the database schema.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::domain::error::DomainError;
use crate::domain::events::{Event, UserAddedFriend};

/// Represents a user account in the chat system.
///
/// Maps to the `users` table:
/// - id: BIGSERIAL PRIMARY KEY
/// - name: TEXT NOT NULL UNIQUE
/// - first_name: TEXT NOT NULL DEFAULT ''
/// - last_name: TEXT NOT NULL DEFAULT ''
/// - password_hash: TEXT NOT NULL
/// - created_at: TIMESTAMPTZ NOT NULL DEFAULT NOW()
///
/// Friends live in `user_friends (user_id, friend_id)`.
#[derive(Debug, Clone)]
pub struct User {
    /// Auto-incremented ID (primary key), 0 until stored
    pub id: u64,

    /// Unique login/display name
    pub name: String,

    pub first_name: String,

    pub last_name: String,

    /// Credential hash, read-only for the chat core
    pub password_hash: String,

    /// IDs of befriended users
    pub friend_ids: BTreeSet<u64>,

    pub created_at: DateTime<Utc>,

    events: Vec<Event>,
}

impl User {
    /// Create a new, not yet stored user.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            first_name: String::new(),
            last_name: String::new(),
            password_hash: String::new(),
            friend_ids: BTreeSet::new(),
            created_at: Utc::now(),
            events: Vec::new(),
        }
    }

    /// Full name when known, otherwise the user name.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.name.clone()
        } else {
            full.to_string()
        }
    }

    pub fn is_friend(&self, user_id: u64) -> bool {
        self.friend_ids.contains(&user_id)
    }

    /// Befriend another user, recording `UserAddedFriend`.
    ///
    /// Friendship is symmetric; callers apply this to both sides.
    pub fn add_friend(&mut self, friend: &User) -> Result<(), DomainError> {
        if friend.id == self.id {
            return Err(DomainError::SelfFriend);
        }
        if !self.friend_ids.insert(friend.id) {
            return Err(DomainError::AlreadyFriends {
                user_id: self.id,
                friend_id: friend.id,
            });
        }

        self.events.push(Event::new(UserAddedFriend {
            user_id: self.id,
            friend_id: friend.id,
        }));
        Ok(())
    }

    /// Events recorded since the last drain.
    pub fn pending_events(&self) -> &[Event] {
        &self.events
    }

    /// Drain recorded events.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}
