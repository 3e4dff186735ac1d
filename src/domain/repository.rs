//! Repository contracts.
//!
//! Reads go through [`Store`]; every write happens inside a [`Transaction`]
//! obtained from [`Store::begin`]. Implementations live in the
//! infrastructure layer (PostgreSQL and in-memory).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::{Message, Room, User};
use crate::domain::events::Event;
use crate::shared::error::AppError;

/// Read access plus transaction factory.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user(&self, id: u64) -> Result<Option<User>, AppError>;

    /// Users with the given IDs. Unknown IDs are skipped.
    async fn find_users(&self, ids: &[u64]) -> Result<Vec<User>, AppError>;

    async fn find_room(&self, id: u64) -> Result<Option<Room>, AppError>;

    /// Rooms the user is a member of, ordered by ID.
    async fn find_user_rooms(&self, user_id: u64) -> Result<Vec<Room>, AppError>;

    /// Non-deleted messages of a room, newest first.
    ///
    /// `before` restricts to messages created strictly earlier.
    async fn find_room_messages(
        &self,
        room_id: u64,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Message>, AppError>;

    /// Non-deleted messages from other users that `user_id` has not read yet,
    /// oldest first.
    async fn find_unread_messages(
        &self,
        room_id: u64,
        user_id: u64,
        limit: usize,
    ) -> Result<Vec<Message>, AppError>;

    /// Number of messages [`Store::find_unread_messages`] would return
    /// without a limit.
    async fn count_unread(&self, room_id: u64, user_id: u64) -> Result<u64, AppError>;

    /// Soft-delete every message of a room. Returns the number of rows touched.
    async fn soft_delete_room_messages(&self, room_id: u64) -> Result<u64, AppError>;

    /// Start a write transaction.
    async fn begin(&self) -> Result<Box<dyn Transaction>, AppError>;

    /// Connectivity check used by readiness probes.
    async fn ping(&self) -> Result<(), AppError>;
}

/// A unit of work. Nothing is visible to readers before [`Transaction::commit`].
///
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait Transaction: Send {
    async fn find_user(&mut self, id: u64) -> Result<Option<User>, AppError>;

    async fn find_room(&mut self, id: u64) -> Result<Option<Room>, AppError>;

    /// Insert a room and its members. Returns the assigned ID.
    async fn insert_room(&mut self, room: &Room) -> Result<u64, AppError>;

    /// Replace the stored member set of a room.
    async fn update_room_members(&mut self, room: &Room) -> Result<(), AppError>;

    async fn delete_room(&mut self, room_id: u64) -> Result<(), AppError>;

    /// Replace the stored friend set of a user.
    async fn update_user_friends(&mut self, user: &User) -> Result<(), AppError>;

    /// Insert a message. Returns the assigned ID.
    async fn insert_message(&mut self, message: &Message) -> Result<u64, AppError>;

    /// Upsert the read marker of `user_id` in `room_id`.
    async fn mark_room_read(
        &mut self,
        room_id: u64,
        user_id: u64,
        read_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Append events to the event log.
    async fn append_events(&mut self, events: &[Event]) -> Result<(), AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;

    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}
