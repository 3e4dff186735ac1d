//! Command Service
//!
//! Executes use-cases that mutate durable state. Each command runs in one
//! store transaction: the entity records its events, the events are appended
//! to the event log, the transaction commits, and only then are the events
//! published on the bus. A failed command publishes nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use validator::Validate;

use crate::application::dto::actions::{
    AddFriend, AddRoomMember, ChatMessage, CreateRoom, DeleteRoom, ReadMessage, RemoveRoomMember,
};
use crate::application::event_bus::EventBus;
use crate::domain::events::{Event, EventKind, EventPayload};
use crate::domain::{DomainError, Message, Room, Store, Transaction, User};
use crate::shared::error::AppError;

/// Command service errors
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error(transparent)]
    Internal(#[from] AppError),
}

impl CommandError {
    /// Message safe to show to a client.
    pub fn client_message(&self) -> String {
        match self {
            CommandError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for CommandError {
    fn from(errors: validator::ValidationErrors) -> Self {
        CommandError::Invalid(errors.to_string())
    }
}

impl From<CommandError> for AppError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::NotFound(what) => AppError::NotFound(format!("{} not found", what)),
            CommandError::Domain(e) if e.is_permission() => AppError::Forbidden(e.to_string()),
            CommandError::Domain(e) => AppError::Validation(e.to_string()),
            CommandError::Invalid(msg) => AppError::Validation(msg),
            CommandError::Internal(e) => e,
        }
    }
}

/// Message cleaner errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CleanerError {
    #[error("Message cleaner already started")]
    AlreadyStarted,

    #[error("Event bus is closed")]
    BusClosed,
}

/// Transactional use-case executor.
pub struct CommandService {
    store: Arc<dyn Store>,
    bus: Arc<EventBus>,
    cleaner_started: AtomicBool,
}

impl CommandService {
    pub fn new(store: Arc<dyn Store>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            bus,
            cleaner_started: AtomicBool::new(false),
        }
    }

    /// Create a room owned by `sender_id`. Returns the new room ID.
    pub async fn create_room(&self, sender_id: u64, action: &CreateRoom) -> Result<u64, CommandError> {
        action.validate()?;

        let mut tx = self.store.begin().await?;
        let result = Self::create_room_tx(tx.as_mut(), sender_id, action).await;
        self.finish(tx, result).await
    }

    async fn create_room_tx(
        tx: &mut dyn Transaction,
        sender_id: u64,
        action: &CreateRoom,
    ) -> Result<(u64, Vec<Event>), CommandError> {
        let sender = load_user(tx, sender_id).await?;
        for &member_id in &action.member_ids {
            if member_id != sender_id {
                load_user(tx, member_id).await?;
            }
        }

        let mut room = Room::new(
            action.name.clone(),
            &sender,
            action.member_ids.iter().copied(),
            action.is_talk_room,
        )?;
        let room_id = tx.insert_room(&room).await?;
        room.mark_created(room_id);

        Ok((room_id, room.take_events()))
    }

    /// Delete a room. Only the owner may do so. Returns the room ID.
    pub async fn delete_room(&self, sender_id: u64, action: &DeleteRoom) -> Result<u64, CommandError> {
        action.validate()?;

        let mut tx = self.store.begin().await?;
        let result = Self::delete_room_tx(tx.as_mut(), sender_id, action).await;
        self.finish(tx, result).await
    }

    async fn delete_room_tx(
        tx: &mut dyn Transaction,
        sender_id: u64,
        action: &DeleteRoom,
    ) -> Result<(u64, Vec<Event>), CommandError> {
        let sender = load_user(tx, sender_id).await?;
        let mut room = load_room(tx, action.room_id).await?;

        room.delete(&sender)?;
        tx.delete_room(room.id).await?;

        Ok((room.id, room.take_events()))
    }

    /// Post a message in a room. Returns the new message ID.
    pub async fn post_room_message(
        &self,
        sender_id: u64,
        action: &ChatMessage,
    ) -> Result<u64, CommandError> {
        action.validate()?;

        let mut tx = self.store.begin().await?;
        let result = Self::post_room_message_tx(tx.as_mut(), sender_id, action).await;
        self.finish(tx, result).await
    }

    async fn post_room_message_tx(
        tx: &mut dyn Transaction,
        sender_id: u64,
        action: &ChatMessage,
    ) -> Result<(u64, Vec<Event>), CommandError> {
        let room = load_room(tx, action.room_id).await?;
        let sender = load_user(tx, sender_id).await?;

        let mut message = Message::new(&room, &sender, action.content.clone())?;
        let message_id = tx.insert_message(&message).await?;
        message.mark_created(message_id);

        Ok((message_id, message.take_events()))
    }

    /// Mark every message of a room up to `read_at` (default now) as read.
    /// Returns the room ID.
    pub async fn read_room_messages(
        &self,
        sender_id: u64,
        action: &ReadMessage,
    ) -> Result<u64, CommandError> {
        action.validate()?;

        let mut tx = self.store.begin().await?;
        let result = Self::read_room_messages_tx(tx.as_mut(), sender_id, action).await;
        self.finish(tx, result).await
    }

    async fn read_room_messages_tx(
        tx: &mut dyn Transaction,
        sender_id: u64,
        action: &ReadMessage,
    ) -> Result<(u64, Vec<Event>), CommandError> {
        let mut room = load_room(tx, action.room_id).await?;
        let sender = load_user(tx, sender_id).await?;
        let read_at = action.read_at.unwrap_or_else(Utc::now);

        room.read_messages_by(&sender, read_at)?;
        tx.mark_room_read(room.id, sender.id, read_at).await?;

        Ok((room.id, room.take_events()))
    }

    /// Add a user to a room on behalf of a member. Returns the room ID.
    pub async fn add_room_member(
        &self,
        sender_id: u64,
        action: &AddRoomMember,
    ) -> Result<u64, CommandError> {
        action.validate()?;

        let mut tx = self.store.begin().await?;
        let result = Self::add_room_member_tx(tx.as_mut(), sender_id, action).await;
        self.finish(tx, result).await
    }

    async fn add_room_member_tx(
        tx: &mut dyn Transaction,
        sender_id: u64,
        action: &AddRoomMember,
    ) -> Result<(u64, Vec<Event>), CommandError> {
        let sender = load_user(tx, sender_id).await?;
        let user = load_user(tx, action.user_id).await?;
        let mut room = load_room(tx, action.room_id).await?;

        room.add_member(&sender, &user)?;
        tx.update_room_members(&room).await?;

        Ok((room.id, room.take_events()))
    }

    /// Remove a user from a room. Returns the room ID.
    pub async fn remove_room_member(
        &self,
        sender_id: u64,
        action: &RemoveRoomMember,
    ) -> Result<u64, CommandError> {
        action.validate()?;

        let mut tx = self.store.begin().await?;
        let result = Self::remove_room_member_tx(tx.as_mut(), sender_id, action).await;
        self.finish(tx, result).await
    }

    async fn remove_room_member_tx(
        tx: &mut dyn Transaction,
        sender_id: u64,
        action: &RemoveRoomMember,
    ) -> Result<(u64, Vec<Event>), CommandError> {
        let sender = load_user(tx, sender_id).await?;
        let mut room = load_room(tx, action.room_id).await?;

        room.remove_member(&sender, action.user_id)?;
        tx.update_room_members(&room).await?;

        Ok((room.id, room.take_events()))
    }

    /// Make two users friends of each other. Returns the friend's user ID.
    pub async fn add_friend(&self, sender_id: u64, action: &AddFriend) -> Result<u64, CommandError> {
        action.validate()?;

        let mut tx = self.store.begin().await?;
        let result = Self::add_friend_tx(tx.as_mut(), sender_id, action).await;
        self.finish(tx, result).await
    }

    async fn add_friend_tx(
        tx: &mut dyn Transaction,
        sender_id: u64,
        action: &AddFriend,
    ) -> Result<(u64, Vec<Event>), CommandError> {
        let mut sender = load_user(tx, sender_id).await?;
        let mut friend = load_user(tx, action.user_id).await?;

        sender.add_friend(&friend)?;
        friend.add_friend(&sender)?;
        tx.update_user_friends(&sender).await?;
        tx.update_user_friends(&friend).await?;

        let mut events = sender.take_events();
        events.extend(friend.take_events());
        Ok((friend.id, events))
    }

    /// Persist the events, commit and publish, or roll back on failure.
    async fn finish(
        &self,
        mut tx: Box<dyn Transaction>,
        result: Result<(u64, Vec<Event>), CommandError>,
    ) -> Result<u64, CommandError> {
        let (id, events) = match result {
            Ok(ok) => ok,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "Failed to roll back transaction");
                }
                return Err(e);
            }
        };

        if let Err(e) = tx.append_events(&events).await {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(error = %rollback_err, "Failed to roll back transaction");
            }
            return Err(e.into());
        }
        tx.commit().await?;

        // The state change is durable at this point; a closed bus only
        // means nobody is listening any more.
        if let Err(e) = self.bus.publish(&events) {
            tracing::warn!(error = %e, events = events.len(), "Events committed but not published");
        }

        Ok(id)
    }

    /// Start the background task that soft-deletes the messages of deleted
    /// rooms. Can only be started once per service.
    pub fn start_message_cleaner(
        &self,
        cancel: CancellationToken,
    ) -> Result<MessageCleaner, CleanerError> {
        if self
            .cleaner_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CleanerError::AlreadyStarted);
        }

        let mut subscription = match self.bus.subscribe(&[EventKind::RoomDeleted]) {
            Ok(subscription) => subscription,
            Err(_) => {
                self.cleaner_started.store(false, Ordering::Release);
                return Err(CleanerError::BusClosed);
            }
        };

        let store = self.store.clone();
        let token = cancel.child_token();
        let loop_token = token.clone();

        let task = tokio::spawn(async move {
            tracing::info!("Message cleaner started");
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    event = subscription.recv() => {
                        let Some(event) = event else { break };
                        if let EventPayload::RoomDeleted(deleted) = event.payload() {
                            match store.soft_delete_room_messages(deleted.room_id).await {
                                Ok(count) => tracing::debug!(
                                    room_id = deleted.room_id,
                                    count,
                                    "Soft-deleted messages of deleted room"
                                ),
                                Err(e) => tracing::error!(
                                    room_id = deleted.room_id,
                                    error = %e,
                                    "Failed to soft-delete room messages"
                                ),
                            }
                        }
                    }
                }
            }
            drop(subscription);
            tracing::info!("Message cleaner stopped");
        });

        Ok(MessageCleaner { token, task })
    }
}

/// Handle to the running message cleaner.
pub struct MessageCleaner {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl MessageCleaner {
    /// Stop the cleaner and wait for it to release its subscription.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Message cleaner task failed");
        }
    }

    /// Wait for the cleaner to end on its own (cancellation or bus shutdown).
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Message cleaner task failed");
        }
    }
}

async fn load_user(tx: &mut dyn Transaction, id: u64) -> Result<User, CommandError> {
    tx.find_user(id)
        .await?
        .ok_or_else(|| CommandError::NotFound(format!("User {}", id)))
}

async fn load_room(tx: &mut dyn Transaction, id: u64) -> Result<Room, CommandError> {
    tx.find_room(id)
        .await?
        .ok_or_else(|| CommandError::NotFound(format!("Room {}", id)))
}
