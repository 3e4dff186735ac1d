//! In-memory Store
//!
//! A [`Store`] kept entirely in process memory, used for development and
//! tests when no database URL is configured.
//!
//! Readers take a shared lock on the tables. Writers are serialized by an
//! async mutex held for the whole transaction. A transaction stages its
//! writes and applies only those on commit. IDs are drawn from shared
//! sequences when a row is staged, so a rolled-back transaction leaves a gap
//! the way a database sequence does.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::events::{Event, EventKind, Stream};
use crate::domain::{Message, Room, Store, Transaction, User};
use crate::shared::error::AppError;

/// An appended event log entry.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub id: u64,
    pub kind: EventKind,
    pub stream: Stream,
    pub payload: serde_json::Value,
    pub occurs_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<u64, User>,
    rooms: BTreeMap<u64, Room>,
    messages: BTreeMap<u64, Message>,
    reads: HashMap<(u64, u64), DateTime<Utc>>,
    events: Vec<StoredEvent>,
    last_user_id: u64,
    last_room_id: u64,
    last_message_id: u64,
    last_event_id: u64,
}

fn next_id(last: &mut u64) -> u64 {
    *last += 1;
    *last
}

impl Tables {
    fn put_user(&mut self, mut user: User) -> u64 {
        if user.id == 0 {
            user.id = next_id(&mut self.last_user_id);
        } else {
            self.last_user_id = self.last_user_id.max(user.id);
        }
        user.take_events();
        let id = user.id;
        self.users.insert(id, user);
        id
    }

    fn put_room(&mut self, mut room: Room) -> u64 {
        if room.id == 0 {
            room.id = next_id(&mut self.last_room_id);
        } else {
            self.last_room_id = self.last_room_id.max(room.id);
        }
        room.take_events();
        let id = room.id;
        self.rooms.insert(id, room);
        id
    }

    fn put_message(&mut self, mut message: Message) -> u64 {
        if message.id == 0 {
            message.id = next_id(&mut self.last_message_id);
        } else {
            self.last_message_id = self.last_message_id.max(message.id);
        }
        message.take_events();
        let id = message.id;
        self.messages.insert(id, message);
        id
    }

    fn is_unread(&self, message: &Message, room_id: u64, user_id: u64) -> bool {
        if message.room_id != room_id || message.deleted || message.user_id == user_id {
            return false;
        }
        match self.reads.get(&(room_id, user_id)) {
            Some(read_at) => message.created_at > *read_at,
            None => true,
        }
    }
}

/// Process-local store. Cloning shares the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    writer: Arc<Mutex<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user. A zero ID is replaced by the next free one.
    ///
    /// Seeders write straight to the shared tables. They never conflict with
    /// an open transaction's IDs and are not undone by its commit.
    pub fn insert_user(&self, user: User) -> u64 {
        self.tables.write().put_user(user)
    }

    /// Seed a room. A zero ID is replaced by the next free one.
    pub fn insert_room(&self, room: Room) -> u64 {
        self.tables.write().put_room(room)
    }

    /// Seed a message. A zero ID is replaced by the next free one.
    pub fn insert_message(&self, message: Message) -> u64 {
        self.tables.write().put_message(message)
    }

    /// Snapshot of the event log.
    pub fn events(&self) -> Vec<StoredEvent> {
        self.tables.read().events.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user(&self, id: u64) -> Result<Option<User>, AppError> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn find_users(&self, ids: &[u64]) -> Result<Vec<User>, AppError> {
        let tables = self.tables.read();
        Ok(ids
            .iter()
            .filter_map(|id| tables.users.get(id).cloned())
            .collect())
    }

    async fn find_room(&self, id: u64) -> Result<Option<Room>, AppError> {
        Ok(self.tables.read().rooms.get(&id).cloned())
    }

    async fn find_user_rooms(&self, user_id: u64) -> Result<Vec<Room>, AppError> {
        Ok(self
            .tables
            .read()
            .rooms
            .values()
            .filter(|room| room.has_member(user_id))
            .cloned()
            .collect())
    }

    async fn find_room_messages(
        &self,
        room_id: u64,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Message>, AppError> {
        let tables = self.tables.read();
        let mut messages: Vec<Message> = tables
            .messages
            .values()
            .filter(|m| m.room_id == room_id && !m.deleted)
            .filter(|m| before.map_or(true, |before| m.created_at < before))
            .cloned()
            .collect();
        messages.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        messages.truncate(limit);
        Ok(messages)
    }

    async fn find_unread_messages(
        &self,
        room_id: u64,
        user_id: u64,
        limit: usize,
    ) -> Result<Vec<Message>, AppError> {
        let tables = self.tables.read();
        let mut messages: Vec<Message> = tables
            .messages
            .values()
            .filter(|m| tables.is_unread(m, room_id, user_id))
            .cloned()
            .collect();
        messages.sort_by_key(|m| (m.created_at, m.id));
        messages.truncate(limit);
        Ok(messages)
    }

    async fn count_unread(&self, room_id: u64, user_id: u64) -> Result<u64, AppError> {
        let tables = self.tables.read();
        Ok(tables
            .messages
            .values()
            .filter(|m| tables.is_unread(m, room_id, user_id))
            .count() as u64)
    }

    async fn soft_delete_room_messages(&self, room_id: u64) -> Result<u64, AppError> {
        let _writer = self.writer.lock().await;
        let mut tables = self.tables.write();
        let mut count = 0;
        for message in tables.messages.values_mut() {
            if message.room_id == room_id && !message.deleted {
                message.deleted = true;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, AppError> {
        let guard = self.writer.clone().lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            tables: self.tables.clone(),
            staged: Staged::default(),
            _writer: guard,
        }))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Writes recorded by a transaction, applied to the shared tables on commit.
#[derive(Default)]
struct Staged {
    users: BTreeMap<u64, User>,
    /// `None` marks a deleted room.
    rooms: BTreeMap<u64, Option<Room>>,
    messages: Vec<Message>,
    reads: Vec<((u64, u64), DateTime<Utc>)>,
    events: Vec<StoredEvent>,
}

/// Write transaction. Reads see the transaction's own staged writes first,
/// then the shared tables.
pub struct MemoryTransaction {
    tables: Arc<RwLock<Tables>>,
    staged: Staged,
    _writer: OwnedMutexGuard<()>,
}

impl MemoryTransaction {
    fn current_user(&self, id: u64) -> Option<User> {
        match self.staged.users.get(&id) {
            Some(user) => Some(user.clone()),
            None => self.tables.read().users.get(&id).cloned(),
        }
    }

    fn current_room(&self, id: u64) -> Option<Room> {
        match self.staged.rooms.get(&id) {
            Some(room) => room.clone(),
            None => self.tables.read().rooms.get(&id).cloned(),
        }
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn find_user(&mut self, id: u64) -> Result<Option<User>, AppError> {
        Ok(self.current_user(id))
    }

    async fn find_room(&mut self, id: u64) -> Result<Option<Room>, AppError> {
        Ok(self.current_room(id))
    }

    async fn insert_room(&mut self, room: &Room) -> Result<u64, AppError> {
        let mut room = room.clone();
        room.take_events();
        room.id = next_id(&mut self.tables.write().last_room_id);
        let id = room.id;
        self.staged.rooms.insert(id, Some(room));
        Ok(id)
    }

    async fn update_room_members(&mut self, room: &Room) -> Result<(), AppError> {
        let mut stored = self
            .current_room(room.id)
            .ok_or_else(|| AppError::NotFound(format!("Room {} not found", room.id)))?;
        stored.member_ids = room.member_ids.clone();
        self.staged.rooms.insert(room.id, Some(stored));
        Ok(())
    }

    async fn delete_room(&mut self, room_id: u64) -> Result<(), AppError> {
        self.staged.rooms.insert(room_id, None);
        Ok(())
    }

    async fn update_user_friends(&mut self, user: &User) -> Result<(), AppError> {
        let mut stored = self
            .current_user(user.id)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.id)))?;
        stored.friend_ids = user.friend_ids.clone();
        self.staged.users.insert(user.id, stored);
        Ok(())
    }

    async fn insert_message(&mut self, message: &Message) -> Result<u64, AppError> {
        let mut message = message.clone();
        message.take_events();
        message.id = next_id(&mut self.tables.write().last_message_id);
        let id = message.id;
        self.staged.messages.push(message);
        Ok(id)
    }

    async fn mark_room_read(
        &mut self,
        room_id: u64,
        user_id: u64,
        read_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.staged.reads.push(((room_id, user_id), read_at));
        Ok(())
    }

    async fn append_events(&mut self, events: &[Event]) -> Result<(), AppError> {
        for event in events {
            let payload = serde_json::to_value(event.payload())
                .map_err(|e| AppError::Internal(format!("Failed to encode event: {}", e)))?;
            let id = next_id(&mut self.tables.write().last_event_id);
            self.staged.events.push(StoredEvent {
                id,
                kind: event.kind(),
                stream: event.stream(),
                payload,
                occurs_at: event.occurs_at(),
            });
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryTransaction {
            tables,
            staged,
            _writer,
        } = *self;

        let mut tables = tables.write();
        tables.users.extend(staged.users);
        for message in staged.messages {
            tables.messages.insert(message.id, message);
        }
        tables.reads.extend(staged.reads);
        for (id, room) in staged.rooms {
            match room {
                Some(room) => {
                    tables.rooms.insert(id, room);
                }
                None => {
                    tables.rooms.remove(&id);
                    tables.reads.retain(|(room_id, _), _| *room_id != id);
                }
            }
        }
        tables.events.extend(staged.events);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        Ok(())
    }
}
