//! Domain events.
//!
//! Every state change the command pipeline performs is described by an
//! [`Event`]. Events are immutable: the payload and the `occurs_at`
//! timestamp are fixed when the event is created.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Discriminant of an [`EventPayload`], used for bus subscriptions and the
/// wire tag table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    UserCreated,
    UserAddedFriend,
    RoomCreated,
    RoomDeleted,
    RoomAddedMember,
    RoomRemovedMember,
    RoomMessagesReadByUser,
    MessageCreated,
    MessageReadByUser,
    ActiveClientActivated,
    ActiveClientInactivated,
    TypingStarted,
    TypingEnded,
    ErrorRaised,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 14] = [
        EventKind::UserCreated,
        EventKind::UserAddedFriend,
        EventKind::RoomCreated,
        EventKind::RoomDeleted,
        EventKind::RoomAddedMember,
        EventKind::RoomRemovedMember,
        EventKind::RoomMessagesReadByUser,
        EventKind::MessageCreated,
        EventKind::MessageReadByUser,
        EventKind::ActiveClientActivated,
        EventKind::ActiveClientInactivated,
        EventKind::TypingStarted,
        EventKind::TypingEnded,
        EventKind::ErrorRaised,
    ];

    /// Storage representation (`events.kind` column).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserCreated => "user_created",
            Self::UserAddedFriend => "user_added_friend",
            Self::RoomCreated => "room_created",
            Self::RoomDeleted => "room_deleted",
            Self::RoomAddedMember => "room_added_member",
            Self::RoomRemovedMember => "room_removed_member",
            Self::RoomMessagesReadByUser => "room_messages_read_by_user",
            Self::MessageCreated => "message_created",
            Self::MessageReadByUser => "message_read_by_user",
            Self::ActiveClientActivated => "active_client_activated",
            Self::ActiveClientInactivated => "active_client_inactivated",
            Self::TypingStarted => "typing_started",
            Self::TypingEnded => "typing_ended",
            Self::ErrorRaised => "error_raised",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Logical partition an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    User(u64),
    Room(u64),
    Message(u64),
    None,
}

impl Stream {
    /// Stream type name and entity id, as stored in the event log.
    pub fn parts(&self) -> (&'static str, Option<u64>) {
        match *self {
            Stream::User(id) => ("user", Some(id)),
            Stream::Room(id) => ("room", Some(id)),
            Stream::Message(id) => ("message", Some(id)),
            Stream::None => ("none", None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserCreated {
    pub user_id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserAddedFriend {
    pub user_id: u64,
    pub friend_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomCreated {
    pub room_id: u64,
    pub name: String,
    pub is_talk_room: bool,
    pub created_by: u64,
    pub member_ids: Vec<u64>,
}

/// Carries the member list because the room no longer exists once this is
/// delivered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomDeleted {
    pub room_id: u64,
    pub name: String,
    pub deleted_by: u64,
    pub member_ids: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomAddedMember {
    pub room_id: u64,
    pub user_id: u64,
    pub added_by: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomRemovedMember {
    pub room_id: u64,
    pub user_id: u64,
    pub removed_by: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomMessagesReadByUser {
    pub room_id: u64,
    pub user_id: u64,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageCreated {
    pub message_id: u64,
    pub room_id: u64,
    pub user_id: u64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageReadByUser {
    pub message_id: u64,
    pub user_id: u64,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveClientActivated {
    pub user_id: u64,
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveClientInactivated {
    pub user_id: u64,
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypingStarted {
    pub room_id: u64,
    pub user_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypingEnded {
    pub room_id: u64,
    pub user_id: u64,
}

/// An error reported back to a single connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRaised {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<serde_json::Value>,
}

/// Closed set of event payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    UserCreated(UserCreated),
    UserAddedFriend(UserAddedFriend),
    RoomCreated(RoomCreated),
    RoomDeleted(RoomDeleted),
    RoomAddedMember(RoomAddedMember),
    RoomRemovedMember(RoomRemovedMember),
    RoomMessagesReadByUser(RoomMessagesReadByUser),
    MessageCreated(MessageCreated),
    MessageReadByUser(MessageReadByUser),
    ActiveClientActivated(ActiveClientActivated),
    ActiveClientInactivated(ActiveClientInactivated),
    TypingStarted(TypingStarted),
    TypingEnded(TypingEnded),
    ErrorRaised(ErrorRaised),
}

macro_rules! payload_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for EventPayload {
                fn from(payload: $variant) -> Self {
                    EventPayload::$variant(payload)
                }
            }
        )*
    };
}

payload_from!(
    UserCreated,
    UserAddedFriend,
    RoomCreated,
    RoomDeleted,
    RoomAddedMember,
    RoomRemovedMember,
    RoomMessagesReadByUser,
    MessageCreated,
    MessageReadByUser,
    ActiveClientActivated,
    ActiveClientInactivated,
    TypingStarted,
    TypingEnded,
    ErrorRaised,
);

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::UserCreated(_) => EventKind::UserCreated,
            EventPayload::UserAddedFriend(_) => EventKind::UserAddedFriend,
            EventPayload::RoomCreated(_) => EventKind::RoomCreated,
            EventPayload::RoomDeleted(_) => EventKind::RoomDeleted,
            EventPayload::RoomAddedMember(_) => EventKind::RoomAddedMember,
            EventPayload::RoomRemovedMember(_) => EventKind::RoomRemovedMember,
            EventPayload::RoomMessagesReadByUser(_) => EventKind::RoomMessagesReadByUser,
            EventPayload::MessageCreated(_) => EventKind::MessageCreated,
            EventPayload::MessageReadByUser(_) => EventKind::MessageReadByUser,
            EventPayload::ActiveClientActivated(_) => EventKind::ActiveClientActivated,
            EventPayload::ActiveClientInactivated(_) => EventKind::ActiveClientInactivated,
            EventPayload::TypingStarted(_) => EventKind::TypingStarted,
            EventPayload::TypingEnded(_) => EventKind::TypingEnded,
            EventPayload::ErrorRaised(_) => EventKind::ErrorRaised,
        }
    }

    pub fn stream(&self) -> Stream {
        match self {
            EventPayload::UserCreated(e) => Stream::User(e.user_id),
            EventPayload::UserAddedFriend(e) => Stream::User(e.user_id),
            EventPayload::RoomCreated(e) => Stream::Room(e.room_id),
            EventPayload::RoomDeleted(e) => Stream::Room(e.room_id),
            EventPayload::RoomAddedMember(e) => Stream::Room(e.room_id),
            EventPayload::RoomRemovedMember(e) => Stream::Room(e.room_id),
            EventPayload::RoomMessagesReadByUser(e) => Stream::Room(e.room_id),
            EventPayload::MessageCreated(e) => Stream::Message(e.message_id),
            EventPayload::MessageReadByUser(e) => Stream::Message(e.message_id),
            EventPayload::ActiveClientActivated(e) => Stream::User(e.user_id),
            EventPayload::ActiveClientInactivated(e) => Stream::User(e.user_id),
            EventPayload::TypingStarted(e) => Stream::Room(e.room_id),
            EventPayload::TypingEnded(e) => Stream::Room(e.room_id),
            EventPayload::ErrorRaised(_) => Stream::None,
        }
    }
}

/// An immutable domain event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    occurs_at: DateTime<Utc>,
    payload: EventPayload,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(payload: impl Into<EventPayload>) -> Self {
        Self {
            occurs_at: Utc::now(),
            payload: payload.into(),
        }
    }

    pub fn occurs_at(&self) -> DateTime<Utc> {
        self.occurs_at
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn stream(&self) -> Stream {
        self.payload.stream()
    }
}
