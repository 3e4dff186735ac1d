//! Domain rule violations.

/// Rejected domain operation.
///
/// These are never retried; they are reported to the caller as a specific
/// failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Room name must not be empty")]
    EmptyRoomName,

    #[error("Talk room must have exactly two members, got {0}")]
    InvalidTalkRoom(usize),

    #[error("User {user_id} is not a member of room {room_id}")]
    NotRoomMember { room_id: u64, user_id: u64 },

    #[error("User {user_id} is already a member of room {room_id}")]
    AlreadyRoomMember { room_id: u64, user_id: u64 },

    #[error("Only the owner may do this in room {room_id}")]
    NotRoomOwner { room_id: u64 },

    #[error("The owner cannot be removed from room {room_id}")]
    CannotRemoveOwner { room_id: u64 },

    #[error("User {user_id} is already a friend of user {friend_id}")]
    AlreadyFriends { user_id: u64, friend_id: u64 },

    #[error("A user cannot befriend themselves")]
    SelfFriend,

    #[error("Message content must not be empty")]
    EmptyContent,
}

impl DomainError {
    /// Whether the rule is an authorization rule rather than input validation.
    pub fn is_permission(&self) -> bool {
        matches!(
            self,
            DomainError::NotRoomMember { .. }
                | DomainError::NotRoomOwner { .. }
                | DomainError::CannotRemoveOwner { .. }
        )
    }
}
