//! Hub errors.

use crate::application::services::{CommandError, QueryError};

use super::conn::ConnId;

/// Failures inside the hub and its managers.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("User {user_id} exceeds the limit of {max} connections")]
    ExceedsConnLimit { user_id: u64, max: usize },

    #[error("Connection {conn_id} is not registered for user {user_id}")]
    ConnNotRegistered { conn_id: ConnId, user_id: u64 },

    #[error("User {user_id} has not joined room {room_id}")]
    RoomNotJoined { user_id: u64, room_id: u64 },

    #[error("User {0} is not connected")]
    ClientNotFound(u64),

    #[error("Failed to load relations: {0}")]
    Relation(#[from] QueryError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Hub is closed")]
    Closed,
}

impl HubError {
    /// Message safe to show to a client.
    pub fn client_message(&self) -> String {
        match self {
            HubError::Command(e) => e.client_message(),
            HubError::Relation(QueryError::Internal(_)) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}
