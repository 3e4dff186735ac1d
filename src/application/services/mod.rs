//! Application Services
//!
//! ## Available Services
//!
//! - **CommandService**: Transactional use-cases that mutate state and emit events
//! - **QueryService**: Read-only projections for REST and hub bootstrap

pub mod command_service;
pub mod query_service;

// Re-export command service types
pub use command_service::{CleanerError, CommandError, CommandService, MessageCleaner};

// Re-export query service types
pub use query_service::{
    QueryError, QueryService, RelationQuery, RoomInfo, UnreadMessages, UserRelation,
    DEFAULT_MESSAGE_LIMIT, MAX_MESSAGE_LIMIT,
};

#[cfg(test)]
pub use query_service::MockRelationQuery;
