//! # Domain Layer
//!
//! The domain layer contains the core rules of the chat hub.
//! It is independent of any external frameworks or infrastructure concerns.
//!
//! ## Structure
//!
//! - **entities**: Users, rooms and messages
//! - **events**: Immutable domain events recorded by entity mutations
//! - **repository**: Storage contracts implemented by the infrastructure layer
//!
//! ## Design Principles
//!
//! - No dependencies on infrastructure or presentation layers
//! - Mutating methods record the event they caused on the entity
//! - The command service persists and publishes those events

pub mod entities;
pub mod error;
pub mod events;
pub mod repository;

// Re-export commonly used types
pub use entities::*;
pub use error::DomainError;
pub use events::{Event, EventKind, EventPayload, Stream};
pub use repository::{Store, Transaction};
