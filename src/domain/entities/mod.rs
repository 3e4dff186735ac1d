//! # Domain Entities
//!
//! All entities map directly to their corresponding database tables.
//!
//! - **User**: account with display fields and friend set
//! - **Room**: group or one-to-one (talk) room with its member set
//! - **Message**: text posted in a room, soft-deleted with the room

mod message;
mod room;
mod user;

pub use message::Message;
pub use room::Room;
pub use user::User;
