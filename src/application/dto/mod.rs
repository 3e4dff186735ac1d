//! Data Transfer Objects
//!
//! DTOs for inbound actions, REST requests and API response serialization.

pub mod actions;
pub mod request;
pub mod response;

pub use actions::{
    ActionError, ActionMessage, AddFriend, AddRoomMember, ChatMessage, CreateRoom, DeleteRoom,
    ReadMessage, RemoveRoomMember, TypeEnd, TypeStart,
};
