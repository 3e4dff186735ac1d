//! WebSocket Gateway
//!
//! Real-time communication: connections, the hub task and its client and
//! room managers, and the wire encoding of events.

pub mod client_manager;
pub mod conn;
pub mod error;
pub mod handler;
pub mod hub;
pub mod messages;
pub mod room_manager;

pub use client_manager::{ActiveClient, ClientManager, Connected, MAX_CONNS};
pub use conn::{ChannelConn, Conn, ConnError, ConnId};
pub use error::HubError;
pub use handler::ws_handler;
pub use hub::{Hub, HubHandle};
pub use messages::{encode_event, EncodedEvent};
pub use room_manager::{ActiveRoom, RoomManager};
