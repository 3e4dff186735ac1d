//! Application Layer
//!
//! Contains the event bus, the command and query services, and the data
//! transfer objects exchanged with the presentation layer.

pub mod dto;
pub mod event_bus;
pub mod services;

pub use event_bus::{BusError, EventBus, Subscription};
