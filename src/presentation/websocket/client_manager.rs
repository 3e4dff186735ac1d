//! Client Manager
//!
//! Tracks connected users and their live connections. Owned by the hub
//! task; never shared.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::application::services::RelationQuery;
use crate::domain::events::{ActiveClientActivated, ActiveClientInactivated, Event};
use crate::domain::Room;
use crate::infrastructure::metrics;

use super::conn::{Conn, ConnId};
use super::error::HubError;
use super::messages::{encode_event, EncodedEvent};

/// Maximum simultaneous connections per user
pub const MAX_CONNS: usize = 16;

/// A connected user.
pub struct ActiveClient {
    pub user_id: u64,
    pub user_name: String,
    conns: HashMap<ConnId, Arc<dyn Conn>>,
    pub friend_ids: HashSet<u64>,
    pub room_ids: HashSet<u64>,
}

impl ActiveClient {
    pub fn connection_count(&self) -> usize {
        self.conns.len()
    }

    pub fn has_conn(&self, conn_id: ConnId) -> bool {
        self.conns.contains_key(&conn_id)
    }

    fn send(&self, frame: &EncodedEvent) {
        for conn in self.conns.values() {
            if let Err(e) = conn.send(frame.clone()) {
                tracing::debug!(
                    user_id = self.user_id,
                    conn_id = %conn.id(),
                    error = %e,
                    "Dropped outbound frame"
                );
            }
        }
    }

    fn close(&self) {
        for conn in self.conns.values() {
            conn.close();
        }
    }
}

impl std::fmt::Debug for ActiveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveClient")
            .field("user_id", &self.user_id)
            .field("user_name", &self.user_name)
            .field("conns", &self.conns.len())
            .field("friend_ids", &self.friend_ids)
            .field("room_ids", &self.room_ids)
            .finish()
    }
}

/// Outcome of registering a connection.
#[derive(Debug)]
pub enum Connected {
    /// The user was already active; the connection was added.
    Attached,
    /// First connection of the user; carries the rooms to activate.
    Activated { rooms: Vec<Room> },
}

/// Active clients keyed by user ID.
pub struct ClientManager {
    clients: HashMap<u64, ActiveClient>,
    relations: Arc<dyn RelationQuery>,
}

impl ClientManager {
    pub fn new(relations: Arc<dyn RelationQuery>) -> Self {
        Self {
            clients: HashMap::new(),
            relations,
        }
    }

    /// Register a connection.
    ///
    /// The first connection of a user loads their relations and announces
    /// them to connected friends.
    pub async fn connect(&mut self, conn: Arc<dyn Conn>) -> Result<Connected, HubError> {
        let user_id = conn.user_id();

        if let Some(client) = self.clients.get_mut(&user_id) {
            if client.conns.len() >= MAX_CONNS {
                return Err(HubError::ExceedsConnLimit {
                    user_id,
                    max: MAX_CONNS,
                });
            }
            client.conns.insert(conn.id(), conn);
            tracing::debug!(
                user_id,
                conns = client.conns.len(),
                "Connection attached to active client"
            );
            return Ok(Connected::Attached);
        }

        let relation = self.relations.find_user_relation(user_id).await?;

        let mut conns: HashMap<ConnId, Arc<dyn Conn>> = HashMap::new();
        conns.insert(conn.id(), conn);
        let client = ActiveClient {
            user_id,
            user_name: relation.user.name.clone(),
            conns,
            friend_ids: relation.user.friend_ids.iter().copied().collect(),
            room_ids: relation.rooms.iter().map(|room| room.id).collect(),
        };

        let announcement = Event::new(ActiveClientActivated {
            user_id,
            user_name: client.user_name.clone(),
        });
        let friends: Vec<u64> = client.friend_ids.iter().copied().collect();

        self.clients.insert(user_id, client);
        metrics::ACTIVE_CLIENTS.set(self.clients.len() as i64);
        tracing::info!(user_id, "Client activated");

        self.broadcast_to_users(friends, &announcement);

        Ok(Connected::Activated {
            rooms: relation.rooms,
        })
    }

    /// Unregister a connection. Returns the client when it was the last one.
    pub fn disconnect(&mut self, conn: &dyn Conn) -> Option<ActiveClient> {
        let user_id = conn.user_id();
        let Some(client) = self.clients.get_mut(&user_id) else {
            tracing::debug!(user_id, conn_id = %conn.id(), "Disconnect for inactive user");
            return None;
        };

        if client.conns.remove(&conn.id()).is_none() {
            tracing::debug!(user_id, conn_id = %conn.id(), "Disconnect for unknown connection");
            return None;
        }
        if !client.conns.is_empty() {
            return None;
        }

        let client = self.clients.remove(&user_id)?;
        metrics::ACTIVE_CLIENTS.set(self.clients.len() as i64);
        tracing::info!(user_id, "Client inactivated");

        let announcement = Event::new(ActiveClientInactivated {
            user_id,
            user_name: client.user_name.clone(),
        });
        let friends: Vec<u64> = client.friend_ids.iter().copied().collect();
        self.broadcast_to_users(friends, &announcement);

        Some(client)
    }

    /// Check that `conn_id` is a registered connection of `user_id`.
    pub fn validate_conn(&self, conn_id: ConnId, user_id: u64) -> Result<&ActiveClient, HubError> {
        let client = self
            .clients
            .get(&user_id)
            .ok_or(HubError::ClientNotFound(user_id))?;

        if !client.has_conn(conn_id) {
            return Err(HubError::ConnNotRegistered { conn_id, user_id });
        }
        Ok(client)
    }

    /// Check that `conn_id` belongs to `user_id` and that the user is in `room_id`.
    pub fn validate_client_has_room(
        &self,
        conn_id: ConnId,
        user_id: u64,
        room_id: u64,
    ) -> Result<(), HubError> {
        let client = self.validate_conn(conn_id, user_id)?;
        if !client.room_ids.contains(&room_id) {
            return Err(HubError::RoomNotJoined { user_id, room_id });
        }
        Ok(())
    }

    /// Send `event` to every connection of every active user in `user_ids`.
    pub fn broadcast_to_users(&self, user_ids: impl IntoIterator<Item = u64>, event: &Event) {
        let frame = match encode_event(event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(kind = %event.kind(), error = %e, "Failed to encode event");
                return;
            }
        };

        let mut seen = HashSet::new();
        for user_id in user_ids {
            if !seen.insert(user_id) {
                continue;
            }
            if let Some(client) = self.clients.get(&user_id) {
                client.send(&frame);
            }
        }
    }

    /// Send `event` to one connection only.
    pub fn send_to_conn(&self, conn: &dyn Conn, event: &Event) {
        match encode_event(event) {
            Ok(frame) => {
                if let Err(e) = conn.send(frame) {
                    tracing::debug!(conn_id = %conn.id(), error = %e, "Dropped outbound frame");
                }
            }
            Err(e) => tracing::error!(kind = %event.kind(), error = %e, "Failed to encode event"),
        }
    }

    /// Record that an active user joined a room. Returns false if inactive.
    pub fn join_room(&mut self, user_id: u64, room_id: u64) -> bool {
        match self.clients.get_mut(&user_id) {
            Some(client) => {
                client.room_ids.insert(room_id);
                true
            }
            None => false,
        }
    }

    /// Record that a user left a room. Returns false if inactive.
    pub fn leave_room(&mut self, user_id: u64, room_id: u64) -> bool {
        match self.clients.get_mut(&user_id) {
            Some(client) => {
                client.room_ids.remove(&room_id);
                true
            }
            None => false,
        }
    }

    /// Record a new friendship for an active user.
    pub fn add_friend(&mut self, user_id: u64, friend_id: u64) {
        if let Some(client) = self.clients.get_mut(&user_id) {
            client.friend_ids.insert(friend_id);
        }
    }

    pub fn is_active(&self, user_id: u64) -> bool {
        self.clients.contains_key(&user_id)
    }

    pub fn get(&self, user_id: u64) -> Option<&ActiveClient> {
        self.clients.get(&user_id)
    }

    /// Live connections of a user; 0 if inactive.
    pub fn connection_count(&self, user_id: u64) -> usize {
        self.clients
            .get(&user_id)
            .map(ActiveClient::connection_count)
            .unwrap_or(0)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Close every registered connection and forget all clients.
    pub fn close_all(&mut self) {
        for client in self.clients.values() {
            client.close();
        }
        self.clients.clear();
        metrics::ACTIVE_CLIENTS.set(0);
    }
}
