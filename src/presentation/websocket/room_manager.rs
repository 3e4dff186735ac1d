//! Room Manager
//!
//! Tracks rooms that have at least one connected member. Owned by the hub
//! task; never shared.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::domain::Room;
use crate::infrastructure::metrics;

/// A room with connected members.
#[derive(Debug, Clone)]
pub struct ActiveRoom {
    pub room_id: u64,
    pub name: String,
    pub member_ids: BTreeSet<u64>,
    active_members: HashSet<u64>,
}

impl ActiveRoom {
    fn from_room(room: &Room) -> Self {
        Self {
            room_id: room.id,
            name: room.name.clone(),
            member_ids: room.member_ids.clone(),
            active_members: HashSet::new(),
        }
    }

    /// Number of members currently connected.
    pub fn n_active_members(&self) -> usize {
        self.active_members.len()
    }

    pub fn is_active_member(&self, user_id: u64) -> bool {
        self.active_members.contains(&user_id)
    }
}

/// Active rooms keyed by room ID.
#[derive(Debug, Default)]
pub struct RoomManager {
    rooms: HashMap<u64, ActiveRoom>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `user_id` as active in each of `rooms`, activating rooms as needed.
    pub fn connect_client(&mut self, user_id: u64, rooms: &[Room]) {
        for room in rooms {
            self.activate(room, user_id);
        }
        self.update_gauge();
    }

    /// Stop counting `user_id` in each room. Rooms left without active
    /// members are evicted. Unknown rooms and users are ignored.
    pub fn disconnect_client(&mut self, user_id: u64, room_ids: impl IntoIterator<Item = u64>) {
        for room_id in room_ids {
            self.deactivate(room_id, user_id);
        }
        self.update_gauge();
    }

    /// Member list of an active room; empty if the room is not active.
    pub fn room_member_ids(&self, room_id: u64) -> Vec<u64> {
        self.rooms
            .get(&room_id)
            .map(|room| room.member_ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// A connected user joined `room`.
    pub fn join_room(&mut self, room: &Room, user_id: u64) {
        self.activate(room, user_id);
        if let Some(active) = self.rooms.get_mut(&room.id) {
            active.member_ids.insert(user_id);
        }
        self.update_gauge();
    }

    /// A user who is not connected joined an active room.
    pub fn add_member(&mut self, room_id: u64, user_id: u64) {
        if let Some(room) = self.rooms.get_mut(&room_id) {
            room.member_ids.insert(user_id);
        }
    }

    /// A user left the room, connected or not.
    pub fn leave_room(&mut self, room_id: u64, user_id: u64) {
        if let Some(room) = self.rooms.get_mut(&room_id) {
            room.member_ids.remove(&user_id);
        }
        self.deactivate(room_id, user_id);
        self.update_gauge();
    }

    /// The room no longer exists.
    pub fn remove_room(&mut self, room_id: u64) {
        if self.rooms.remove(&room_id).is_some() {
            tracing::debug!(room_id, "Active room removed");
        }
        self.update_gauge();
    }

    pub fn get(&self, room_id: u64) -> Option<&ActiveRoom> {
        self.rooms.get(&room_id)
    }

    /// Connected members of a room; 0 if the room is not active.
    pub fn n_active_members(&self, room_id: u64) -> usize {
        self.rooms
            .get(&room_id)
            .map(ActiveRoom::n_active_members)
            .unwrap_or(0)
    }

    pub fn active_room_count(&self) -> usize {
        self.rooms.len()
    }

    fn activate(&mut self, room: &Room, user_id: u64) {
        let active = self.rooms.entry(room.id).or_insert_with(|| {
            tracing::debug!(room_id = room.id, "Room activated");
            ActiveRoom::from_room(room)
        });
        active.active_members.insert(user_id);
    }

    fn deactivate(&mut self, room_id: u64, user_id: u64) {
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };
        room.active_members.remove(&user_id);
        if room.active_members.is_empty() {
            self.rooms.remove(&room_id);
            tracing::debug!(room_id, "Room evicted");
        }
    }

    fn update_gauge(&self) {
        metrics::ACTIVE_ROOMS.set(self.rooms.len() as i64);
    }
}
