//! Room entity.
//!
//! Maps to the `rooms` and `room_members` tables in the database schema.
//! Every mutating method records the domain event it caused; the command
//! service drains them with [`Room::take_events`] once the change is stored.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::domain::error::DomainError;
use crate::domain::events::{
    Event, RoomAddedMember, RoomCreated, RoomDeleted, RoomMessagesReadByUser, RoomRemovedMember,
};

use super::User;

/// Represents a chat room.
///
/// Maps to the `rooms` table:
/// - id: BIGSERIAL PRIMARY KEY
/// - name: TEXT NOT NULL
/// - is_talk_room: BOOLEAN NOT NULL DEFAULT FALSE
/// - owner_id: BIGINT NOT NULL REFERENCES users(id)
/// - created_at: TIMESTAMPTZ NOT NULL DEFAULT NOW()
#[derive(Debug, Clone)]
pub struct Room {
    /// Auto-incremented ID (primary key), 0 until stored
    pub id: u64,

    pub name: String,

    /// One-to-one conversation between exactly two users
    pub is_talk_room: bool,

    /// Creator of the room; the only user allowed to delete it
    pub owner_id: u64,

    /// Current members, always including the owner
    pub member_ids: BTreeSet<u64>,

    pub created_at: DateTime<Utc>,

    events: Vec<Event>,
}

impl Room {
    /// Build a new room owned by `owner`. The owner is always a member.
    pub fn new(
        name: impl Into<String>,
        owner: &User,
        member_ids: impl IntoIterator<Item = u64>,
        is_talk_room: bool,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::EmptyRoomName);
        }

        let mut members: BTreeSet<u64> = member_ids.into_iter().collect();
        members.insert(owner.id);

        if is_talk_room && members.len() != 2 {
            return Err(DomainError::InvalidTalkRoom(members.len()));
        }

        Ok(Self {
            id: 0,
            name,
            is_talk_room,
            owner_id: owner.id,
            member_ids: members,
            created_at: Utc::now(),
            events: Vec::new(),
        })
    }

    /// Rebuild a stored room without validation or events.
    pub fn from_parts(
        id: u64,
        name: String,
        is_talk_room: bool,
        owner_id: u64,
        member_ids: BTreeSet<u64>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            is_talk_room,
            owner_id,
            member_ids,
            created_at,
            events: Vec::new(),
        }
    }

    /// Assign the storage ID and record `RoomCreated`.
    pub fn mark_created(&mut self, id: u64) {
        self.id = id;
        self.events.push(Event::new(RoomCreated {
            room_id: id,
            name: self.name.clone(),
            is_talk_room: self.is_talk_room,
            created_by: self.owner_id,
            member_ids: self.member_ids.iter().copied().collect(),
        }));
    }

    pub fn has_member(&self, user_id: u64) -> bool {
        self.member_ids.contains(&user_id)
    }

    /// Check that `user_id` belongs to the room.
    pub fn ensure_member(&self, user_id: u64) -> Result<(), DomainError> {
        if self.has_member(user_id) {
            Ok(())
        } else {
            Err(DomainError::NotRoomMember {
                room_id: self.id,
                user_id,
            })
        }
    }

    /// Mark the room deleted by `by`, recording `RoomDeleted`.
    pub fn delete(&mut self, by: &User) -> Result<(), DomainError> {
        if by.id != self.owner_id {
            return Err(DomainError::NotRoomOwner { room_id: self.id });
        }

        self.events.push(Event::new(RoomDeleted {
            room_id: self.id,
            name: self.name.clone(),
            deleted_by: by.id,
            member_ids: self.member_ids.iter().copied().collect(),
        }));
        Ok(())
    }

    /// Add `user` on behalf of the member `by`, recording `RoomAddedMember`.
    pub fn add_member(&mut self, by: &User, user: &User) -> Result<(), DomainError> {
        self.ensure_member(by.id)?;
        if self.is_talk_room {
            return Err(DomainError::InvalidTalkRoom(self.member_ids.len() + 1));
        }
        if !self.member_ids.insert(user.id) {
            return Err(DomainError::AlreadyRoomMember {
                room_id: self.id,
                user_id: user.id,
            });
        }

        self.events.push(Event::new(RoomAddedMember {
            room_id: self.id,
            user_id: user.id,
            added_by: by.id,
        }));
        Ok(())
    }

    /// Remove `user_id`, recording `RoomRemovedMember`.
    ///
    /// Only the owner may remove others; any member may leave. The owner
    /// cannot be removed.
    pub fn remove_member(&mut self, by: &User, user_id: u64) -> Result<(), DomainError> {
        if user_id == self.owner_id {
            return Err(DomainError::CannotRemoveOwner { room_id: self.id });
        }
        if by.id != self.owner_id && by.id != user_id {
            return Err(DomainError::NotRoomOwner { room_id: self.id });
        }
        if !self.member_ids.remove(&user_id) {
            return Err(DomainError::NotRoomMember {
                room_id: self.id,
                user_id,
            });
        }

        self.events.push(Event::new(RoomRemovedMember {
            room_id: self.id,
            user_id,
            removed_by: by.id,
        }));
        Ok(())
    }

    /// Record that `user` read every message up to `read_at`.
    pub fn read_messages_by(
        &mut self,
        user: &User,
        read_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_member(user.id)?;

        self.events.push(Event::new(RoomMessagesReadByUser {
            room_id: self.id,
            user_id: user.id,
            read_at,
        }));
        Ok(())
    }

    /// Events recorded since the last drain.
    pub fn pending_events(&self) -> &[Event] {
        &self.events
    }

    /// Drain recorded events.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{EventKind, EventPayload};

    fn user(id: u64) -> User {
        let mut user = User::new(format!("user{}", id));
        user.id = id;
        user
    }

    fn stored_room(owner: &User, members: &[u64]) -> Room {
        let mut room = Room::new("general", owner, members.iter().copied(), false).unwrap();
        room.mark_created(3);
        room.take_events();
        room
    }

    // ==========================================================================
    // Creation
    // ==========================================================================

    #[test]
    fn test_new_room_includes_owner() {
        let owner = user(1);
        let room = Room::new("general", &owner, [2], false).unwrap();
        assert!(room.has_member(1));
        assert!(room.has_member(2));
        assert!(room.pending_events().is_empty());
    }

    #[test]
    fn test_new_room_rejects_blank_name() {
        let owner = user(1);
        let err = Room::new("   ", &owner, [2], false).unwrap_err();
        assert_eq!(err, DomainError::EmptyRoomName);
    }

    #[test]
    fn test_talk_room_needs_two_members() {
        let owner = user(1);
        assert!(Room::new("dm", &owner, [2], true).is_ok());
        assert_eq!(
            Room::new("dm", &owner, [2, 3], true).unwrap_err(),
            DomainError::InvalidTalkRoom(3)
        );
    }

    #[test]
    fn test_mark_created_records_event() {
        let owner = user(1);
        let mut room = Room::new("general", &owner, [2], false).unwrap();
        room.mark_created(3);

        assert_eq!(room.id, 3);
        let events = room.take_events();
        assert_eq!(events.len(), 1);
        match events[0].payload() {
            EventPayload::RoomCreated(e) => {
                assert_eq!(e.room_id, 3);
                assert_eq!(e.created_by, 1);
                assert_eq!(e.member_ids, vec![1, 2]);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    // ==========================================================================
    // Mutations
    // ==========================================================================

    #[test]
    fn test_delete_requires_owner() {
        let owner = user(1);
        let mut room = stored_room(&owner, &[2]);

        assert_eq!(
            room.delete(&user(2)),
            Err(DomainError::NotRoomOwner { room_id: 3 })
        );
        room.delete(&owner).unwrap();

        let events = room.take_events();
        assert_eq!(events[0].kind(), EventKind::RoomDeleted);
    }

    #[test]
    fn test_add_member() {
        let owner = user(1);
        let mut room = stored_room(&owner, &[2]);

        room.add_member(&user(2), &user(4)).unwrap();
        assert!(room.has_member(4));
        assert_eq!(room.take_events()[0].kind(), EventKind::RoomAddedMember);

        assert_eq!(
            room.add_member(&owner, &user(4)),
            Err(DomainError::AlreadyRoomMember {
                room_id: 3,
                user_id: 4
            })
        );
        assert_eq!(
            room.add_member(&user(9), &user(5)),
            Err(DomainError::NotRoomMember {
                room_id: 3,
                user_id: 9
            })
        );
    }

    #[test]
    fn test_remove_member_rules() {
        let owner = user(1);
        let mut room = stored_room(&owner, &[2, 3]);

        // Members other than the owner may only remove themselves.
        assert_eq!(
            room.remove_member(&user(2), 3),
            Err(DomainError::NotRoomOwner { room_id: 3 })
        );
        assert_eq!(
            room.remove_member(&owner, 1),
            Err(DomainError::CannotRemoveOwner { room_id: 3 })
        );

        room.remove_member(&user(2), 2).unwrap();
        room.remove_member(&owner, 3).unwrap();
        assert_eq!(room.member_ids.iter().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(room.take_events().len(), 2);
    }

    #[test]
    fn test_read_messages_requires_membership() {
        let owner = user(1);
        let mut room = stored_room(&owner, &[2]);
        let now = Utc::now();

        room.read_messages_by(&user(2), now).unwrap();
        assert!(room.read_messages_by(&user(5), now).is_err());

        let events = room.take_events();
        assert_eq!(events.len(), 1);
        match events[0].payload() {
            EventPayload::RoomMessagesReadByUser(e) => assert_eq!(e.read_at, now),
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
