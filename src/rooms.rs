//! Room membership index: bidirectional mapping of room id <-> member user
//! ids. Rooms are created implicitly on first join and garbage-collected
//! when their member set empties; membership is independent of whether the
//! user currently has a live connection.

use dashmap::{DashMap, DashSet};

/// Owns both directions of the membership mapping. All mutation goes through
/// this type so the two maps stay consistent.
#[derive(Default)]
pub struct RoomIndex {
    room_users: DashMap<String, DashSet<String>>,
    user_rooms: DashMap<String, DashSet<String>>,
}

impl RoomIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user to a room. Idempotent; returns true if the user was not
    /// already a member.
    pub fn join(&self, user_id: &str, room_id: &str) -> bool {
        let added = self
            .room_users
            .entry(room_id.to_string())
            .or_default()
            .insert(user_id.to_string());
        self.user_rooms
            .entry(user_id.to_string())
            .or_default()
            .insert(room_id.to_string());
        added
    }

    /// Remove a user from a room. Returns true if the user was a member.
    /// An emptied room is deleted; rooms are not pre-declared.
    pub fn leave(&self, user_id: &str, room_id: &str) -> bool {
        let removed = self
            .room_users
            .get(room_id)
            .map(|set| set.remove(user_id).is_some())
            .unwrap_or(false);
        if let Some(set) = self.user_rooms.get(user_id) {
            set.remove(room_id);
        }

        self.room_users.remove_if(room_id, |_, set| set.is_empty());
        self.user_rooms.remove_if(user_id, |_, set| set.is_empty());

        removed
    }

    /// Current member set of a room. An unknown room is empty, not an error.
    pub fn members_of(&self, room_id: &str) -> Vec<String> {
        self.room_users
            .get(room_id)
            .map(|set| set.iter().map(|m| m.clone()).collect())
            .unwrap_or_default()
    }

    /// Rooms a user belongs to.
    pub fn rooms_of(&self, user_id: &str) -> Vec<String> {
        self.user_rooms
            .get(user_id)
            .map(|set| set.iter().map(|r| r.clone()).collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, user_id: &str, room_id: &str) -> bool {
        self.room_users
            .get(room_id)
            .map(|set| set.contains(user_id))
            .unwrap_or(false)
    }

    /// Remove a user from every room they belong to and return the affected
    /// rooms. Drives the presence-offline fan-out at disconnect; calling it
    /// again for the same user returns nothing.
    pub fn remove_user(&self, user_id: &str) -> Vec<String> {
        let rooms = self.rooms_of(user_id);
        for room_id in &rooms {
            self.leave(user_id, room_id);
        }
        rooms
    }

    /// Number of rooms with at least one member.
    pub fn room_count(&self) -> usize {
        self.room_users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_is_bidirectional_and_idempotent() {
        let rooms = RoomIndex::new();
        assert!(rooms.join("alice", "r1"));
        assert!(!rooms.join("alice", "r1"));

        assert_eq!(rooms.members_of("r1"), vec!["alice".to_string()]);
        assert_eq!(rooms.rooms_of("alice"), vec!["r1".to_string()]);
        assert!(rooms.is_member("alice", "r1"));
    }

    #[test]
    fn leave_garbage_collects_empty_rooms() {
        let rooms = RoomIndex::new();
        rooms.join("alice", "r1");
        rooms.join("bob", "r1");

        assert!(rooms.leave("alice", "r1"));
        assert_eq!(rooms.room_count(), 1);

        assert!(rooms.leave("bob", "r1"));
        assert_eq!(rooms.room_count(), 0);

        // Leaving again, or leaving an unknown room, is a quiet no-op.
        assert!(!rooms.leave("bob", "r1"));
        assert!(!rooms.leave("bob", "nowhere"));
    }

    #[test]
    fn unknown_room_has_empty_member_set() {
        let rooms = RoomIndex::new();
        assert!(rooms.members_of("ghost").is_empty());
        assert!(rooms.rooms_of("nobody").is_empty());
        assert!(!rooms.is_member("nobody", "ghost"));
    }

    #[test]
    fn remove_user_clears_all_memberships_once() {
        let rooms = RoomIndex::new();
        rooms.join("alice", "r1");
        rooms.join("alice", "r2");
        rooms.join("bob", "r1");

        let mut affected = rooms.remove_user("alice");
        affected.sort();
        assert_eq!(affected, vec!["r1".to_string(), "r2".to_string()]);

        // r1 still holds bob; r2 was emptied and collected.
        assert_eq!(rooms.members_of("r1"), vec!["bob".to_string()]);
        assert_eq!(rooms.room_count(), 1);

        // Second removal finds nothing to do.
        assert!(rooms.remove_user("alice").is_empty());
    }
}
