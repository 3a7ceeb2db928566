//! Presence and typing tracking with edge-triggered broadcast.
//!
//! Keeps last-known online/offline status per user and a typing flag per
//! (user, room). Broadcasts fire only on a change of value, scoped to the
//! rooms the user shares with peers and never echoed back to the user.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use crate::ws::broadcast::{broadcast_to_all, broadcast_to_room};
use crate::ws::protocol::ServerEvent;
use crate::ws::ClientSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// Owns the presence state. Not persisted across restarts; records exist to
/// detect transitions, nothing else reads them.
#[derive(Default)]
pub struct PresenceTracker {
    status: DashMap<String, PresenceStatus>,
    typing: DashMap<(String, String), bool>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a user as online. Returns true on transition.
    pub fn mark_online(&self, user_id: &str) -> bool {
        let old = self
            .status
            .insert(user_id.to_string(), PresenceStatus::Online);
        old != Some(PresenceStatus::Online)
    }

    /// Drop a user's record. Returns true if the user was online, i.e. an
    /// offline transition happened. A user never seen (or already removed)
    /// yields false, which makes disconnect cleanup idempotent.
    pub fn mark_offline(&self, user_id: &str) -> bool {
        self.status
            .remove(user_id)
            .map(|(_, status)| status == PresenceStatus::Online)
            .unwrap_or(false)
    }

    /// Record a typing flag for (user, room). Returns true on a change of
    /// value; the untracked default is "not typing".
    pub fn set_typing(&self, user_id: &str, room_id: &str, is_typing: bool) -> bool {
        let old = self
            .typing
            .insert((user_id.to_string(), room_id.to_string()), is_typing);
        old.unwrap_or(false) != is_typing
    }

    /// Forget all typing flags for a user (disconnect cleanup).
    pub fn clear_typing(&self, user_id: &str) {
        self.typing.retain(|(user, _), _| user != user_id);
    }

    /// Number of users with a tracked status.
    pub fn tracked_count(&self) -> usize {
        self.status.len()
    }
}

/// Broadcast a status change to every room the user belongs to, excluding
/// the user. A user in no rooms falls back to a global broadcast so
/// lobby-style clients still observe the change.
fn broadcast_status(state: &AppState, session: &ClientSession, status: PresenceStatus, rooms: &[String]) {
    let event = ServerEvent::UserStatus {
        user_id: session.user_id.clone(),
        username: session.username.clone(),
        status,
    };

    if rooms.is_empty() {
        broadcast_to_all(&state.connections, &event, Some(&session.user_id));
    } else {
        for room_id in rooms {
            broadcast_to_room(
                &state.connections,
                &state.rooms,
                room_id,
                &event,
                Some(&session.user_id),
            );
        }
    }
}

/// Mark a user online and, on transition, fan the status out. Called by the
/// connection lifecycle at activation.
pub fn set_online(state: &AppState, session: &ClientSession) {
    if state.presence.mark_online(&session.user_id) {
        tracing::debug!(user_id = %session.user_id, "Presence transition to online");
        let rooms = state.rooms.rooms_of(&session.user_id);
        broadcast_status(state, session, PresenceStatus::Online, &rooms);
    }
}

/// Mark a user offline and, on transition, fan the status out to the rooms
/// the user occupied before disconnect cleanup removed them. Safe to call
/// more than once; only the first call broadcasts.
pub fn set_offline(state: &AppState, session: &ClientSession, vacated_rooms: &[String]) {
    state.presence.clear_typing(&session.user_id);
    if state.presence.mark_offline(&session.user_id) {
        tracing::debug!(user_id = %session.user_id, "Presence transition to offline");
        broadcast_status(state, session, PresenceStatus::Offline, vacated_rooms);
    }
}

/// Edge-triggered typing broadcast: a repeat of the current flag produces no
/// network activity.
pub fn set_typing(state: &AppState, session: &ClientSession, room_id: &str, is_typing: bool) {
    if !state.presence.set_typing(&session.user_id, room_id, is_typing) {
        return;
    }

    broadcast_to_room(
        &state.connections,
        &state.rooms,
        room_id,
        &ServerEvent::Typing {
            room_id: room_id.to_string(),
            user_id: session.user_id.clone(),
            username: session.username.clone(),
            is_typing,
        },
        Some(&session.user_id),
    );
}
