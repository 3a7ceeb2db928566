//! Fan-out helpers: serialize a server event once, then deliver it to a
//! room's members, a single user, or every connection.

use axum::extract::ws::Message;

use crate::rooms::RoomIndex;
use crate::ws::protocol::ServerEvent;
use crate::ws::registry::ConnectionRegistry;

fn encode(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize server event for fan-out");
            None
        }
    }
}

/// Deliver an event to every member of a room, excluding `exclude` (usually
/// the originating user). Members without a live connection are skipped.
/// Returns the number of deliveries.
pub fn broadcast_to_room(
    registry: &ConnectionRegistry,
    rooms: &RoomIndex,
    room_id: &str,
    event: &ServerEvent,
    exclude: Option<&str>,
) -> usize {
    let msg = match encode(event) {
        Some(msg) => msg,
        None => return 0,
    };

    let mut delivered = 0;
    for member in rooms.members_of(room_id) {
        if exclude == Some(member.as_str()) {
            continue;
        }
        if registry.send(&member, msg.clone()) {
            delivered += 1;
        }
    }
    delivered
}

/// Deliver an event to every connection except `exclude`.
pub fn broadcast_to_all(
    registry: &ConnectionRegistry,
    event: &ServerEvent,
    exclude: Option<&str>,
) -> usize {
    match encode(event) {
        Some(msg) => registry.broadcast(&msg, exclude),
        None => 0,
    }
}
