//! Message relay: validate an inbound chat message, persist it to the
//! storage service with bounded retries, fan it out to the sender's room
//! peers, and acknowledge the sender.
//!
//! Fan-out proceeds even when persistence ultimately fails: availability is
//! favored over strict durability, and the ack carries a `persisted` flag so
//! clients can see when a message reached peers but may be missing from
//! history.

use chrono::Utc;
use uuid::Uuid;

use crate::state::AppState;
use crate::ws::broadcast::broadcast_to_room;
use crate::ws::protocol::{send_error, send_event, ServerEvent};
use crate::ws::ClientSession;

/// Maximum message content length (chars).
const MAX_CONTENT_LENGTH: usize = 4000;

/// Relay one inbound message end to end. Validation failures are reported to
/// the sender only and have no side effects.
pub async fn handle_message(
    state: &AppState,
    session: &ClientSession,
    room_id: String,
    content: String,
    message_id: Option<String>,
) {
    let content = content.trim().to_string();
    if room_id.is_empty() {
        send_error(session, "empty_room", "Room id must not be empty");
        return;
    }
    if content.is_empty() {
        send_error(session, "empty_content", "Message content must not be empty");
        return;
    }
    if content.len() > MAX_CONTENT_LENGTH {
        send_error(session, "content_too_long", "Message content exceeds limit");
        return;
    }

    // Membership gate. The reference behavior (first message implicitly
    // joins) is kept behind a config flag; with it off, non-members are
    // rejected before any side effect.
    if !state.rooms.is_member(&session.user_id, &room_id) {
        if state.auto_join_on_message {
            state.rooms.join(&session.user_id, &room_id);
            tracing::debug!(
                user_id = %session.user_id,
                room_id = %room_id,
                "Auto-joined room on first message"
            );
        } else {
            send_error(session, "not_a_member", "Join the room before sending messages");
            return;
        }
    }

    // A client-supplied id enables sender-side idempotent retry; otherwise
    // mint one. The storage service deduplicates by this id.
    let message_id = message_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let timestamp = Utc::now().timestamp_millis();

    // Persist first. The call holds no registry references; the recipient
    // set is computed afterwards, so a slow storage service never blocks
    // other connections.
    let persisted = match state
        .storage
        .store_message(&room_id, &session.user_id, &message_id, &content)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                user_id = %session.user_id,
                room_id = %room_id,
                message_id = %message_id,
                error = %e,
                "Message persistence failed after all retries, forwarding anyway"
            );
            false
        }
    };

    let delivered = broadcast_to_room(
        &state.connections,
        &state.rooms,
        &room_id,
        &ServerEvent::Message {
            room_id: room_id.clone(),
            sender_id: session.user_id.clone(),
            sender_name: session.username.clone(),
            content,
            message_id: message_id.clone(),
            timestamp,
        },
        Some(&session.user_id),
    );

    tracing::debug!(
        user_id = %session.user_id,
        room_id = %room_id,
        message_id = %message_id,
        delivered,
        persisted,
        "Message relayed"
    );

    // Delivery confirmation to the sender, independent of whether any peer
    // was connected to receive the fan-out.
    send_event(
        session,
        &ServerEvent::MessageAck {
            message_id,
            timestamp,
            persisted,
        },
    );
}
