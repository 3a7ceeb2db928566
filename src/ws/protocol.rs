use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use crate::chat::presence::{self, PresenceStatus};
use crate::chat::relay;
use crate::state::AppState;
use crate::ws::ClientSession;

/// Events a client may send. Unknown event names and malformed payloads are
/// answered with an `error` event; the connection stays open.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    #[serde(alias = "subscribe")]
    Join { room_id: String },
    Leave { room_id: String },
    #[serde(alias = "chat")]
    Message {
        room_id: String,
        content: String,
        #[serde(default)]
        message_id: Option<String>,
    },
    Typing { room_id: String, is_typing: bool },
    Ping {
        #[serde(default)]
        timestamp: Option<i64>,
    },
}

/// Events the server emits.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected {
        connection_id: String,
    },
    Authenticated {
        user_id: String,
        username: String,
        guest: bool,
    },
    Joined {
        room_id: String,
    },
    UserJoined {
        room_id: String,
        user_id: String,
        username: String,
    },
    Left {
        room_id: String,
    },
    UserLeft {
        room_id: String,
        user_id: String,
    },
    Message {
        room_id: String,
        sender_id: String,
        sender_name: String,
        content: String,
        message_id: String,
        timestamp: i64,
    },
    MessageAck {
        message_id: String,
        timestamp: i64,
        persisted: bool,
    },
    Typing {
        room_id: String,
        user_id: String,
        username: String,
        is_typing: bool,
    },
    Pong {
        server_time: i64,
        timestamp: Option<i64>,
    },
    UserStatus {
        user_id: String,
        username: String,
        status: PresenceStatus,
    },
    Error {
        code: &'static str,
        message: String,
    },
}

/// Event names this server understands; used to tell an unknown event apart
/// from a malformed payload when decoding fails.
const KNOWN_EVENTS: &[&str] = &["join", "subscribe", "leave", "message", "chat", "typing", "ping"];

/// Handle an incoming text frame: decode the tagged event and dispatch.
pub async fn handle_text_message(text: &str, session: &ClientSession, state: &AppState) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(
                user_id = %session.user_id,
                error = %e,
                "Failed to decode client event"
            );
            send_error(session, decode_error_code(text), "Malformed event payload");
            return;
        }
    };

    dispatch_event(event, session, state).await;
}

/// Dispatch a decoded client event to the owning component.
async fn dispatch_event(event: ClientEvent, session: &ClientSession, state: &AppState) {
    match event {
        ClientEvent::Join { room_id } => handle_join(session, state, room_id),
        ClientEvent::Leave { room_id } => handle_leave(session, state, room_id),
        ClientEvent::Message {
            room_id,
            content,
            message_id,
        } => {
            relay::handle_message(state, session, room_id, content, message_id).await;
        }
        ClientEvent::Typing { room_id, is_typing } => {
            presence::set_typing(state, session, &room_id, is_typing);
        }
        ClientEvent::Ping { timestamp } => {
            send_event(
                session,
                &ServerEvent::Pong {
                    server_time: chrono::Utc::now().timestamp_millis(),
                    timestamp,
                },
            );
        }
    }
}

fn handle_join(session: &ClientSession, state: &AppState, room_id: String) {
    if room_id.is_empty() {
        send_error(session, "empty_room", "Room id must not be empty");
        return;
    }

    let newly_joined = state.rooms.join(&session.user_id, &room_id);
    send_event(
        session,
        &ServerEvent::Joined {
            room_id: room_id.clone(),
        },
    );

    if newly_joined {
        crate::ws::broadcast::broadcast_to_room(
            &state.connections,
            &state.rooms,
            &room_id,
            &ServerEvent::UserJoined {
                room_id: room_id.clone(),
                user_id: session.user_id.clone(),
                username: session.username.clone(),
            },
            Some(&session.user_id),
        );
        tracing::debug!(user_id = %session.user_id, room_id = %room_id, "User joined room");
    }
}

fn handle_leave(session: &ClientSession, state: &AppState, room_id: String) {
    if room_id.is_empty() {
        send_error(session, "empty_room", "Room id must not be empty");
        return;
    }

    let was_member = state.rooms.leave(&session.user_id, &room_id);
    send_event(
        session,
        &ServerEvent::Left {
            room_id: room_id.clone(),
        },
    );

    if was_member {
        crate::ws::broadcast::broadcast_to_room(
            &state.connections,
            &state.rooms,
            &room_id,
            &ServerEvent::UserLeft {
                room_id: room_id.clone(),
                user_id: session.user_id.clone(),
            },
            Some(&session.user_id),
        );
        tracing::debug!(user_id = %session.user_id, room_id = %room_id, "User left room");
    }
}

/// Serialize an event and push it down this session's channel.
/// Returns false when the connection is already gone.
pub fn send_event(session: &ClientSession, event: &ServerEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => session.tx.send(Message::Text(json.into())).is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize server event");
            false
        }
    }
}

/// Send an `error` event to this session.
pub fn send_error(session: &ClientSession, code: &'static str, message: &str) {
    send_event(
        session,
        &ServerEvent::Error {
            code,
            message: message.to_string(),
        },
    );
}

/// Classify a decode failure: a well-formed frame naming an event outside the
/// closed set is `unknown_event`; everything else is `bad_payload`.
fn decode_error_code(text: &str) -> &'static str {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        if let Some(name) = value.get("event").and_then(|v| v.as_str()) {
            if !KNOWN_EVENTS.contains(&name) {
                return "unknown_event";
            }
        }
    }
    "bad_payload"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_accepts_subscribe_alias() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"event":"subscribe","data":{"room_id":"r1"}}"#).unwrap();
        assert!(matches!(event, ClientEvent::Join { room_id } if room_id == "r1"));
    }

    #[test]
    fn message_accepts_chat_alias_and_optional_id() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"event":"chat","data":{"room_id":"r1","content":"hi"}}"#)
                .unwrap();
        match event {
            ClientEvent::Message {
                room_id,
                content,
                message_id,
            } => {
                assert_eq!(room_id, "r1");
                assert_eq!(content, "hi");
                assert!(message_id.is_none());
            }
            other => panic!("Expected Message, got {:?}", other),
        }
    }

    #[test]
    fn unknown_event_is_distinguished_from_garbage() {
        assert_eq!(
            decode_error_code(r#"{"event":"dance","data":{}}"#),
            "unknown_event"
        );
        assert_eq!(decode_error_code("not json at all"), "bad_payload");
        // A known event with a broken payload is a payload problem.
        assert_eq!(
            decode_error_code(r#"{"event":"join","data":{"room":42}}"#),
            "bad_payload"
        );
    }

    #[test]
    fn server_events_serialize_tagged() {
        let json = serde_json::to_string(&ServerEvent::Joined {
            room_id: "r1".to_string(),
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["event"], "joined");
        assert_eq!(value["data"]["room_id"], "r1");
    }
}
