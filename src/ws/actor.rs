use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use uuid::Uuid;

use crate::auth::token::Identity;
use crate::chat::presence;
use crate::state::AppState;
use crate::ws::protocol::{self, ServerEvent};
use crate::ws::ClientSession;

/// Ping interval: server sends WebSocket ping every 30 seconds.
/// Prevents connection leaks from abrupt disconnects.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for an admitted WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader task: processes incoming events strictly in receipt order
///
/// The mpsc channel allows any part of the system to send messages to this
/// client by cloning the sender (via the connection registry).
pub async fn run_connection(socket: WebSocket, state: AppState, identity: Identity) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let session = ClientSession {
        connection_id: Uuid::new_v4().to_string(),
        user_id: identity.user_id,
        username: identity.username,
        is_guest: identity.is_guest,
        tx: tx.clone(),
    };

    // Greeting first, then activation: register (superseding any prior
    // connection for this user), go online, confirm the resolved identity.
    protocol::send_event(
        &session,
        &ServerEvent::Connected {
            connection_id: session.connection_id.clone(),
        },
    );

    state
        .connections
        .register(&session.user_id, &session.connection_id, tx.clone());
    presence::set_online(&state, &session);

    protocol::send_event(
        &session,
        &ServerEvent::Authenticated {
            user_id: session.user_id.clone(),
            username: session.username.clone(),
            guest: session.is_guest,
        },
    );

    tracing::info!(
        user_id = %session.user_id,
        connection_id = %session.connection_id,
        guest = session.is_guest,
        "WebSocket actor started"
    );

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_user = session.user_id.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died — connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {
                    // Pong received, continue
                }
                _ => {
                    tracing::warn!(user_id = %ping_user, "Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Reader loop: events for this connection are handled one at a time, so
    // a single client's events are never reordered.
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_message(text.as_str(), &session, &state).await;
                }
                Message::Binary(_) => {
                    tracing::debug!(
                        user_id = %session.user_id,
                        "Received binary frame (protocol is JSON text), ignoring"
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user_id = %session.user_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    user_id = %session.user_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(user_id = %session.user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    // Cleanup: abort writer and ping tasks, then release shared state.
    writer_handle.abort();
    ping_handle.abort();

    cleanup_connection(&state, &session);

    tracing::info!(
        user_id = %session.user_id,
        connection_id = %session.connection_id,
        "WebSocket actor stopped"
    );
}

/// Release everything this connection held: registry slot, room
/// memberships, presence record. Idempotent, and supersede-aware: when a
/// newer connection for the same user owns the registry slot, the shared
/// state belongs to it and only this actor's local state goes away.
pub fn cleanup_connection(state: &AppState, session: &ClientSession) {
    if !state
        .connections
        .unregister(&session.user_id, &session.connection_id)
    {
        tracing::debug!(
            user_id = %session.user_id,
            connection_id = %session.connection_id,
            "Connection no longer owns its slot, skipping shared-state cleanup"
        );
        return;
    }

    // Capture the rooms before removal so the offline fan-out reaches the
    // peers that shared them.
    let vacated = state.rooms.remove_user(&session.user_id);
    presence::set_offline(state, session, &vacated);
}

/// Writer task: receives messages from the mpsc channel and forwards them to
/// the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed — connection is broken
            break;
        }
    }
}
