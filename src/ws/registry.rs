//! Connection registry: live WebSocket connections keyed by user id.
//!
//! Holds at most one connection per user. Registering a second connection
//! for the same user closes the first with a "superseded" close code, so a
//! reconnecting client always wins over its stale predecessor.

use axum::extract::ws::{CloseFrame, Message};
use dashmap::DashMap;

use crate::ws::ConnectionSender;

/// Close code sent to a connection that was replaced by a newer one for the
/// same user.
pub const CLOSE_SUPERSEDED: u16 = 4000;

/// A registered connection: the channel to its writer task plus the
/// connection id, so teardown can tell whether it still owns the slot.
#[derive(Debug, Clone)]
struct ConnectionHandle {
    connection_id: String,
    tx: ConnectionSender,
}

/// Registry of active connections. All mutation goes through this type;
/// the underlying map is never exposed.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, ConnectionHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a user. If the user already has a live
    /// connection it is told to close with [`CLOSE_SUPERSEDED`] first.
    pub fn register(&self, user_id: &str, connection_id: &str, tx: ConnectionSender) {
        let old = self.connections.insert(
            user_id.to_string(),
            ConnectionHandle {
                connection_id: connection_id.to_string(),
                tx,
            },
        );

        if let Some(old) = old {
            tracing::info!(
                user_id = %user_id,
                old_connection = %old.connection_id,
                new_connection = %connection_id,
                "Connection superseded by newer connection"
            );
            let _ = old.tx.send(Message::Close(Some(CloseFrame {
                code: CLOSE_SUPERSEDED,
                reason: "superseded".into(),
            })));
        } else {
            tracing::debug!(
                user_id = %user_id,
                connection_id = %connection_id,
                "Connection registered"
            );
        }
    }

    /// Remove a user's mapping, but only if it still points at the given
    /// connection. Idempotent; a superseded connection's teardown is a no-op
    /// here because the slot already belongs to its replacement.
    pub fn unregister(&self, user_id: &str, connection_id: &str) -> bool {
        self.connections
            .remove_if(user_id, |_, handle| handle.connection_id == connection_id)
            .is_some()
    }

    /// Best-effort delivery to one user. A send failure means the receiving
    /// actor is gone, so the dead entry is unregistered as a side effect.
    pub fn send(&self, user_id: &str, msg: Message) -> bool {
        let handle = match self.connections.get(user_id) {
            Some(entry) => entry.value().clone(),
            None => return false,
        };

        if handle.tx.send(msg).is_ok() {
            true
        } else {
            tracing::debug!(
                user_id = %user_id,
                connection_id = %handle.connection_id,
                "Send failed, unregistering dead connection"
            );
            self.unregister(user_id, &handle.connection_id);
            false
        }
    }

    /// Deliver to every registered connection except `exclude`. Connections
    /// that fail are unregistered. Returns the number of deliveries.
    pub fn broadcast(&self, msg: &Message, exclude: Option<&str>) -> usize {
        let mut delivered = 0;
        let mut dead: Vec<(String, String)> = Vec::new();

        for entry in self.connections.iter() {
            if exclude == Some(entry.key().as_str()) {
                continue;
            }
            if entry.value().tx.send(msg.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push((entry.key().clone(), entry.value().connection_id.clone()));
            }
        }

        for (user_id, connection_id) in dead {
            tracing::debug!(user_id = %user_id, "Broadcast hit dead connection, unregistering");
            self.unregister(&user_id, &connection_id);
        }

        delivered
    }

    /// Whether a user currently has a live connection.
    pub fn is_connected(&self, user_id: &str) -> bool {
        self.connections.contains_key(user_id)
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
