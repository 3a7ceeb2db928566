pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;
pub mod registry;

use tokio::sync::mpsc;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Per-connection context handed to event handlers: who this connection is
/// and how to reach it. Identity is immutable for the life of the connection.
#[derive(Debug, Clone)]
pub struct ClientSession {
    pub connection_id: String,
    pub user_id: String,
    pub username: String,
    pub is_guest: bool,
    pub tx: ConnectionSender,
}
