use std::sync::Arc;

use crate::chat::presence::PresenceTracker;
use crate::chat::storage::StorageClient;
use crate::rooms::RoomIndex;
use crate::ws::registry::ConnectionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
///
/// The registries are single owner objects; no handler touches their
/// underlying maps directly.
#[derive(Clone)]
pub struct AppState {
    /// Live WebSocket connections, at most one per user
    pub connections: Arc<ConnectionRegistry>,
    /// Room id <-> member user id index
    pub rooms: Arc<RoomIndex>,
    /// Last-known presence and typing flags
    pub presence: Arc<PresenceTracker>,
    /// Client for the chat storage service
    pub storage: StorageClient,
    /// Shared secret for verifying access tokens
    pub auth_secret: Vec<u8>,
    /// When true, connections without a valid token are rejected instead of
    /// admitted as guests
    pub strict_auth: bool,
    /// When true, a message from a non-member implicitly joins the room
    pub auto_join_on_message: bool,
}
