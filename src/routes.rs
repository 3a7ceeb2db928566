use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes.
pub fn build_router(state: AppState) -> Router {
    // WebSocket endpoint (auth via query param or bearer header)
    let ws_routes = Router::new().route("/ws", get(ws_handler::ws_upgrade));

    // Service-to-service side-channel: targeted delivery and fan-out for
    // other platform services that need to reach connected clients.
    let sidechannel_routes = Router::new()
        .route("/notify", post(notify))
        .route("/broadcast", post(broadcast));

    // Operational endpoints
    let ops_routes = Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats));

    Router::new()
        .merge(ws_routes)
        .merge(sidechannel_routes)
        .merge(ops_routes)
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    connections: usize,
    rooms: usize,
    tracked_presence: usize,
}

/// GET /stats — live connection, room, and presence counts.
async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        connections: state.connections.connection_count(),
        rooms: state.rooms.room_count(),
        tracked_presence: state.presence.tracked_count(),
    })
}

#[derive(Debug, Deserialize)]
struct NotifyRequest {
    recipient_id: String,
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct NotifyResponse {
    delivered: bool,
}

/// POST /notify — deliver an event to one connected user.
/// 404 when the recipient has no live connection.
async fn notify(
    State(state): State<AppState>,
    Json(body): Json<NotifyRequest>,
) -> Result<Json<NotifyResponse>, StatusCode> {
    let frame = serde_json::json!({ "event": body.event, "data": body.data }).to_string();

    if state
        .connections
        .send(&body.recipient_id, Message::Text(frame.into()))
    {
        Ok(Json(NotifyResponse { delivered: true }))
    } else {
        tracing::debug!(recipient_id = %body.recipient_id, "Notify target not connected");
        Err(StatusCode::NOT_FOUND)
    }
}

#[derive(Debug, Deserialize)]
struct BroadcastRequest {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    room_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct BroadcastResponse {
    recipients: usize,
}

/// POST /broadcast — fan an event out globally or to one room's members.
async fn broadcast(
    State(state): State<AppState>,
    Json(body): Json<BroadcastRequest>,
) -> Json<BroadcastResponse> {
    let frame = serde_json::json!({ "event": body.event, "data": body.data }).to_string();
    let msg = Message::Text(frame.into());

    let recipients = match body.room_id.as_deref() {
        Some(room_id) => {
            let mut delivered = 0;
            for member in state.rooms.members_of(room_id) {
                if state.connections.send(&member, msg.clone()) {
                    delivered += 1;
                }
            }
            delivered
        }
        None => state.connections.broadcast(&msg, None),
    };

    Json(BroadcastResponse { recipients })
}
