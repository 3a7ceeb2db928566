use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        Query, State,
    },
    http::header::AUTHORIZATION,
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;

use crate::auth::token;
use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for WebSocket connection. The token may come via
/// `?token=` or an `Authorization: Bearer` header; both are optional unless
/// strict auth is on.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// Close code for a strict-auth rejection (policy violation).
const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// GET /ws?token=JWT
/// WebSocket upgrade endpoint. Resolves the connection's identity before the
/// upgrade; a missing or bad token yields a guest identity unless strict
/// auth is configured, in which case the socket is upgraded and immediately
/// closed with a policy code.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = params.token.or_else(|| bearer_token(&headers));

    match token::resolve_identity(&state.auth_secret, token.as_deref(), state.strict_auth) {
        Ok(identity) => {
            tracing::info!(
                user_id = %identity.user_id,
                guest = identity.is_guest,
                "WebSocket connection admitted"
            );
            ws.on_upgrade(move |socket| actor::run_connection(socket, state, identity))
        }
        Err(err) => {
            tracing::warn!(error = %err, "WebSocket connection rejected (strict auth)");

            // Upgrade the connection, then immediately close with the
            // policy code so the client sees why.
            ws.on_upgrade(move |mut socket| async move {
                let close_frame = CloseFrame {
                    code: CLOSE_POLICY_VIOLATION,
                    reason: "authentication required".into(),
                };
                let _ = socket.send(Message::Close(Some(close_frame))).await;
            })
        }
    }
}

/// Extract a bearer token from the Authorization header, if present.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}
