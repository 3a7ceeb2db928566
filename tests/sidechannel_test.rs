//! Integration tests for the service-to-service HTTP side-channel and the
//! operational endpoints.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use pulse_server::chat::presence::PresenceTracker;
use pulse_server::chat::storage::StorageClient;
use pulse_server::rooms::RoomIndex;
use pulse_server::state::AppState;
use pulse_server::ws::registry::ConnectionRegistry;

type WsRead = futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;
type WsWrite = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

async fn start_test_server() -> SocketAddr {
    let state = AppState {
        connections: Arc::new(ConnectionRegistry::new()),
        rooms: Arc::new(RoomIndex::new()),
        presence: Arc::new(PresenceTracker::new()),
        storage: StorageClient::new(
            "http://127.0.0.1:9",
            Duration::from_millis(500),
            1,
            Duration::from_millis(10),
        ),
        auth_secret: b"test-secret".to_vec(),
        strict_auth: false,
        auto_join_on_message: true,
    };
    let app = pulse_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

fn parse_event(msg: &Message) -> Option<(String, Value)> {
    let text = match msg {
        Message::Text(text) => text.as_str(),
        _ => return None,
    };
    let value: Value = serde_json::from_str(text).ok()?;
    let event = value.get("event")?.as_str()?.to_string();
    Some((event, value.get("data").cloned().unwrap_or(Value::Null)))
}

async fn recv_event(read: &mut WsRead, name: &str) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
            .await
            .unwrap_or_else(|_| panic!("Timed out waiting for '{}' event", name))
            .expect("Stream ended")
            .expect("WebSocket error");
        if let Some((event, data)) = parse_event(&msg) {
            if event == name {
                return data;
            }
        }
    }
}

/// Connect as a guest and optionally join a room. Guests are fine here; the
/// side-channel addresses users by id, which the handshake reports.
async fn connect_guest(addr: SocketAddr, room_id: Option<&str>) -> (WsWrite, WsRead, String) {
    let url = format!("ws://{}/ws", addr);
    let (stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let (mut write, mut read) = stream.split();
    let auth = recv_event(&mut read, "authenticated").await;
    let user_id = auth["user_id"].as_str().unwrap().to_string();

    if let Some(room_id) = room_id {
        write
            .send(Message::Text(
                json!({"event": "join", "data": {"room_id": room_id}})
                    .to_string()
                    .into(),
            ))
            .await
            .unwrap();
        recv_event(&mut read, "joined").await;
    }

    (write, read, user_id)
}

#[tokio::test]
async fn health_endpoint_answers_ok() {
    let addr = start_test_server().await;
    let body = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn stats_reflect_live_connections_and_rooms() {
    let addr = start_test_server().await;
    let (_w1, _r1, _) = connect_guest(addr, Some("r1")).await;
    let (_w2, _r2, _) = connect_guest(addr, Some("r2")).await;

    let stats: Value = reqwest::get(format!("http://{}/stats", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["connections"], 2);
    assert_eq!(stats["rooms"], 2);
    assert_eq!(stats["tracked_presence"], 2);
}

#[tokio::test]
async fn notify_delivers_to_connected_user() {
    let addr = start_test_server().await;
    let (_write, mut read, user_id) = connect_guest(addr, None).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/notify", addr))
        .json(&json!({
            "recipient_id": user_id,
            "event": "friend_request",
            "data": {"from": "u9"},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let data = recv_event(&mut read, "friend_request").await;
    assert_eq!(data["from"], "u9");
}

#[tokio::test]
async fn notify_unknown_recipient_is_404() {
    let addr = start_test_server().await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/notify", addr))
        .json(&json!({
            "recipient_id": "nobody-home",
            "event": "friend_request",
            "data": {},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn broadcast_scopes_to_room_when_given_one() {
    let addr = start_test_server().await;
    let (_wa, mut read_a, _) = connect_guest(addr, Some("r1")).await;
    let (_wb, mut read_b, _) = connect_guest(addr, Some("r2")).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/broadcast", addr))
        .json(&json!({
            "event": "maintenance",
            "data": {"minutes": 5},
            "room_id": "r1",
        }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["recipients"], 1);

    let data = recv_event(&mut read_a, "maintenance").await;
    assert_eq!(data["minutes"], 5);

    // The other room hears nothing.
    let quiet = tokio::time::timeout(Duration::from_millis(300), async {
        loop {
            if let Some(Ok(msg)) = read_b.next().await {
                if let Some((event, _)) = parse_event(&msg) {
                    if event == "maintenance" {
                        return;
                    }
                }
            }
        }
    })
    .await;
    assert!(quiet.is_err(), "Broadcast leaked outside the target room");
}

#[tokio::test]
async fn broadcast_without_room_reaches_everyone() {
    let addr = start_test_server().await;
    let (_wa, mut read_a, _) = connect_guest(addr, Some("r1")).await;
    let (_wb, mut read_b, _) = connect_guest(addr, None).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/broadcast", addr))
        .json(&json!({"event": "announcement", "data": {"text": "hello"}}))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["recipients"], 2);

    assert_eq!(recv_event(&mut read_a, "announcement").await["text"], "hello");
    assert_eq!(recv_event(&mut read_b, "announcement").await["text"], "hello");
}
