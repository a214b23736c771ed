//! WebSocket push channel for poll events.
//!
//! Protocol:
//! ← Server sends: {"type":"connected","message":"...","version":"...","realtime":true}
//! ← Server sends: {"event":"new-poll","data":{...}} / {"event":"poll-updated","data":{...}}
//! → Client sends: {"type":"ping"}
//! ← Server sends: {"type":"pong","timestamp":1733900000000}
//!
//! Delivery is best effort. A client that falls behind the broadcast buffer
//! skips the missed events and keeps receiving new ones.

use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::stream::{self, BoxStream, SplitSink};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use workplanner_core::Identity;
use workplanner_engine::RealtimeEvent;

use super::server::AppState;

type EventStream = BoxStream<'static, Result<RealtimeEvent, BroadcastStreamRecvError>>;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Extension(me): Extension<Identity>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, me))
}

/// Client-facing frame for a broadcast event.
pub fn event_frame(event: &RealtimeEvent) -> serde_json::Value {
    serde_json::json!({
        "event": event.event,
        "data": event.data,
    })
}

/// Answer for a text frame from the client.
pub fn reply_to(text: &str) -> serde_json::Value {
    let msg: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return error_frame("Invalid JSON"),
    };
    match msg["type"].as_str().unwrap_or("") {
        "ping" => serde_json::json!({
            "type": "pong",
            "timestamp": chrono::Utc::now().timestamp_millis(),
        }),
        other => error_frame(&format!("Unknown message type: {other}")),
    }
}

fn error_frame(message: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "error",
        "message": message,
    })
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, me: Identity) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the welcome so nothing published after it is missed.
    let mut events: EventStream = match &state.realtime {
        Some(publisher) => BroadcastStream::new(publisher.subscribe()).boxed(),
        None => stream::pending().boxed(),
    };
    let clients = state.realtime.as_ref().map_or(0, |r| r.subscriber_count());
    tracing::info!(user_id = %me.user_id, clients, "WebSocket client connected");

    let welcome = serde_json::json!({
        "type": "connected",
        "message": "WorkPlanner realtime channel connected",
        "version": env!("CARGO_PKG_VERSION"),
        "realtime": state.realtime.is_some(),
    });
    if send_json(&mut sender, &welcome).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(Ok(event)) => {
                    if send_json(&mut sender, &event_frame(&event)).await.is_err() {
                        break;
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    tracing::warn!(user_id = %me.user_id, skipped, "WS client lagged, events dropped");
                }
                None => break,
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if send_json(&mut sender, &reply_to(text.as_str())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = sender.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!(user_id = %me.user_id, "WebSocket client disconnected");
                    break;
                }
                Some(Err(e)) => {
                    tracing::error!("WebSocket error: {e}");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    value: &serde_json::Value,
) -> Result<(), axum::Error> {
    sender
        .send(Message::Text(value.to_string().into()))
        .await
        .inspect_err(|e| tracing::error!("WS send failed: {e}"))
}
