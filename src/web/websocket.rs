//! WebSocket handler streaming pin updates to the dashboard.
//!
//! Each connection owns one [`Subscription`](crate::broadcast::Subscription).
//! A send task forwards monitor events and replies; a receive task handles
//! client requests. When either side finishes the connection is torn down
//! and the subscription retired.

use crate::broadcast::{MonitorEvent, PinHistory};
use crate::pins::{PinId, Snapshot, TransitionEvent};
use crate::web::router::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tracing::{debug, error, info, warn};

/// Replies queued for one client before further requests are dropped.
const REPLY_BUFFER: usize = 16;

/// Messages sent to the browser.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage<'a> {
    GpioUpdate(&'a Snapshot),
    Transition(&'a TransitionEvent),
    CountersReset { timestamp: DateTime<Utc> },
    PinHistory(&'a PinHistory),
    Error { message: String },
}

impl ServerMessage<'_> {
    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json),
            Err(e) => {
                error!("Failed to serialize message: {}", e);
                None
            }
        }
    }
}

/// Requests accepted from the browser.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    RequestPinHistory {
        pin: PinId,
        #[serde(default = "default_hours")]
        hours: u32,
    },
    ResetCounters,
    RequestGpioUpdate,
}

fn default_hours() -> u32 {
    1
}

/// Encode a monitor event for the wire. `Shutdown` has no wire form.
pub fn encode_event(event: &MonitorEvent) -> Option<String> {
    match event {
        MonitorEvent::Snapshot(snapshot) => ServerMessage::GpioUpdate(snapshot).to_json(),
        MonitorEvent::Transition(transition) => ServerMessage::Transition(transition).to_json(),
        MonitorEvent::CountersReset { timestamp } => ServerMessage::CountersReset {
            timestamp: *timestamp,
        }
        .to_json(),
        MonitorEvent::Shutdown => None,
    }
}

/// WebSocket upgrade handler.
///
/// A connection slot is reserved before the upgrade and held until the
/// connection ends, so concurrent upgrades cannot exceed the limit.
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.monitor.broadcaster().is_closed() {
        debug!("Rejecting WebSocket client, monitor has stopped");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let Ok(slot) = Arc::clone(&state.ws_slots).try_acquire_owned() else {
        warn!(
            limit = state.config.max_websocket_connections,
            "Rejecting WebSocket client, connection limit reached"
        );
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    ws.on_upgrade(move |socket| handle_websocket(socket, state, slot))
}

async fn handle_websocket(socket: WebSocket, state: AppState, _slot: OwnedSemaphorePermit) {
    let subscription = state.monitor.subscribe();
    let client_id = subscription.id();
    let events = subscription.into_stream();
    info!("WebSocket client connected: {}", client_id);

    let (mut sender, mut receiver) = socket.split();
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(REPLY_BUFFER);

    // Current state first so the grid renders without waiting a tick
    if let Some(json) = state
        .monitor
        .latest_snapshot()
        .and_then(|snapshot| ServerMessage::GpioUpdate(&snapshot).to_json())
    {
        let _ = reply_tx.try_send(json);
    }

    let send_task = tokio::spawn(async move {
        tokio::pin!(events);
        loop {
            let json = tokio::select! {
                biased;
                Some(reply) = reply_rx.recv() => reply,
                event = events.next() => match event {
                    Some(event) => match encode_event(&event) {
                        Some(json) => json,
                        None => continue,
                    },
                    None => {
                        debug!("Monitor stopped, closing client {}", client_id);
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                },
            };

            if let Err(e) = sender.send(Message::Text(json)).await {
                warn!("Failed to send message to client {}: {}", client_id, e);
                break;
            }
        }
    });

    let monitor = state.monitor.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let reply = handle_client_message(&monitor, &text).await;
                    if let Some(json) = reply {
                        if reply_tx.try_send(json).is_err() {
                            warn!("Reply queue full for client {}, dropping reply", client_id);
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("WebSocket client {} disconnected", client_id);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket error for client {}: {}", client_id, e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = send_task => {
            debug!("Send task completed for client {}", client_id);
        }
        _ = recv_task => {
            debug!("Receive task completed for client {}", client_id);
        }
    }

    info!("WebSocket client disconnected: {}", client_id);
}

/// Handle one client request, returning the encoded reply if there is one.
pub async fn handle_client_message(
    monitor: &crate::monitor::MonitorHandle,
    text: &str,
) -> Option<String> {
    let request = match serde_json::from_str::<ClientMessage>(text) {
        Ok(request) => request,
        Err(e) => {
            debug!("Ignoring malformed client message: {}", e);
            return ServerMessage::Error {
                message: format!("invalid request: {}", e),
            }
            .to_json();
        }
    };

    match request {
        ClientMessage::RequestPinHistory { pin, hours } => {
            let history = monitor.query_history(pin, hours);
            ServerMessage::PinHistory(&history).to_json()
        }
        ClientMessage::RequestGpioUpdate => monitor
            .latest_snapshot()
            .and_then(|snapshot| ServerMessage::GpioUpdate(&snapshot).to_json()),
        // The reset confirmation reaches every client through the broadcast
        ClientMessage::ResetCounters => match monitor.reset().await {
            Ok(_) => None,
            Err(e) => ServerMessage::Error {
                message: e.to_string(),
            }
            .to_json(),
        },
    }
}
