//! Change notification stream.
//!
//! `GET /api/v1/events` upgrades to a WebSocket and forwards every
//! [`EngineEvent`](crate::engine::EngineEvent) as a JSON text frame. Slow
//! clients skip events they lagged behind on; they never block the engine.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use crate::engine::EventBus;
use crate::http::server::AppState;
use crate::observability::metrics;

pub async fn events(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    let bus = state.engine.events().clone();
    upgrade.on_upgrade(move |socket| stream_events(socket, bus))
}

async fn stream_events(socket: WebSocket, bus: EventBus) {
    let mut events = bus.subscribe();
    metrics::record_subscribers(bus.subscriber_count());
    tracing::debug!(subscribers = bus.subscriber_count(), "Event subscriber connected");

    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let frame = match serde_json::to_string(&event) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to encode event");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    drop(events);
    metrics::record_subscribers(bus.subscriber_count());
    tracing::debug!("Event subscriber disconnected");
}
