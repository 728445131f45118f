//! WebSocket handler for real-time updates

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use futures_util::{Sink, SinkExt, StreamExt};
use pellematic_poller::{EntityState, PollEvent};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::state::{AppState, EntityView};

/// WebSocket message types
#[derive(Serialize)]
#[serde(tag = "type", content = "data")]
enum WsMessage {
    #[serde(rename = "entities")]
    Entities(Vec<EntityView>),
    #[serde(rename = "states")]
    States {
        fetched_at: Option<DateTime<Utc>>,
        states: BTreeMap<String, EntityState>,
    },
    #[serde(rename = "poll_started")]
    PollStarted,
    #[serde(rename = "poll_failed")]
    PollFailed { error: String },
    #[serde(rename = "entities_changed")]
    EntitiesChanged { added: Vec<String>, missing: Vec<String> },
    #[serde(rename = "pong")]
    Pong,
}

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn states_message(state: &AppState) -> WsMessage {
    let states = state
        .entities()
        .await
        .into_iter()
        .map(|view| (view.definition.unique_id, view.state))
        .collect();
    WsMessage::States {
        fetched_at: state.poller.store().fetched_at().await,
        states,
    }
}

async fn send<S>(sender: &mut S, msg: &WsMessage) -> bool
where
    S: Sink<Message> + Unpin,
{
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize WebSocket message");
            true
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut poll_events = state.subscribe();

    info!("WebSocket client connected");

    // Send current entity list and states on connect
    if !send(&mut sender, &WsMessage::Entities(state.entities().await)).await {
        return;
    }
    if !send(&mut sender, &states_message(&state).await).await {
        return;
    }

    loop {
        tokio::select! {
            // Forward poll events to client
            event = poll_events.recv() => {
                let msg = match event {
                    Ok(PollEvent::PollStarted) => WsMessage::PollStarted,
                    Ok(PollEvent::PollCompleted { .. }) => states_message(&state).await,
                    Ok(PollEvent::PollFailed { error }) => WsMessage::PollFailed { error },
                    Ok(PollEvent::EntitiesChanged { added, missing }) => {
                        WsMessage::EntitiesChanged { added, missing }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "Poll event channel lagged");
                        continue;
                    }
                    Err(e) => {
                        debug!(error = %e, "Poll event channel error");
                        break;
                    }
                };

                if !send(&mut sender, &msg).await {
                    break;
                }
            }

            // Handle incoming messages from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        if text.as_str() == "ping" && !send(&mut sender, &WsMessage::Pong).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}
