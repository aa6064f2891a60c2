// Path: crates/attest-api/src/routes/realtime.rs
//! `/realtime/*` handlers plus the `/ws/{client_id}` bridge (`spec.md`
//! §6, §4.10). The WebSocket side translates client JSON frames into
//! `EventBus::subscribe_topic`/`unsubscribe_topic` calls and forwards
//! published events as they arrive on the per-session `mpsc::Receiver`.

use crate::error::AppError;
use crate::state::AppState;
use attest_types::error::{AttestError, AuthError};
use attest_types::ids::DeviceId;
use attest_types::model::PresenceRecord;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let device_id = DeviceId::new(id).map_err(AppError::BadRequest)?;
    // `spec.md` §6: 404 if the device isn't registered.
    state
        .store
        .get_device(&device_id)
        .await
        .map_err(|_| AppError::from(AttestError::from(AuthError::UnknownDevice)))?;

    let now = state.now();
    state.presence.heartbeat(device_id, now);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn devices_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let now = state.now();
    let statuses: Vec<PresenceRecord> = state.presence.list_statuses(now);
    Json(statuses)
}

#[derive(Deserialize)]
pub struct EventsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn recent_events(
    State(state): State<Arc<AppState>>,
    Query(q): Query<EventsQuery>,
) -> impl IntoResponse {
    Json(state.events.recent_events(q.limit))
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Ping,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, client_id, state))
}

async fn handle_socket(mut socket: WebSocket, client_id: String, state: Arc<AppState>) {
    let mut rx = state.events.open_session(client_id.clone());

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(event) => {
                        let Ok(text) = serde_json::to_string(&event) else { continue };
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(ClientFrame::Subscribe { topic }) => {
                                if attest_events::is_known_topic(&topic) {
                                    state.events.subscribe_topic(&client_id, &topic);
                                }
                            }
                            Ok(ClientFrame::Unsubscribe { topic }) => {
                                state.events.unsubscribe_topic(&client_id, &topic);
                            }
                            Ok(ClientFrame::Ping) => {
                                if socket.send(Message::Text("{\"type\":\"pong\"}".to_string())).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::debug!(client_id, error = %e, "ignoring malformed ws frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    state.events.disconnect(&client_id);
}
