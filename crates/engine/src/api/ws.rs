//! WebSocket accept/runtime path (C8): the only place that speaks axum's
//! socket type. Everything it does past the handshake is a thin adapter
//! between the socket and a `GameSession`'s command channel and outbound
//! channel; session/turn logic itself lives in `infrastructure::session`.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use taleforge_domain::SessionToken;
use taleforge_shared::{ClientMessage, ErrorCode, ServerMessage};

use super::AppState;
use crate::infrastructure::hub::RegisterError;
use crate::infrastructure::session::GameSession;
use crate::infrastructure::state_store::StateStoreError;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(rename = "adventureId")]
    adventure_id: Option<String>,
    token: Option<String>,
}

fn close(code: u16, reason: impl Into<String>) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into().into(),
    }))
}

pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let origin = headers
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    if !state.hub.is_origin_allowed(origin) {
        return (axum::http::StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }

    let (Some(adventure_id), Some(token_raw)) = (query.adventure_id, query.token) else {
        return (
            axum::http::StatusCode::BAD_REQUEST,
            "adventureId and token query parameters are required",
        )
            .into_response();
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, adventure_id, token_raw))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, adventure_id: String, token_raw: String) {
    let registration = match state.hub.register(&adventure_id, &token_raw) {
        Ok(registration) => registration,
        Err(err) => {
            let (code, reason) = match err {
                RegisterError::AtCapacity => (1013u16, "server is at capacity"),
                RegisterError::Draining => (1013u16, "server is shutting down"),
                RegisterError::DuplicateBinding => (1008u16, "adventure already has an active connection"),
            };
            let mut socket = socket;
            // spec.md §4.8 step 2: capacity rejection sends a wire `error`
            // message before the close frame, not just the close.
            if err == RegisterError::AtCapacity {
                let message = ServerMessage::error(ErrorCode::GmError, "Server at capacity, please try again shortly.");
                if let Ok(json) = serde_json::to_string(&message) {
                    let _ = socket.send(Message::Text(json.into())).await;
                }
            }
            let _ = socket.send(close(code, reason)).await;
            return;
        }
    };

    let token: SessionToken = match token_raw.parse() {
        Ok(token) => token,
        Err(_) => {
            let mut socket = socket;
            let _ = socket.send(close(1008, "malformed session token")).await;
            state.hub.unregister(&registration.key);
            return;
        }
    };

    let loaded = state.state_store.load(&adventure_id, token);
    let handle = match loaded {
        Ok(handle) => handle,
        Err(err) => {
            let (wire_code, close_code) = match err {
                StateStoreError::NotFound | StateStoreError::InvalidId => (ErrorCode::AdventureNotFound, 1008),
                StateStoreError::InvalidToken => (ErrorCode::InvalidToken, 1008),
                StateStoreError::Corrupted { .. } | StateStoreError::Fs(_) => (ErrorCode::StateCorrupted, 1011),
            };
            let mut socket = socket;
            let message = ServerMessage::error(wire_code, err.to_string());
            if let Ok(json) = serde_json::to_string(&message) {
                let _ = socket.send(Message::Text(json.into())).await;
            }
            let _ = socket.send(close(close_code, "failed to load adventure")).await;
            state.hub.unregister(&registration.key);
            return;
        }
    };

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let init = GameSession::initialize(
        handle,
        state.agent.clone(),
        state.image.clone(),
        state.project_dir.clone(),
        outbound_tx,
    );

    let (mut sender, mut receiver) = socket.split();

    let opening = [
        ServerMessage::AdventureLoaded {
            adventure_id: init.adventure_id.clone(),
            history: init.history,
        },
        ServerMessage::ThemeChange {
            mood: init.theme.mood,
            genre: init.theme.genre,
            region: init.theme.region,
            background_url: init.theme.background_url,
        },
    ];
    for message in opening {
        if let Ok(json) = serde_json::to_string(&message) {
            if sender.send(Message::Text(json.into())).await.is_err() {
                state.hub.unregister(&registration.key);
                return;
            }
        }
    }

    let mut outbound_rx = outbound_rx;
    let mut close_rx = registration.close_rx;
    let session_handle = init.handle;
    let hub = state.hub.clone();
    let key = registration.key.clone();

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Ping) => {
                                hub.touch_ping(&key);
                                let _ = sender.send(Message::Text(
                                    serde_json::to_string(&ServerMessage::Pong).unwrap_or_default().into(),
                                )).await;
                            }
                            Ok(ClientMessage::PlayerInput { text }) => {
                                session_handle.handle_input(text, false);
                            }
                            Ok(ClientMessage::StartAdventure) | Ok(ClientMessage::Authenticate { .. }) => {}
                            Ok(ClientMessage::Unknown) => {
                                tracing::debug!("received an unrecognized client message type");
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to parse client message");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_))) => {
                        hub.touch_ping(&key);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "websocket read error");
                        break;
                    }
                }
            }
            outgoing = outbound_rx.recv() => {
                match outgoing {
                    Some(message) => {
                        if let Ok(json) = serde_json::to_string(&message) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    None => break,
                }
            }
            changed = close_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some((code, reason)) = close_rx.borrow().clone() {
                    let _ = sender.send(close(code, reason)).await;
                }
                break;
            }
        }
    }

    hub.unregister(&key);
}
