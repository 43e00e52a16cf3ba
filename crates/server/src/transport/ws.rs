// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket upgrade and per-connection event loop for `/ws/chat`.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::ErrorCode;
use crate::state::AppState;
use crate::transport::handler::{Connection, Disposition, TICK_INTERVAL};
use crate::transport::ws_msg::{ws_error, ClientMessage, ServerMessage};

/// Close code for a failed `auth` frame; clients must not reconnect.
pub const CLOSE_UNAUTHORIZED: u16 = 4001;

/// `GET /ws/chat` — WebSocket upgrade. Authentication happens on the
/// first frame, not at upgrade time.
pub async fn ws_chat_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(state, socket))
}

/// Per-connection event loop: inbound frames, outbound frames from turn
/// jobs, and the periodic tick share one select loop.
async fn handle_connection(state: Arc<AppState>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let mut conn = Connection::new(Arc::clone(&state), out_tx);
    let mut tick = tokio::time::interval(TICK_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            Some(msg) = out_rx.recv() => {
                if send_json(&mut ws_tx, &msg).await.is_err() {
                    break;
                }
            }

            _ = tick.tick() => conn.tick().await,

            frame = ws_rx.next() => {
                let frame = match frame {
                    Some(Ok(f)) => f,
                    Some(Err(_)) | None => break,
                };
                match frame {
                    Message::Text(text) => {
                        let msg = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => msg,
                            Err(e) => {
                                debug!(err = %e, "unparseable client frame");
                                let err = ws_error(ErrorCode::InvalidMessage, "invalid message");
                                if send_json(&mut ws_tx, &err).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };
                        match conn.handle(msg).await {
                            Disposition::Continue => {}
                            Disposition::CloseUnauthorized => {
                                let close = CloseFrame {
                                    code: CLOSE_UNAUTHORIZED,
                                    reason: "authentication failed".into(),
                                };
                                let _ = ws_tx.send(Message::Close(Some(close))).await;
                                break;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    // Pings are answered by axum; binary frames are not
                    // part of the protocol.
                    _ => {}
                }
            }
        }
    }

    conn.on_disconnect().await;
}

async fn send_json<S>(ws_tx: &mut S, msg: &ServerMessage) -> Result<(), axum::Error>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    let text = serde_json::to_string(msg).unwrap_or_else(|_| "{}".to_owned());
    ws_tx.send(Message::Text(text.into())).await
}
