use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::protocol::{WsIncoming, WS_APP_PROTOCOL};
use crate::core::config::settings::default_local_origins;
use crate::core::errors::ChatError;
use crate::session::{ChatSession, IndexOutcome, ModelSwitch};
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let origin_ok = validate_origin(&headers, &state);

    ws.protocols([WS_APP_PROTOCOL])
        .on_upgrade(move |socket| handle_socket(socket, state, origin_ok))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, origin_ok: bool) {
    let (mut sender, mut receiver) = socket.split();

    if !origin_ok {
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: 4003,
                reason: "Forbidden: Invalid Origin".into(),
            })))
            .await;
        return;
    }

    let mut session = state.new_session();
    info!("WebSocket session {} connected", session.id());

    // One event at a time: an answer stream is drained to completion
    // before the next event is read.
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                let event = match serde_json::from_str::<WsIncoming>(&text) {
                    Ok(event) => event,
                    Err(_) => {
                        if send_json(
                            &mut sender,
                            json!({"type": "error", "message": "Unrecognized event"}),
                        )
                        .await
                        .is_err()
                        {
                            break;
                        }
                        continue;
                    }
                };

                if let Err(err) = handle_event(&mut sender, &state, &mut session, event).await {
                    if send_json(
                        &mut sender,
                        json!({"type": "error", "message": err.to_string()}),
                    )
                    .await
                    .is_err()
                    {
                        break;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    let session_id = session.id().to_string();
    match session.close().await {
        Ok(removed) => info!(
            "WebSocket session {} closed, {} stored chunk(s) dropped",
            session_id, removed
        ),
        Err(err) => warn!("Failed to clean up session {}: {}", session_id, err),
    }
}

async fn handle_event(
    sender: &mut SplitSink<WebSocket, Message>,
    state: &Arc<AppState>,
    session: &mut ChatSession,
    event: WsIncoming,
) -> Result<(), ChatError> {
    match event {
        WsIncoming::SelectModel { model } => {
            let switch = session.select_model(&model).await?;
            let (invalidated, dropped) = match switch {
                ModelSwitch::Unchanged => (false, 0),
                ModelSwitch::Invalidated { dropped } => (true, dropped),
            };
            send_json(
                sender,
                json!({
                    "type": "model_changed",
                    "model": session.active_model().label,
                    "invalidated": invalidated,
                    "dropped": dropped,
                }),
            )
            .await
        }
        WsIncoming::Upload { name, data } => {
            send_json(sender, json!({"type": "indexing", "name": name})).await?;
            let bytes = BASE64
                .decode(data.as_bytes())
                .map_err(|e| ChatError::Config(format!("Invalid upload payload: {}", e)))?;
            let outcome = session.index_document(&name, &bytes).await?;
            send_ready(sender, &outcome).await
        }
        WsIncoming::UploadUrl { url } => {
            send_json(sender, json!({"type": "indexing", "name": url})).await?;
            let text = state.fetcher.fetch_text(&url).await?;
            let outcome = session.index_text(&url, &text).await?;
            send_ready(sender, &outcome).await
        }
        WsIncoming::Chat { message } => stream_answer(sender, session, &message).await,
        WsIncoming::Reset => {
            session.reset_conversation();
            send_json(sender, json!({"type": "reset_done"})).await
        }
        WsIncoming::History => {
            send_json(
                sender,
                json!({"type": "history", "messages": session.transcript()}),
            )
            .await
        }
    }
}

async fn send_ready(
    sender: &mut SplitSink<WebSocket, Message>,
    outcome: &IndexOutcome,
) -> Result<(), ChatError> {
    send_json(
        sender,
        json!({
            "type": "ready",
            "name": outcome.pipeline.source(),
            "cached": outcome.cached,
            "chunks": outcome.pipeline.chunk_count(),
        }),
    )
    .await
}

async fn stream_answer(
    sender: &mut SplitSink<WebSocket, Message>,
    session: &ChatSession,
    message: &str,
) -> Result<(), ChatError> {
    let mut stream = session.answer(message).await?;

    while let Some(fragment) = stream.next_fragment().await {
        match fragment {
            Ok(chunk) => {
                if chunk.is_empty() {
                    continue;
                }
                send_json(sender, json!({"type": "chunk", "message": chunk})).await?;
            }
            Err(err) => {
                send_json(
                    sender,
                    json!({"type": "error", "message": err.to_string()}),
                )
                .await?;
                return Ok(());
            }
        }
    }

    send_json(sender, json!({"type": "done"})).await
}

pub async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    payload: Value,
) -> Result<(), ChatError> {
    let text = serde_json::to_string(&payload).map_err(ChatError::internal)?;
    sender
        .send(Message::Text(text))
        .await
        .map_err(ChatError::internal)?;
    Ok(())
}

fn validate_origin(headers: &HeaderMap, state: &AppState) -> bool {
    let Some(origin) = headers.get("origin").and_then(|v| v.to_str().ok()) else {
        // Non-browser clients send no origin; only allow them outside
        // production.
        let env = std::env::var("DOCCHAT_ENV").unwrap_or_else(|_| "production".to_string());
        return env != "production";
    };

    let configured = &state.config.server.cors_allowed_origins;
    let allowed = if configured.is_empty() {
        default_local_origins()
    } else {
        configured.clone()
    };

    allowed.iter().any(|entry| entry == origin)
}
