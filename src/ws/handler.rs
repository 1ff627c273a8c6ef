//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::http::routes::AppError;
use crate::presence::PresenceHandle;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.presence.is_closed() {
        return AppError::Unavailable("Presence hub is not running".to_string()).into_response();
    }

    let limiter = ConnectionRateLimiter::new(state.config.pos_rate_limit);
    ws.on_upgrade(move |socket| handle_socket(socket, state.presence, limiter))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, presence: PresenceHandle, limiter: ConnectionRateLimiter) {
    let (ws_sink, ws_stream) = socket.split();
    let (outbox, outbox_rx) = mpsc::unbounded_channel();

    let Some(peer_id) = presence.connect(outbox).await else {
        error!("Presence hub unavailable, dropping connection");
        return;
    };
    info!(peer_id = %peer_id, "New WebSocket connection");

    let writer_handle = tokio::spawn(write_outbox(peer_id, ws_sink, outbox_rx));

    read_frames(peer_id, ws_stream, &presence, &limiter).await;

    presence.disconnect(peer_id).await;
    writer_handle.abort();

    info!(peer_id = %peer_id, "WebSocket connection closed");
}

/// Writer task: outbox -> WebSocket
async fn write_outbox(
    peer_id: Uuid,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut outbox_rx: mpsc::UnboundedReceiver<ServerMsg>,
) {
    while let Some(msg) = outbox_rx.recv().await {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(peer_id = %peer_id, error = %e, "WebSocket send failed");
            break;
        }
    }
    let _ = ws_sink.close().await;
}

/// Reader loop: WebSocket -> presence hub
async fn read_frames(
    peer_id: Uuid,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    presence: &PresenceHandle,
    limiter: &ConnectionRateLimiter,
) {
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !limiter.check_frame() {
                    warn!(peer_id = %peer_id, "Rate limited inbound frame");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(ClientMsg::Pos { x, y }) => {
                        presence.report_position(peer_id, x, y).await;
                    }
                    Err(e) => {
                        debug!(peer_id = %peer_id, error = %e, "Dropped malformed client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(peer_id = %peer_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(peer_id = %peer_id, "Client initiated close");
                break;
            }
            Err(e) => {
                debug!(peer_id = %peer_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
