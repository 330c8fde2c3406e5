//! Progress channel (WebSocket)
//!
//! Every connection first receives a `status_update` with the full backend
//! status, then every broadcast frame plus a periodic `ping`. Inbound text
//! is ignored.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use rbg_common::api::CHANNEL_PATH;
use rbg_common::events::ChannelMessage;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::AppState;

/// GET /ws/progress
pub async fn progress_channel(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_channel(socket, state))
}

async fn serve_channel(mut socket: WebSocket, state: AppState) {
    // Subscribe before the snapshot so no frame falls between the two
    let mut frames = state.frames.subscribe();
    let mut disconnects = state.disconnect_signal();
    disconnects.borrow_and_update();

    info!("Progress channel opened");

    let status = state.status.read().await.clone();
    if send_frame(&mut socket, &ChannelMessage::StatusUpdate { status })
        .await
        .is_err()
    {
        return;
    }

    let mut ping = tokio::time::interval(state.config.ping_interval());
    // first tick completes immediately
    ping.tick().await;

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    if send_frame(&mut socket, &frame).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Progress channel lagged, frames dropped");
                }
                Err(RecvError::Closed) => break,
            },
            _ = ping.tick() => {
                if send_frame(&mut socket, &ChannelMessage::Ping).await.is_err() {
                    break;
                }
            }
            _ = disconnects.changed() => {
                if let Err(e) = socket.send(Message::Close(None)).await {
                    debug!(error = %e, "Close frame not delivered");
                }
                break;
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => debug!(%text, "Ignoring inbound channel text"),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    info!("Progress channel closed");
}

async fn send_frame(socket: &mut WebSocket, frame: &ChannelMessage) -> Result<(), ()> {
    let text = frame.to_frame().map_err(|e| {
        warn!(error = %e, "Failed to encode channel frame");
    })?;
    socket.send(Message::Text(text)).await.map_err(|e| {
        debug!(error = %e, "Channel send failed");
    })
}

/// Build channel routes
pub fn channel_routes() -> Router<AppState> {
    Router::new().route(CHANNEL_PATH, get(progress_channel))
}
