use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;
use axum::routing::get;
use futures::SinkExt;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use opshell_core::spawn_session;
use opshell_protocol::ClientMessage;
use opshell_protocol::ServerMessage;

use crate::config::ServerConfig;

const EVENT_QUEUE_DEPTH: usize = 256;

pub fn router(config: ServerConfig) -> Router {
    Router::new()
        .route("/channel", get(ws_handler))
        .with_state(Arc::new(config))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(config): State<Arc<ServerConfig>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, config))
}

async fn handle_socket(socket: WebSocket, config: Arc<ServerConfig>) {
    info!("channel connected");

    let session_config = match config.session_config() {
        Ok(session_config) => session_config,
        Err(err) => {
            error!(error = %err, "could not resolve session working directory");
            return;
        }
    };

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (event_tx, mut event_rx) = mpsc::channel::<ServerMessage>(EVENT_QUEUE_DEPTH);
    let session = spawn_session(session_config, event_tx);

    // Forward every session event to the socket as it arrives.
    let send_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if ws_tx.send(Message::Text(json.into())).await.is_err() {
                        debug!("websocket send failed, client disconnected");
                        break;
                    }
                }
                Err(err) => error!(error = %err, "failed to serialize event"),
            }
        }
    });

    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Submit { text }) => {
                    if session.submit(text).await.is_err() {
                        break;
                    }
                }
                Err(err) => warn!(error = %err, "ignoring malformed client message"),
            },
            Ok(Message::Close(_)) => break,
            // Ping/pong is answered by axum; binary frames are not part of
            // the protocol.
            Ok(_) => {}
            Err(err) => {
                debug!(error = %err, "websocket receive failed");
                break;
            }
        }
    }

    // Dropping the handle closes the submission queue; the actor and the
    // send task wind down with it.
    drop(session);
    send_task.abort();
    info!("channel disconnected");
}
