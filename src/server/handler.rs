//! WebSocket connection handler.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;

use crate::hub::Hub;

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<Hub>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

pub async fn handle_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (mut sender, mut receiver) = socket.split();

    // Create the channel this client receives broadcasts on.
    let (tx, mut rx) = mpsc::unbounded_channel();

    // Register before replaying: live frames published during replay buffer
    // in the channel while replay writes to the socket directly, so a newly
    // joined client neither loses a frame nor sees one ahead of history.
    let conn = hub.register(tx).await;

    for frame in hub.history_frames().await {
        if let Err(e) = sender.send(Message::Text(frame.into())).await {
            tracing::debug!("History replay to connection {} failed: {}", conn.id, e);
            hub.unregister(conn.id).await;
            return;
        }
    }
    tracing::info!("Replayed history to connection {}", conn.id);

    // Pump buffered and future broadcasts to this client's socket.
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let reader_hub = Arc::clone(&hub);
    let reader_conn = conn;
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            let msg = match result {
                Ok(msg) => msg,
                Err(e) => {
                    // Transport failure is a normal disconnect, not fatal.
                    tracing::debug!("Read error on connection {}: {}", reader_conn.id, e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    reader_hub.handle_inbound(&reader_conn, text.as_str()).await;
                }
                Message::Close(_) => {
                    tracing::info!("Connection {} requested close", reader_conn.id);
                    break;
                }
                // Ping/pong is handled by the protocol layer.
                _ => {}
            }
        }
    });

    // If either side finishes, tear the other down.
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    hub.unregister(conn.id).await;
}
