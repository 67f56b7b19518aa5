//! Server execution logic.

use std::sync::Arc;

use axum::{Router, routing::get};

use crate::hub::Hub;

use super::handler::websocket_handler;

/// Build the axum application around a hub.
///
/// Split out from [`run`] so integration tests can serve the app on an
/// ephemeral port.
pub fn app(hub: Arc<Hub>) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(hub)
}

/// Run the session server.
///
/// # Arguments
///
/// * `host` - The host address to bind to (e.g., "0.0.0.0")
/// * `port` - The port number to bind to (e.g., 8080)
/// * `hub` - The session hub shared by all connections
pub async fn run(host: String, port: u16, hub: Arc<Hub>) -> Result<(), Box<dyn std::error::Error>> {
    let bind_addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!(
        "rakugaki session server listening on {}",
        listener.local_addr()?
    );
    tracing::info!("Connect to: ws://{}/ws", bind_addr);

    axum::serve(listener, app(hub)).await?;

    Ok(())
}
