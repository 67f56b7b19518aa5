//! rakugaki session server binary.
//!
//! Clients connect over WebSocket at `/ws`, exchange chat and drawing
//! frames, and receive the recent session history on join.
//!
//! Run with:
//! ```not_rust
//! REDIS_URL=redis://127.0.0.1:6379 cargo run --bin server
//! cargo run --bin server -- --host 0.0.0.0 --port 3000
//! ```

use std::sync::Arc;

use clap::Parser;
use rakugaki::{
    common::logger::setup_logger,
    history::RedisHistoryStore,
    hub::{Hub, HubConfig},
    server,
};

#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(about = "rakugaki session server: WebSocket hub with Redis-backed history", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,
}

#[tokio::main]
async fn main() {
    // A local .env is a development convenience; production deployments
    // supply real environment variables. Loaded before logger setup so that
    // a RUST_LOG entry in the file is honored.
    if std::env::var("APP_ENV").as_deref() != Ok("production")
        && dotenvy::dotenv().is_err()
    {
        eprintln!("No .env file found, using process environment");
    }

    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    let redis_url = match std::env::var("REDIS_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::error!("REDIS_URL is not set");
            std::process::exit(1);
        }
    };

    // A reachable store is a hard startup requirement; without it the
    // server must not serve traffic.
    let history = match RedisHistoryStore::connect(&redis_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("Could not connect to Redis: {}", e);
            std::process::exit(1);
        }
    };

    let hub = Hub::new(history, HubConfig::default());

    if let Err(e) = server::run(args.host, args.port, hub).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
