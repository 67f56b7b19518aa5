//! WebSocket session server.

mod handler;
mod runner;

pub use runner::{app, run};
