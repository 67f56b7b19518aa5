//! rakugaki session server library.
//!
//! Real-time collaborative whiteboard & chat hub: clients connect over
//! WebSocket, exchange chat text and vector-drawing events, and see a live
//! count of connected participants. Recent history is kept in a keyed TTL
//! store and replayed to late joiners.

pub mod history;
pub mod hub;
pub mod server;

// shared library
pub mod common;
