//! Ephemeral history storage.
//!
//! The hub keeps a short-lived record of every chat and drawing frame so that
//! late joiners can be brought up to date. The hub defines the interface it
//! needs here; concrete backends live in the submodules (Redis for
//! production, in-memory for tests and local development).

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

mod memory;
mod redis;

pub use self::memory::InMemoryHistoryStore;
pub use self::redis::RedisHistoryStore;

/// Key namespace for chat frames.
pub const CHAT_PREFIX: &str = "chat:";

/// Key namespace for drawing frames (both `draw` and `shape` types).
pub const DRAW_PREFIX: &str = "draw:";

/// How long a history record lives before the store expires it.
pub const HISTORY_TTL: Duration = Duration::from_secs(900);

/// Build a chat history key from a nanosecond timestamp.
///
/// Nanosecond timestamps render as fixed-width decimal strings, so
/// lexicographic key order is chronological order.
pub fn chat_key(nanos: i64) -> String {
    format!("{CHAT_PREFIX}{nanos}")
}

/// Build a drawing history key from a nanosecond timestamp.
pub fn draw_key(nanos: i64) -> String {
    format!("{DRAW_PREFIX}{nanos}")
}

/// Errors raised by a history store backend.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The store could not be reached at startup. Fatal: the server must not
    /// serve traffic without a reachable store.
    #[error("history store unavailable: {0}")]
    Unavailable(String),

    /// A runtime operation failed. Non-fatal: callers log and skip.
    #[error("history store backend error: {0}")]
    Backend(String),
}

/// Keyed TTL store holding the ephemeral session history.
///
/// No atomicity is assumed across `list_keys` and per-key `get`: a key may
/// expire between enumeration and read, in which case `get` returns
/// `Ok(None)` and the caller skips it.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Store a value under `key`, expiring after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration)
    -> Result<(), HistoryError>;

    /// Fetch the value for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, HistoryError>;

    /// Enumerate all non-expired keys starting with `prefix`.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, HistoryError>;

    /// Delete every key in `keys`. Missing keys are not an error.
    async fn delete_all(&self, keys: &[String]) -> Result<(), HistoryError>;
}
