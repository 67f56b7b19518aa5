//! Redis-backed history store.
//!
//! Records are plain string values with a server-side TTL, so expiry needs no
//! help from this process. Key enumeration uses `KEYS <prefix>*`; the history
//! keyspace stays small (15 minute TTL) so the blocking scan is acceptable.

use std::time::Duration;

use redis::{AsyncCommands, Client, aio::ConnectionManager};

use super::{HistoryError, HistoryStore};

/// `HistoryStore` implementation over a Redis connection manager.
///
/// The manager multiplexes one connection and reconnects on failure; clones
/// are cheap handles onto the same connection.
pub struct RedisHistoryStore {
    conn: ConnectionManager,
}

impl RedisHistoryStore {
    /// Parse `url`, connect, and verify the server responds to `PING`.
    ///
    /// A failure here means the store is unreachable at startup, which is
    /// fatal for the caller: the server must not serve traffic without a
    /// reachable store.
    pub async fn connect(url: &str) -> Result<Self, HistoryError> {
        let client =
            Client::open(url).map_err(|e| HistoryError::Unavailable(e.to_string()))?;
        let mut conn = client
            .get_connection_manager()
            .await
            .map_err(|e| HistoryError::Unavailable(e.to_string()))?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| HistoryError::Unavailable(e.to_string()))?;
        tracing::info!("Connected to Redis: {}", pong);

        Ok(Self { conn })
    }
}

fn backend(e: redis::RedisError) -> HistoryError {
    HistoryError::Backend(e.to_string())
}

#[async_trait::async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), HistoryError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, value, ttl.as_secs())
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, HistoryError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await.map_err(backend)?;
        Ok(value)
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, HistoryError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(format!("{prefix}*")).await.map_err(backend)?;
        Ok(keys)
    }

    async fn delete_all(&self, keys: &[String]) -> Result<(), HistoryError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: () = conn.del(keys).await.map_err(backend)?;
        Ok(())
    }
}
