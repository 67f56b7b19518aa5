//! In-memory history store.
//!
//! Backs the hub in tests and local development without a Redis server.
//! Expiry is real: deadlines use `tokio::time::Instant`, so tests running
//! under `tokio::time::pause` can fast-forward past the TTL.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{HistoryError, HistoryStore};

/// In-memory `HistoryStore` implementation over a mutex-guarded map.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of non-expired entries, for test assertions.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries.values().filter(|e| e.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), HistoryError> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, HistoryError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                // Expired but not yet collected; drop it on the way out.
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, HistoryError> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.expires_at > now)
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn delete_all(&self, keys: &[String]) -> Result<(), HistoryError> {
        let mut entries = self.entries.lock().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get_roundtrip() {
        // given:
        let store = InMemoryHistoryStore::new();

        // when:
        store
            .set_with_ttl("chat:1", r#"{"type":"chat"}"#, Duration::from_secs(900))
            .await
            .unwrap();

        // then:
        let value = store.get("chat:1").await.unwrap();
        assert_eq!(value.as_deref(), Some(r#"{"type":"chat"}"#));
    }

    #[tokio::test]
    async fn test_get_missing_key_returns_none() {
        // given:
        let store = InMemoryHistoryStore::new();

        // when:
        let value = store.get("chat:missing").await.unwrap();

        // then:
        assert_eq!(value, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        // given: an entry with a 900 second TTL
        let store = InMemoryHistoryStore::new();
        store
            .set_with_ttl("chat:1", "{}", Duration::from_secs(900))
            .await
            .unwrap();
        assert_eq!(store.get("chat:1").await.unwrap().as_deref(), Some("{}"));

        // when: the TTL window elapses
        tokio::time::advance(Duration::from_secs(901)).await;

        // then: the entry is gone from reads and enumeration
        assert_eq!(store.get("chat:1").await.unwrap(), None);
        assert!(store.list_keys("chat:").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_keys_filters_by_prefix() {
        // given:
        let store = InMemoryHistoryStore::new();
        store
            .set_with_ttl("chat:1", "{}", Duration::from_secs(900))
            .await
            .unwrap();
        store
            .set_with_ttl("chat:2", "{}", Duration::from_secs(900))
            .await
            .unwrap();
        store
            .set_with_ttl("draw:1", "{}", Duration::from_secs(900))
            .await
            .unwrap();

        // when:
        let mut chat_keys = store.list_keys("chat:").await.unwrap();
        chat_keys.sort();
        let draw_keys = store.list_keys("draw:").await.unwrap();

        // then:
        assert_eq!(chat_keys, vec!["chat:1", "chat:2"]);
        assert_eq!(draw_keys, vec!["draw:1"]);
    }

    #[tokio::test]
    async fn test_delete_all_removes_given_keys() {
        // given:
        let store = InMemoryHistoryStore::new();
        store
            .set_with_ttl("chat:1", "{}", Duration::from_secs(900))
            .await
            .unwrap();
        store
            .set_with_ttl("draw:1", "{}", Duration::from_secs(900))
            .await
            .unwrap();

        // when:
        store
            .delete_all(&["chat:1".to_string(), "draw:1".to_string()])
            .await
            .unwrap();

        // then:
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_all_ignores_missing_keys() {
        // given:
        let store = InMemoryHistoryStore::new();

        // when:
        let result = store.delete_all(&["chat:ghost".to_string()]).await;

        // then: idempotent, no error
        assert!(result.is_ok());
    }
}
