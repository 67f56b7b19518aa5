//! The session hub.
//!
//! Owns the connection registry (id assignment, palette color, per-client
//! outbound channel), the idle-cleanup timer, and the broadcast queue. All
//! mutable shared state sits behind one mutex, held only for the critical
//! section of register/unregister/arm/disarm and never across socket I/O:
//! delivering to a client is a non-blocking channel send, the actual socket
//! write happens in that client's pump task.

pub mod message;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::common::time::{Clock, SystemClock};
use crate::history::{CHAT_PREFIX, DRAW_PREFIX, HISTORY_TTL, HistoryStore, chat_key, draw_key};
use message::{InboundMessage, classify, color_for, enrich_chat, user_count_frame};

/// Outbound channel handle for one client; the receiving end is drained by
/// that client's pump task.
pub type ClientSender = mpsc::UnboundedSender<String>;

/// Identity assigned to a connection at registration.
///
/// Ids start at 1, increase monotonically for the process lifetime and are
/// never reused. The color is `PALETTE[id % 8]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub id: u64,
    pub color: &'static str,
}

/// Hub tunables. Production uses the defaults; tests shorten them.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// TTL applied to every persisted history record.
    pub history_ttl: Duration,
    /// How long the registry must stay empty before history is wiped.
    pub idle_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            history_ttl: HISTORY_TTL,
            idle_timeout: Duration::from_secs(3 * 60),
        }
    }
}

struct Inner {
    clients: HashMap<u64, ClientSender>,
    /// Highest id handed out so far; the next registration gets `next_id + 1`.
    next_id: u64,
    /// Armed idle-cleanup timer, if any. At most one instance exists; arming
    /// while armed aborts the previous instance first.
    cleanup: Option<JoinHandle<()>>,
}

/// The session hub: connection registry, broadcaster and cleanup timer.
pub struct Hub {
    inner: Arc<Mutex<Inner>>,
    publish_tx: mpsc::UnboundedSender<String>,
    history: Arc<dyn HistoryStore>,
    clock: Arc<dyn Clock>,
    config: HubConfig,
}

impl Hub {
    /// Create a hub and spawn its single delivery task.
    pub fn new(history: Arc<dyn HistoryStore>, config: HubConfig) -> Arc<Self> {
        Self::with_clock(history, config, Arc::new(SystemClock))
    }

    /// Like [`Hub::new`] with an injected clock, for tests that need
    /// deterministic timestamps.
    pub fn with_clock(
        history: Arc<dyn HistoryStore>,
        config: HubConfig,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let (publish_tx, publish_rx) = mpsc::unbounded_channel();
        let hub = Arc::new(Self {
            inner: Arc::new(Mutex::new(Inner {
                clients: HashMap::new(),
                next_id: 0,
                cleanup: None,
            })),
            publish_tx,
            history,
            clock,
            config,
        });
        tokio::spawn(Self::deliver_loop(Arc::clone(&hub), publish_rx));
        hub
    }

    /// Register a new connection.
    ///
    /// Assigns the next id, disarms any pending cleanup timer, and publishes
    /// a `user_count` frame reflecting the new size. The frame is enqueued
    /// inside the critical section so consecutive counts keep their order.
    pub async fn register(&self, sender: ClientSender) -> Connection {
        let mut inner = self.inner.lock().await;
        if let Some(timer) = inner.cleanup.take() {
            timer.abort();
            tracing::info!("Idle cleanup timer disarmed");
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.clients.insert(id, sender);
        let count = inner.clients.len();
        self.publish(user_count_frame(count));
        tracing::info!("Connection {} registered ({} active)", id, count);
        Connection {
            id,
            color: color_for(id),
        }
    }

    /// Unregister a connection.
    ///
    /// No-op if the id is not present (the read-loop teardown can race with
    /// broadcast-side pruning). On actual removal publishes `user_count` and,
    /// if the registry is now empty, arms the idle-cleanup timer.
    pub async fn unregister(&self, id: u64) {
        let mut inner = self.inner.lock().await;
        if inner.clients.remove(&id).is_none() {
            return;
        }
        let count = inner.clients.len();
        self.publish(user_count_frame(count));
        tracing::info!("Connection {} unregistered ({} active)", id, count);
        if inner.clients.is_empty() {
            self.arm_cleanup(&mut inner);
        }
    }

    /// Current active-connection count.
    pub async fn size(&self) -> usize {
        self.inner.lock().await.clients.len()
    }

    /// Dispatch one inbound text frame from `conn`.
    ///
    /// Chat frames get the server-owned fields injected; chat and draw/shape
    /// frames are persisted best-effort and then published. Malformed or
    /// unrecognized frames are logged and discarded; the connection stays
    /// open either way.
    pub async fn handle_inbound(&self, conn: &Connection, raw: &str) {
        let decoded = match classify(raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!("Invalid JSON payload from connection {}: {}", conn.id, e);
                return;
            }
        };

        match decoded {
            InboundMessage::Chat(mut fields) => {
                enrich_chat(&mut fields, conn.id, conn.color, self.clock.now_millis());
                let frame = Value::Object(fields).to_string();
                self.persist(chat_key(self.clock.now_nanos()), &frame).await;
                self.publish(frame);
            }
            InboundMessage::Draw(fields) | InboundMessage::Shape(fields) => {
                let frame = Value::Object(fields).to_string();
                self.persist(draw_key(self.clock.now_nanos()), &frame).await;
                self.publish(frame);
            }
            InboundMessage::Unknown(kind) => {
                tracing::warn!(
                    "Unknown message type {:?} from connection {}; discarding",
                    kind,
                    conn.id
                );
            }
        }
    }

    /// Collect the history frames a newly connected client should receive:
    /// all non-expired chat records followed by all non-expired drawing
    /// records, each group in chronological key order.
    pub async fn history_frames(&self) -> Vec<String> {
        let mut frames = self.frames_for_prefix(CHAT_PREFIX).await;
        frames.extend(self.frames_for_prefix(DRAW_PREFIX).await);
        frames
    }

    async fn frames_for_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys = match self.history.list_keys(prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!("Failed to enumerate {}* history keys: {}", prefix, e);
                return Vec::new();
            }
        };
        keys.sort_unstable();

        let mut frames = Vec::with_capacity(keys.len());
        for key in keys {
            match self.history.get(&key).await {
                Ok(Some(value)) => {
                    if serde_json::from_str::<Value>(&value).is_ok() {
                        frames.push(value);
                    } else {
                        tracing::warn!("Invalid JSON in history record {}; skipping", key);
                    }
                }
                Ok(None) => {
                    // Expired between enumeration and read.
                    tracing::debug!("History record {} gone before read", key);
                }
                Err(e) => {
                    tracing::warn!("Failed to read history record {}: {}", key, e);
                }
            }
        }
        frames
    }

    /// Enqueue a frame for fan-out. Bypasses persistence; the single
    /// delivery task drains the queue in FIFO order.
    fn publish(&self, frame: String) {
        // Fails only if the delivery task is gone, i.e. at shutdown.
        let _ = self.publish_tx.send(frame);
    }

    async fn persist(&self, key: String, frame: &str) {
        match self
            .history
            .set_with_ttl(&key, frame, self.config.history_ttl)
            .await
        {
            Ok(()) => tracing::debug!("Saved history record {}", key),
            Err(e) => {
                // Persistence is best-effort; delivery proceeds regardless.
                tracing::warn!("Failed to save history record {}: {}", key, e);
            }
        }
    }

    /// Single consumer of the broadcast queue. One frame at a time goes to
    /// every registered client; a client whose channel is gone is pruned
    /// inline, with the same count publish and timer arming as a
    /// read-initiated disconnect.
    async fn deliver_loop(hub: Arc<Self>, mut publish_rx: mpsc::UnboundedReceiver<String>) {
        while let Some(frame) = publish_rx.recv().await {
            let mut inner = hub.inner.lock().await;
            let mut dead = Vec::new();
            for (id, sender) in &inner.clients {
                if sender.send(frame.clone()).is_err() {
                    dead.push(*id);
                }
            }
            for id in dead {
                inner.clients.remove(&id);
                let count = inner.clients.len();
                tracing::warn!("Connection {} dropped during broadcast ({} active)", id, count);
                hub.publish(user_count_frame(count));
                if inner.clients.is_empty() {
                    hub.arm_cleanup(&mut inner);
                }
            }
        }
    }

    /// Arm the idle-cleanup timer. Caller holds the registry lock; any prior
    /// instance is aborted first so at most one timer is ever live.
    fn arm_cleanup(&self, inner: &mut Inner) {
        if let Some(prev) = inner.cleanup.take() {
            prev.abort();
        }
        let registry = Arc::clone(&self.inner);
        let history = Arc::clone(&self.history);
        let idle_timeout = self.config.idle_timeout;
        inner.cleanup = Some(tokio::spawn(async move {
            tokio::time::sleep(idle_timeout).await;
            fire_cleanup(registry, history, idle_timeout).await;
        }));
        tracing::info!(
            "No active connections; idle cleanup armed for {:?}",
            idle_timeout
        );
    }
}

/// Body of an armed idle-cleanup timer once its deadline elapses.
async fn fire_cleanup(
    registry: Arc<Mutex<Inner>>,
    history: Arc<dyn HistoryStore>,
    idle_timeout: Duration,
) {
    {
        let mut inner = registry.lock().await;
        inner.cleanup = None;
        // A registration can slip in between the deadline elapsing and this
        // task taking the lock; the wipe only proceeds while still empty.
        if !inner.clients.is_empty() {
            return;
        }
    }
    tracing::info!(
        "No active connections for {:?}, cleaning up history",
        idle_timeout
    );
    // The lock is released before store I/O; the wipe is scoped to the hub's
    // own key namespaces.
    for prefix in [CHAT_PREFIX, DRAW_PREFIX] {
        match history.list_keys(prefix).await {
            Ok(keys) if keys.is_empty() => {}
            Ok(keys) => match history.delete_all(&keys).await {
                Ok(()) => {
                    tracing::info!("Deleted {} {}* history records", keys.len(), prefix);
                }
                Err(e) => {
                    tracing::warn!("Failed to delete {}* history records: {}", prefix, e);
                }
            },
            Err(e) => {
                tracing::warn!("Failed to enumerate {}* history keys: {}", prefix, e);
            }
        }
    }
}
