//! Fan-out hub: the single entry point connecting message mutations to
//! every live WebSocket on the affected chat.
//!
//! Each chat with at least one connection owns a delivery task fed by an
//! unbounded queue. `broadcast` snapshots the chat's membership, encodes
//! nothing, and enqueues; the delivery task serializes the event once and
//! pushes a clone of the frame to every recipient's outbound channel. One
//! consumer per chat means events reach connections in the order they were
//! enqueued, and a connection registered after the enqueue never sees the
//! event.

use axum::extract::ws::Message;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::connection::{ConnectionHandle, ConnectionSender};
use super::events::ChatEvent;
use super::registry::ChatRegistry;

/// One unit of work for a chat's delivery task: an event plus the
/// membership snapshot taken when it was enqueued.
struct Delivery {
    event: ChatEvent,
    recipients: Vec<ConnectionHandle>,
}

#[derive(Debug, Default)]
struct HubInner {
    registry: ChatRegistry,
    delivery: DashMap<i64, mpsc::UnboundedSender<Delivery>>,
    conn_seq: AtomicU64,
}

/// Shared fan-out state. Cheap to clone; all clones operate on the same
/// registry and delivery tasks.
#[derive(Debug, Clone, Default)]
pub struct FanoutHub {
    inner: Arc<HubInner>,
}

impl FanoutHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection for a chat and hand back its handle. The
    /// caller keeps the handle for the connection's lifetime and passes it
    /// to [`disconnect`](Self::disconnect) on teardown.
    pub fn connect(&self, chat_id: i64, tx: ConnectionSender) -> ConnectionHandle {
        let conn_id = self.inner.conn_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = ConnectionHandle::new(conn_id, chat_id, tx);
        self.inner.registry.register(handle.clone());
        self.ensure_delivery_task(chat_id);
        tracing::debug!(
            chat_id,
            conn_id,
            connections = self.inner.registry.connection_count(chat_id),
            "connection registered"
        );
        handle
    }

    /// Tear down one connection: ask the peer to close, drop the handle
    /// from the registry and retire the chat's delivery task if nobody is
    /// left. Safe to call any number of times for the same handle, and for
    /// handles whose transport already died.
    pub fn disconnect(&self, handle: &ConnectionHandle) {
        handle.close();
        let chat_id = handle.chat_id();
        let now_empty = self.inner.registry.deregister(chat_id, handle.id());
        if now_empty {
            self.retire_delivery_task(chat_id);
        }
        handle.mark_closed();
        tracing::debug!(
            chat_id,
            conn_id = handle.id(),
            connections = self.inner.registry.connection_count(chat_id),
            "connection deregistered"
        );
    }

    /// Queue an event for every connection currently on the chat. The
    /// membership snapshot is taken here, so connections that register
    /// later never see the event. A chat with no connections is a no-op.
    ///
    /// Always returns immediately: delivery happens on the chat's task and
    /// failed sends prune the dead connection instead of surfacing errors.
    pub fn broadcast(&self, chat_id: i64, event: ChatEvent) {
        let recipients = self.inner.registry.snapshot(chat_id);
        if recipients.is_empty() {
            return;
        }
        if let Some(tx) = self.inner.delivery.get(&chat_id) {
            let _ = tx.send(Delivery { event, recipients });
        }
    }

    /// Live connection count for a chat.
    pub fn connection_count(&self, chat_id: i64) -> usize {
        self.inner.registry.connection_count(chat_id)
    }

    /// Number of chats with at least one live connection.
    pub fn active_chat_count(&self) -> usize {
        self.inner.registry.chat_count()
    }

    fn ensure_delivery_task(&self, chat_id: i64) {
        self.inner.delivery.entry(chat_id).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            let hub = self.clone();
            tokio::spawn(deliver_loop(hub, chat_id, rx));
            tx
        });
    }

    fn retire_delivery_task(&self, chat_id: i64) {
        // Retire only if the chat is still empty: a connect may have
        // repopulated the entry between our deregister and this call.
        self.inner
            .delivery
            .remove_if(&chat_id, |_, _| {
                self.inner.registry.connection_count(chat_id) == 0
            });
    }
}

/// Single consumer for one chat's event queue. Exits when the chat's
/// delivery sender is retired and the queue drains.
async fn deliver_loop(hub: FanoutHub, chat_id: i64, mut rx: mpsc::UnboundedReceiver<Delivery>) {
    tracing::debug!(chat_id, "delivery task started");
    while let Some(delivery) = rx.recv().await {
        let frame = match serde_json::to_string(&delivery.event) {
            Ok(json) => Message::Text(json.into()),
            Err(e) => {
                tracing::warn!(chat_id, error = %e, "failed to encode chat event");
                continue;
            }
        };
        for handle in &delivery.recipients {
            if handle.send(frame.clone()).is_err() {
                // A write failure is indistinguishable from a disconnect.
                tracing::debug!(
                    chat_id,
                    conn_id = handle.id(),
                    "pruning connection after failed delivery"
                );
                hub.disconnect(handle);
            }
        }
    }
    tracing::debug!(chat_id, "delivery task retired");
}
