//! Connection handles: the registry-facing view of one live WebSocket.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::mpsc;

/// Sender half of a connection's outbound frame channel. The receiving end
/// is owned by the connection's writer task, which drains it to the socket.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

const STATUS_OPEN: u8 = 0;
const STATUS_CLOSING: u8 = 1;
const STATUS_CLOSED: u8 = 2;

/// Lifecycle of a connection as seen by the fan-out layer.
///
/// `Open` from registration until the transport drops or a send fails,
/// `Closing` while teardown is in flight, `Closed` once deregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Open,
    Closing,
    Closed,
}

/// Delivery to a single connection failed because its writer task is gone.
/// The caller responds by deregistering the connection, never by retrying.
#[derive(Debug, thiserror::Error)]
#[error("connection {conn_id} outbound channel closed")]
pub struct SendFailure {
    pub conn_id: u64,
}

/// One client's live session, bound to a single chat for its lifetime.
///
/// Handles are cheap to clone and all clones share the same status and
/// outbound channel. The socket itself stays with the connection's actor
/// task; a handle only enqueues frames.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    chat_id: i64,
    tx: ConnectionSender,
    status: Arc<AtomicU8>,
}

impl ConnectionHandle {
    pub(crate) fn new(id: u64, chat_id: i64, tx: ConnectionSender) -> Self {
        Self {
            id,
            chat_id,
            tx,
            status: Arc::new(AtomicU8::new(STATUS_OPEN)),
        }
    }

    /// Process-wide unique id, assigned at connect time.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The chat this connection is subscribed to.
    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    pub fn status(&self) -> ConnectionStatus {
        match self.status.load(Ordering::Acquire) {
            STATUS_OPEN => ConnectionStatus::Open,
            STATUS_CLOSING => ConnectionStatus::Closing,
            _ => ConnectionStatus::Closed,
        }
    }

    /// Enqueue one frame for the writer task. Never blocks: the channel is
    /// unbounded, so a slow client accumulates backlog instead of stalling
    /// the sender. Fails once the connection has left the `Open` state or
    /// its writer task has exited; on failure the handle is marked
    /// `Closing` and the caller is expected to deregister it.
    pub fn send(&self, frame: Message) -> Result<(), SendFailure> {
        if self.status() != ConnectionStatus::Open {
            return Err(SendFailure { conn_id: self.id });
        }
        self.tx.send(frame).map_err(|_| {
            self.mark_closing();
            SendFailure { conn_id: self.id }
        })
    }

    /// Ask the peer to close by enqueueing a Close frame. Idempotent and
    /// safe to call after the transport already died on its own.
    pub fn close(&self) {
        if self.mark_closing() {
            let _ = self.tx.send(Message::Close(None));
        }
    }

    /// Transition `Open` -> `Closing`. Returns whether this call made the
    /// transition (false if teardown was already underway).
    pub(crate) fn mark_closing(&self) -> bool {
        self.status
            .compare_exchange(
                STATUS_OPEN,
                STATUS_CLOSING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn mark_closed(&self) {
        self.status.store(STATUS_CLOSED, Ordering::Release);
    }
}
