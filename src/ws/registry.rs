//! Per-chat connection registry.

use dashmap::DashMap;

use super::connection::ConnectionHandle;

/// Maps a chat id to the set of live connection handles subscribed to it.
///
/// An entry exists only while it has at least one handle: deregistering the
/// last member removes the entry, so idle chats cost nothing. Every
/// operation is total: absent chats behave as empty sets.
#[derive(Debug, Default)]
pub struct ChatRegistry {
    chats: DashMap<i64, Vec<ConnectionHandle>>,
}

impl ChatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle to its chat's set. Registering the same connection id
    /// twice replaces the stored handle instead of duplicating it.
    pub fn register(&self, handle: ConnectionHandle) {
        let mut conns = self.chats.entry(handle.chat_id()).or_default();
        if let Some(existing) = conns.iter_mut().find(|h| h.id() == handle.id()) {
            *existing = handle;
        } else {
            conns.push(handle);
        }
    }

    /// Remove one handle from a chat. Unknown chats and unknown connection
    /// ids are silent no-ops. Returns true when the chat is left with no
    /// connections (its entry has been dropped).
    pub fn deregister(&self, chat_id: i64, conn_id: u64) -> bool {
        let now_empty = match self.chats.get_mut(&chat_id) {
            Some(mut conns) => {
                conns.retain(|h| h.id() != conn_id);
                conns.is_empty()
            }
            None => return true,
        };
        if now_empty {
            // Re-check emptiness under the shard lock so a concurrent
            // register between our release and this remove is not lost.
            self.chats.remove_if(&chat_id, |_, conns| conns.is_empty());
        }
        now_empty
    }

    /// Point-in-time copy of a chat's membership, safe to iterate while the
    /// registry keeps changing underneath. Absent chats yield an empty set.
    pub fn snapshot(&self, chat_id: i64) -> Vec<ConnectionHandle> {
        self.chats
            .get(&chat_id)
            .map(|conns| conns.clone())
            .unwrap_or_default()
    }

    /// Number of live connections currently registered for a chat.
    pub fn connection_count(&self, chat_id: i64) -> usize {
        self.chats.get(&chat_id).map(|conns| conns.len()).unwrap_or(0)
    }

    /// Number of chats with at least one live connection.
    pub fn chat_count(&self) -> usize {
        self.chats.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn handle(id: u64, chat_id: i64) -> ConnectionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        // Keep the receiver alive for the duration of the test.
        std::mem::forget(rx);
        ConnectionHandle::new(id, chat_id, tx)
    }

    #[test]
    fn register_groups_by_chat() {
        let registry = ChatRegistry::new();
        registry.register(handle(1, 42));
        registry.register(handle(2, 42));
        registry.register(handle(3, 7));

        assert_eq!(registry.connection_count(42), 2);
        assert_eq!(registry.connection_count(7), 1);
        assert_eq!(registry.chat_count(), 2);
    }

    #[test]
    fn register_same_id_replaces() {
        let registry = ChatRegistry::new();
        registry.register(handle(1, 42));
        registry.register(handle(1, 42));
        assert_eq!(registry.connection_count(42), 1);
    }

    #[test]
    fn deregister_last_drops_entry() {
        let registry = ChatRegistry::new();
        registry.register(handle(1, 42));
        registry.register(handle(2, 42));

        assert!(!registry.deregister(42, 1));
        assert_eq!(registry.connection_count(42), 1);

        assert!(registry.deregister(42, 2));
        assert_eq!(registry.chat_count(), 0);
    }

    #[test]
    fn deregister_unknown_is_noop() {
        let registry = ChatRegistry::new();
        registry.register(handle(1, 42));

        // Unknown chat and unknown connection id both pass silently.
        registry.deregister(99, 1);
        assert!(!registry.deregister(42, 99));
        assert_eq!(registry.connection_count(42), 1);
    }

    #[test]
    fn snapshot_is_detached_copy() {
        let registry = ChatRegistry::new();
        registry.register(handle(1, 42));
        registry.register(handle(2, 42));

        let snapshot = registry.snapshot(42);
        registry.deregister(42, 1);
        registry.deregister(42, 2);

        // The copy is unaffected by later membership changes.
        assert_eq!(snapshot.len(), 2);
        assert!(registry.snapshot(42).is_empty());
    }
}
