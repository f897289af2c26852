//! Presence registry — maps user identities to live connection handles.
//!
//! The foundation for all signaling: an event can only be delivered to a
//! user who has a registered connection. At most one handle exists per user;
//! a later registration replaces an earlier one (last-writer-wins, no
//! eviction notice to the replaced connection).

use parley_common::event::ServerEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

/// Binds a user identity to a live delivery queue for one transport session.
///
/// Cloning shares the underlying queue; equality of handles is identity of
/// the connection, not of the user.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    connection_id: Uuid,
    tx: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            tx,
        }
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Push an event onto this connection's outbound queue.
    ///
    /// At-most-once: a full queue or a closed connection drops the event and
    /// returns `false`. Never blocks.
    pub fn deliver(&self, event: ServerEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(ev)) => {
                tracing::warn!(
                    connection = %self.connection_id,
                    event = ?ev,
                    "Outbound queue full, dropping event"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Process-wide map from user identity to active connection handle.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    entries: Arc<RwLock<HashMap<Uuid, ConnectionHandle>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user_id` to `handle`, unconditionally replacing any prior handle.
    pub async fn register(&self, user_id: Uuid, handle: ConnectionHandle) {
        let replaced = self
            .entries
            .write()
            .await
            .insert(user_id, handle.clone())
            .is_some();

        tracing::info!(
            user = %user_id,
            connection = %handle.connection_id,
            replaced,
            "User registered"
        );
    }

    /// Current handle for `user_id`, if any. The replace in [`register`] is a
    /// single map insert, so a lookup never observes a half-written entry.
    ///
    /// [`register`]: PresenceRegistry::register
    pub async fn lookup(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.entries.read().await.get(&user_id).cloned()
    }

    /// Remove whichever entry holds `handle`'s connection.
    ///
    /// Matching by connection id means a stale disconnect cannot evict the
    /// handle that already replaced it. Returns the user id that was
    /// unbound, if any.
    pub async fn unregister(&self, handle: &ConnectionHandle) -> Option<Uuid> {
        let mut entries = self.entries.write().await;
        let user_id = entries
            .iter()
            .find(|(_, h)| h.connection_id == handle.connection_id)
            .map(|(uid, _)| *uid)?;
        entries.remove(&user_id);
        drop(entries);

        tracing::info!(
            user = %user_id,
            connection = %handle.connection_id,
            "User unregistered"
        );
        Some(user_id)
    }

    /// Snapshot of every registered handle, for global fan-out.
    pub async fn handles(&self) -> Vec<ConnectionHandle> {
        self.entries.read().await.values().cloned().collect()
    }

    /// Number of users currently registered.
    pub async fn online_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ConnectionHandle, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(8);
        (ConnectionHandle::new(tx), rx)
    }

    #[tokio::test]
    async fn register_is_last_writer_wins() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let (first, _rx1) = handle();
        let (second, mut rx2) = handle();

        registry.register(user, first).await;
        registry.register(user, second.clone()).await;

        let current = registry.lookup(user).await.expect("user registered");
        assert_eq!(current.connection_id(), second.connection_id());

        current.deliver(ServerEvent::CallRejected);
        assert!(matches!(rx2.try_recv(), Ok(ServerEvent::CallRejected)));
        assert_eq!(registry.online_count().await, 1);
    }

    #[tokio::test]
    async fn stale_unregister_does_not_evict_replacement() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let (old, _rx1) = handle();
        let (new, _rx2) = handle();

        registry.register(user, old.clone()).await;
        registry.register(user, new.clone()).await;

        // The old connection's disconnect fires after the replacement
        assert_eq!(registry.unregister(&old).await, None);
        assert!(registry.lookup(user).await.is_some());

        assert_eq!(registry.unregister(&new).await, Some(user));
        assert!(registry.lookup(user).await.is_none());
    }

    #[tokio::test]
    async fn lookup_absent_user_is_none() {
        let registry = PresenceRegistry::new();
        assert!(registry.lookup(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn deliver_reports_closed_queue() {
        let (tx, rx) = mpsc::channel(1);
        let h = ConnectionHandle::new(tx);
        drop(rx);
        assert!(!h.deliver(ServerEvent::CallRejected));
    }
}
