/// Identity→connection registry and broadcast groups
use crate::realtime::events::GatewayEvent;
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, RwLock};

/// Handle to one live connection. The sender feeds the socket's outbound
/// loop; dropping it ends that loop.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub conn_id: String,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl ConnectionHandle {
    pub fn new(conn_id: String, tx: mpsc::UnboundedSender<GatewayEvent>) -> Self {
        Self { conn_id, tx }
    }

    /// Non-blocking send. A closed channel means the socket is gone; the
    /// caller treats that the same as an offline member.
    fn send(&self, event: GatewayEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

#[derive(Default)]
struct RegistryInner {
    /// One connection per identity; a second connection replaces the first
    users: HashMap<String, ConnectionHandle>,
    /// Topic name → member identities
    topics: HashMap<String, HashSet<String>>,
}

/// Concurrency-safe registry of live connections
///
/// The only long-lived shared mutable state in the process. All methods take
/// the lock briefly and never block the push path: sends go through
/// unbounded channels and offline members are skipped.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for an identity. Last connection wins: any
    /// previous handle is returned to the caller and its channel closes
    /// when dropped, which ends the replaced socket's outbound loop.
    pub async fn register(
        &self,
        user_id: &str,
        handle: ConnectionHandle,
    ) -> Option<ConnectionHandle> {
        let mut inner = self.inner.write().await;
        inner.users.insert(user_id.to_string(), handle)
    }

    /// Remove a connection on disconnect. A stale `conn_id` (the identity
    /// reconnected and the old socket is only now going away) leaves the
    /// current registration and its topic memberships untouched.
    pub async fn unregister(&self, user_id: &str, conn_id: &str) {
        let mut inner = self.inner.write().await;

        let current = match inner.users.get(user_id) {
            Some(handle) if handle.conn_id == conn_id => true,
            _ => false,
        };
        if !current {
            return;
        }

        inner.users.remove(user_id);
        for members in inner.topics.values_mut() {
            members.remove(user_id);
        }
        inner.topics.retain(|_, members| !members.is_empty());
    }

    /// Join a topic broadcast group
    pub async fn join_topic(&self, user_id: &str, topic: &str) {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(user_id) {
            return;
        }
        inner
            .topics
            .entry(topic.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    /// Leave a topic broadcast group
    pub async fn leave_topic(&self, user_id: &str, topic: &str) {
        let mut inner = self.inner.write().await;
        let now_empty = match inner.topics.get_mut(topic) {
            Some(members) => {
                members.remove(user_id);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            inner.topics.remove(topic);
        }
    }

    /// Send to one identity's personal group. Returns the number of
    /// connections reached (0 or 1).
    pub async fn send_to_user(&self, user_id: &str, event: GatewayEvent) -> usize {
        let inner = self.inner.read().await;
        match inner.users.get(user_id) {
            Some(handle) => {
                if handle.send(event) {
                    1
                } else {
                    0
                }
            }
            None => 0,
        }
    }

    /// Send to every member of a topic group, skipping offline members
    pub async fn send_to_topic(&self, topic: &str, event: GatewayEvent) -> usize {
        let inner = self.inner.read().await;
        let Some(members) = inner.topics.get(topic) else {
            return 0;
        };

        let mut delivered = 0;
        for member in members {
            if let Some(handle) = inner.users.get(member) {
                if handle.send(event.clone()) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Send to every live connection
    pub async fn broadcast(&self, event: GatewayEvent) -> usize {
        let inner = self.inner.read().await;
        let mut delivered = 0;
        for handle in inner.users.values() {
            if handle.send(event.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Is this identity currently connected?
    pub async fn is_online(&self, user_id: &str) -> bool {
        self.inner.read().await.users.contains_key(user_id)
    }

    /// Number of live connections
    pub async fn online_count(&self) -> usize {
        self.inner.read().await.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn handle(conn_id: &str) -> (ConnectionHandle, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(conn_id.to_string(), tx), rx)
    }

    fn count_event() -> GatewayEvent {
        GatewayEvent::UnreadCount {
            count: 1,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn register_and_send() {
        let registry = ConnectionRegistry::new();
        let (h, mut rx) = handle("c1");
        registry.register("alice", h).await;

        assert_eq!(registry.send_to_user("alice", count_event()).await, 1);
        assert!(rx.recv().await.is_some());
        assert_eq!(registry.send_to_user("bob", count_event()).await, 0);
    }

    #[tokio::test]
    async fn last_connection_wins() {
        let registry = ConnectionRegistry::new();
        let (h1, mut rx1) = handle("c1");
        let (h2, mut rx2) = handle("c2");

        assert!(registry.register("alice", h1).await.is_none());
        let replaced = registry.register("alice", h2).await;
        assert_eq!(replaced.as_ref().unwrap().conn_id, "c1");
        drop(replaced);

        registry.send_to_user("alice", count_event()).await;
        assert!(rx2.try_recv().is_ok());
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn stale_unregister_keeps_new_connection() {
        let registry = ConnectionRegistry::new();
        let (h1, _rx1) = handle("c1");
        let (h2, _rx2) = handle("c2");

        registry.register("alice", h1).await;
        registry.register("alice", h2).await;
        registry.join_topic("alice", "thread:t1").await;

        // The replaced socket's cleanup must not evict the live one
        registry.unregister("alice", "c1").await;
        assert!(registry.is_online("alice").await);
        assert_eq!(registry.send_to_topic("thread:t1", count_event()).await, 1);

        registry.unregister("alice", "c2").await;
        assert!(!registry.is_online("alice").await);
        assert_eq!(registry.send_to_topic("thread:t1", count_event()).await, 0);
    }

    #[tokio::test]
    async fn topic_send_skips_disconnected_members() {
        let registry = ConnectionRegistry::new();
        let (ha, _rxa) = handle("ca");
        let (hb, rxb) = handle("cb");

        registry.register("alice", ha).await;
        registry.register("bob", hb).await;
        registry.join_topic("alice", "thread:t1").await;
        registry.join_topic("bob", "thread:t1").await;

        // Closed channel counts as offline, not as an error
        drop(rxb);
        assert_eq!(registry.send_to_topic("thread:t1", count_event()).await, 1);
    }

    #[tokio::test]
    async fn broadcast_reaches_everyone() {
        let registry = ConnectionRegistry::new();
        let (ha, mut rxa) = handle("ca");
        let (hb, mut rxb) = handle("cb");
        registry.register("alice", ha).await;
        registry.register("bob", hb).await;

        assert_eq!(registry.broadcast(count_event()).await, 2);
        assert!(rxa.try_recv().is_ok());
        assert!(rxb.try_recv().is_ok());
    }
}
