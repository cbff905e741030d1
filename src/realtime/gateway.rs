/// Push primitives over the connection registry
use crate::realtime::{events::GatewayEvent, registry::ConnectionRegistry};
use tracing::debug;

/// Outcome of a fire-and-forget push. Logged, never raised; tests assert
/// at-least-attempted delivery through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered(usize),
    NoRecipient,
}

impl DeliveryOutcome {
    fn from_count(count: usize) -> Self {
        if count == 0 {
            DeliveryOutcome::NoRecipient
        } else {
            DeliveryOutcome::Delivered(count)
        }
    }
}

/// Realtime gateway service
#[derive(Default)]
pub struct Gateway {
    registry: ConnectionRegistry,
}

impl Gateway {
    /// Create a new gateway with an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Access the connection registry (socket lifecycle handling)
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Topic group name for a thread's live updates
    pub fn thread_topic(thread_id: &str) -> String {
        format!("thread:{}", thread_id)
    }

    /// Push an event to one identity's personal group
    pub async fn push_to_user(&self, user_id: &str, event: GatewayEvent) -> DeliveryOutcome {
        let delivered = self.registry.send_to_user(user_id, event).await;
        let outcome = DeliveryOutcome::from_count(delivered);
        debug!(user_id, ?outcome, "personal push");
        outcome
    }

    /// Push an event to a topic group
    pub async fn push_to_topic(&self, topic: &str, event: GatewayEvent) -> DeliveryOutcome {
        let delivered = self.registry.send_to_topic(topic, event).await;
        let outcome = DeliveryOutcome::from_count(delivered);
        debug!(topic, ?outcome, "topic push");
        outcome
    }

    /// Push an event to every live connection
    pub async fn broadcast(&self, event: GatewayEvent) -> DeliveryOutcome {
        let delivered = self.registry.broadcast(event).await;
        let outcome = DeliveryOutcome::from_count(delivered);
        debug!(?outcome, "broadcast push");
        outcome
    }
}
