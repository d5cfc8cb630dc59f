use std::collections::HashMap;

use axum::extract::ws::Message;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

pub const DEFAULT_CHANNEL_DEPTH: usize = 64;

/// Mission-channel subscribers, owned by the session loop and mutated only
/// there. Each subscriber is drained by its own websocket writer task.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subscribers: HashMap<Uuid, mpsc::Sender<Message>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastMetrics {
    pub delivered: usize,
    pub dropped: usize,
    pub closed: usize,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: Uuid, sender: mpsc::Sender<Message>) -> usize {
        self.subscribers.insert(id, sender);
        self.subscribers.len()
    }

    pub fn unregister(&mut self, id: Uuid) -> usize {
        self.subscribers.remove(&id);
        self.subscribers.len()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Point-to-point send, used for the initial snapshot on attach.
    pub fn send_to(&mut self, id: Uuid, message: Message) -> bool {
        let Some(sender) = self.subscribers.get(&id) else {
            return false;
        };
        match sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(subscriber_id = %id, "subscriber queue full; dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.subscribers.remove(&id);
                false
            }
        }
    }

    /// Offers `message` to every subscriber in one pass. Subscribers whose
    /// writer has gone away are evicted; full queues drop the message.
    pub fn broadcast(&mut self, message: Message) -> BroadcastMetrics {
        let mut metrics = BroadcastMetrics::default();
        let mut closed = Vec::new();
        for (id, sender) in &self.subscribers {
            match sender.try_send(message.clone()) {
                Ok(()) => metrics.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    metrics.dropped += 1;
                    tracing::warn!(subscriber_id = %id, "subscriber queue full; dropping message");
                }
                Err(TrySendError::Closed(_)) => {
                    metrics.closed += 1;
                    closed.push(*id);
                }
            }
        }
        for id in closed {
            self.subscribers.remove(&id);
            tracing::debug!(subscriber_id = %id, "evicted closed subscriber");
        }
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(message: Option<Message>) -> Option<String> {
        match message {
            Some(Message::Text(text)) => Some(text),
            _ => None,
        }
    }

    #[test]
    fn broadcast_reaches_every_subscriber() {
        let mut registry = SubscriberRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        registry.register(Uuid::new_v4(), tx_a);
        assert_eq!(registry.register(Uuid::new_v4(), tx_b), 2);

        let metrics = registry.broadcast(Message::Text("hello".into()));
        assert_eq!(metrics.delivered, 2);
        assert_eq!(text(rx_a.try_recv().ok()).as_deref(), Some("hello"));
        assert_eq!(text(rx_b.try_recv().ok()).as_deref(), Some("hello"));
    }

    #[test]
    fn closed_subscribers_are_evicted() {
        let mut registry = SubscriberRegistry::new();
        let (tx, rx) = mpsc::channel(4);
        registry.register(Uuid::new_v4(), tx);
        drop(rx);

        let metrics = registry.broadcast(Message::Text("gone".into()));
        assert_eq!(metrics.closed, 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn full_queue_drops_without_evicting() {
        let mut registry = SubscriberRegistry::new();
        let (tx, mut rx) = mpsc::channel(1);
        let id = Uuid::new_v4();
        registry.register(id, tx);

        assert!(registry.send_to(id, Message::Text("first".into())));
        let metrics = registry.broadcast(Message::Text("second".into()));
        assert_eq!(metrics.dropped, 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(text(rx.try_recv().ok()).as_deref(), Some("first"));
    }

    #[test]
    fn unregister_and_unknown_ids() {
        let mut registry = SubscriberRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let id = Uuid::new_v4();
        registry.register(id, tx);
        assert!(!registry.send_to(Uuid::new_v4(), Message::Text("x".into())));
        assert_eq!(registry.unregister(id), 0);
    }
}
