//! EventHub - typed publish/subscribe distribution
//!
//! ## Responsibilities
//!
//! - Subscriber registration/deregistration (one entry per stream client)
//! - Fan-out of normalized events from the adapter to every subscriber
//!
//! Delivery is best-effort: a subscriber that went away just logs a failed
//! send until its entry is removed. Locking is a brief synchronous critical
//! section so deregistration can run from a drop guard.

use crate::models::DisplayEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Subscriber connection
struct Subscriber {
    id: Uuid,
    tx: mpsc::UnboundedSender<DisplayEvent>,
}

/// EventHub instance
pub struct EventHub {
    subscribers: RwLock<HashMap<Uuid, Subscriber>>,
    subscriber_count: AtomicU64,
}

impl EventHub {
    /// Create new EventHub
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            subscriber_count: AtomicU64::new(0),
        }
    }

    /// Register a new subscriber
    pub fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<DisplayEvent>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        if let Ok(mut subscribers) = self.subscribers.write() {
            subscribers.insert(id, Subscriber { id, tx });
        }
        self.subscriber_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(subscriber_id = %id, "Stream client connected");

        (id, rx)
    }

    /// Deregister a subscriber
    pub fn unregister(&self, id: &Uuid) {
        let removed = self
            .subscribers
            .write()
            .map(|mut subscribers| subscribers.remove(id).is_some())
            .unwrap_or(false);

        if removed {
            self.subscriber_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(subscriber_id = %id, "Stream client disconnected");
        }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: DisplayEvent) {
        let subscribers = match self.subscribers.read() {
            Ok(guard) => guard,
            Err(_) => return,
        };

        tracing::debug!(
            event_id = %event.id,
            subscriber_count = subscribers.len(),
            "Publishing event to stream clients"
        );

        for subscriber in subscribers.values() {
            if let Err(e) = subscriber.tx.send(event.clone()) {
                tracing::warn!(subscriber_id = %subscriber.id, error = %e, "Failed to deliver event");
            }
        }
    }

    /// Get subscriber count
    pub fn subscriber_count(&self) -> u64 {
        self.subscriber_count.load(Ordering::Relaxed)
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str) -> DisplayEvent {
        DisplayEvent {
            id: id.to_string(),
            timestamp: None,
            image_url: Some("data:image/*;base64,aaaa".to_string()),
            title: None,
            subtitle: None,
            meta: None,
            alt: None,
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_events() {
        let hub = EventHub::new();
        let (_id, mut rx) = hub.register();

        hub.publish(event("e1"));
        hub.publish(event("e2"));

        assert_eq!(rx.recv().await.unwrap().id, "e1");
        assert_eq!(rx.recv().await.unwrap().id, "e2");
    }

    #[tokio::test]
    async fn test_unregistered_subscriber_gets_nothing() {
        let hub = EventHub::new();
        let (id, mut rx) = hub.register();
        hub.unregister(&id);

        hub.publish(event("e1"));
        // sender side was dropped on unregister, so the channel is closed
        assert!(rx.recv().await.is_none());
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_fan_out_to_multiple_subscribers() {
        let hub = EventHub::new();
        let (_a, mut rx_a) = hub.register();
        let (_b, mut rx_b) = hub.register();
        assert_eq!(hub.subscriber_count(), 2);

        hub.publish(event("e1"));

        assert_eq!(rx_a.recv().await.unwrap().id, "e1");
        assert_eq!(rx_b.recv().await.unwrap().id, "e1");
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let hub = EventHub::new();
        let (id, _rx) = hub.register();
        hub.unregister(&id);
        hub.unregister(&id);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
