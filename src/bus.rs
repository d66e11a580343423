//! Event Bus — in-process pub/sub with id dedup and bounded fan-out
//!
//! Strictly an observability surface: audit, health, and live-stream
//! consumers subscribe here, while the core workflow uses direct calls and
//! never depends on bus delivery for correctness. Publish is
//! fire-and-forget with a rolling set deduplicating event ids. Each
//! subscriber owns a bounded queue; a slow subscriber drops its own oldest
//! events without stalling anyone else, and publication order per topic is
//! preserved for every subscriber that keeps up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::debug;

use crate::identity;

/// An event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    pub event_id: String,
    pub topic: String,
    pub payload: serde_json::Value,
    pub published_at: DateTime<Utc>,
}

impl BusEvent {
    pub fn new(topic: &str, payload: serde_json::Value) -> Self {
        Self {
            event_id: identity::event_id(),
            topic: topic.to_string(),
            payload,
            published_at: Utc::now(),
        }
    }
}

/// Bounded drop-oldest queue shared between the bus and one subscriber.
struct SubQueue {
    queue: Mutex<VecDeque<BusEvent>>,
    notify: Notify,
    dropped: AtomicU64,
}

/// Receiving half of a subscription. Dropping it detaches the subscriber.
pub struct Subscription {
    pub topic: String,
    inner: Arc<SubQueue>,
}

impl Subscription {
    /// Receive the next event in publication order, waiting when the queue
    /// is empty.
    pub async fn recv(&self) -> BusEvent {
        loop {
            if let Some(event) = self.try_recv() {
                return event;
            }
            self.inner.notify.notified().await;
        }
    }

    /// Non-blocking receive.
    pub fn try_recv(&self) -> Option<BusEvent> {
        self.inner
            .queue
            .lock()
            .expect("subscription queue lock poisoned")
            .pop_front()
    }

    /// Events this subscriber lost to its own bound.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

/// One registered subscriber.
struct SubscriberSlot {
    topic: String,
    queue: Arc<SubQueue>,
}

/// In-process publish/subscribe bus.
pub struct EventBus {
    per_subscriber_cap: usize,
    id_dedup_cap: usize,
    subscribers: Mutex<Vec<SubscriberSlot>>,
    /// Rolling dedup of published event ids
    seen_ids: Mutex<(HashSet<String>, VecDeque<String>)>,
    published: AtomicU64,
    deduplicated: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time bus statistics.
#[derive(Debug, Clone, Serialize)]
pub struct BusStats {
    pub published_total: u64,
    pub deduplicated_total: u64,
    pub dropped_total: u64,
    pub subscriber_count: usize,
}

impl EventBus {
    pub fn new(per_subscriber_cap: usize, id_dedup_cap: usize) -> Self {
        Self {
            per_subscriber_cap,
            id_dedup_cap,
            subscribers: Mutex::new(Vec::new()),
            seen_ids: Mutex::new((HashSet::new(), VecDeque::new())),
            published: AtomicU64::new(0),
            deduplicated: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Build from the global configuration.
    pub fn from_config() -> Self {
        let cfg = &crate::config::get().bus;
        Self::new(cfg.per_subscriber_cap, cfg.id_dedup_cap)
    }

    /// Subscribe to a topic. `"*"` receives every topic.
    pub fn subscribe(&self, topic: &str) -> Subscription {
        let queue = Arc::new(SubQueue {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        });
        self.subscribers
            .lock()
            .expect("bus subscriber lock poisoned")
            .push(SubscriberSlot {
                topic: topic.to_string(),
                queue: Arc::clone(&queue),
            });
        debug!(topic = topic, "Bus subscription opened");
        Subscription {
            topic: topic.to_string(),
            inner: queue,
        }
    }

    /// Publish an event. Fire-and-forget: duplicate event ids are silently
    /// dropped, detached subscribers are pruned, and a subscriber past its
    /// bound sheds its own oldest pending event.
    pub fn publish(&self, event: BusEvent) {
        {
            let mut seen = self.seen_ids.lock().expect("bus id set lock poisoned");
            let (set, order) = &mut *seen;
            if !set.insert(event.event_id.clone()) {
                self.deduplicated.fetch_add(1, Ordering::Relaxed);
                return;
            }
            order.push_back(event.event_id.clone());
            while order.len() > self.id_dedup_cap {
                if let Some(old) = order.pop_front() {
                    set.remove(&old);
                }
            }
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.subscribers.lock().expect("bus subscriber lock poisoned");
        subscribers.retain(|slot| {
            // Subscriber is gone once only the bus holds the queue.
            if Arc::strong_count(&slot.queue) == 1 {
                return false;
            }
            if slot.topic != "*" && slot.topic != event.topic {
                return true;
            }
            let mut queue = slot
                .queue
                .queue
                .lock()
                .expect("subscription queue lock poisoned");
            while queue.len() >= self.per_subscriber_cap {
                queue.pop_front();
                slot.queue.dropped.fetch_add(1, Ordering::Relaxed);
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(event.clone());
            drop(queue);
            slot.queue.notify.notify_one();
            true
        });
    }

    /// Convenience publish of a payload on a topic.
    pub fn publish_json(&self, topic: &str, payload: serde_json::Value) {
        self.publish(BusEvent::new(topic, payload));
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            published_total: self.published.load(Ordering::Relaxed),
            deduplicated_total: self.deduplicated.load(Ordering::Relaxed),
            dropped_total: self.dropped.load(Ordering::Relaxed),
            subscriber_count: self
                .subscribers
                .lock()
                .expect("bus subscriber lock poisoned")
                .len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_their_topic_in_order() {
        let bus = EventBus::new(1_000, 10_000);
        let sub = bus.subscribe("threat_detected");
        let all = bus.subscribe("*");

        for i in 0..5 {
            bus.publish_json("threat_detected", json!({ "seq": i }));
        }
        bus.publish_json("assessment_complete", json!({ "seq": 99 }));

        for i in 0..5 {
            let event = sub.recv().await;
            assert_eq!(event.payload["seq"], i);
        }
        assert!(sub.try_recv().is_none());

        // Wildcard subscriber sees both topics, still in publish order.
        for i in 0..5 {
            assert_eq!(all.recv().await.payload["seq"], i);
        }
        assert_eq!(all.recv().await.topic, "assessment_complete");
    }

    #[tokio::test]
    async fn duplicate_event_ids_are_dropped() {
        let bus = EventBus::new(1_000, 10_000);
        let sub = bus.subscribe("t");

        let event = BusEvent::new("t", json!({}));
        bus.publish(event.clone());
        bus.publish(event);

        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_none());
        assert_eq!(bus.stats().deduplicated_total, 1);
    }

    #[tokio::test]
    async fn slow_subscriber_sheds_oldest_without_blocking() {
        let bus = EventBus::new(10, 10_000);
        let slow = bus.subscribe("t");
        for i in 0..25 {
            bus.publish_json("t", json!({ "seq": i }));
        }
        // The queue holds only the newest 10 events.
        assert_eq!(slow.dropped(), 15);
        assert_eq!(slow.try_recv().unwrap().payload["seq"], 15);
        assert_eq!(bus.stats().dropped_total, 15);
    }

    #[tokio::test]
    async fn dropped_subscription_is_pruned_on_next_publish() {
        let bus = EventBus::new(10, 10_000);
        drop(bus.subscribe("t"));
        bus.publish_json("t", json!({}));
        assert_eq!(bus.stats().subscriber_count, 0);
    }

    #[tokio::test]
    async fn id_dedup_set_is_bounded() {
        let bus = EventBus::new(10, 5);
        for i in 0..20 {
            bus.publish_json("t", json!({ "seq": i }));
        }
        let seen = bus.seen_ids.lock().unwrap();
        assert!(seen.0.len() <= 5);
        assert!(seen.1.len() <= 5);
    }
}
