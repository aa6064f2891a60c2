// Path: crates/attest-events/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

//! The event bus (C10, `spec.md` §4.10): a finite set of named topics,
//! at-most-once push delivery to per-client subscribers over a bounded
//! queue, and a bounded ring buffer for cold replay via `recent_events`.

use attest_types::ids::DeviceId;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

pub use attest_types::model::Event;

/// The finite, enumerated topic set (`spec.md` §4.10). `PROPOSAL_*` is one
/// topic per FSM transition, enumerated here rather than left open-ended.
pub const TOPICS: &[&str] = &[
    "DEVICE_REGISTERED",
    "DEVICE_AUTHENTICATED",
    "DATA_SUBMITTED",
    "BATCH_CREATED",
    "BATCH_ANCHOR_PROGRESS",
    "DEVICE_STATUS_CHANGE",
    "PROPOSAL_CREATED",
    "PROPOSAL_APPROVED",
    "PROPOSAL_REJECTED",
    "PROPOSAL_EXECUTED",
    "PROPOSAL_EXPIRED",
];

/// Whether `topic` is one of the bus's enumerated topics.
pub fn is_known_topic(topic: &str) -> bool {
    TOPICS.contains(&topic)
}

struct Subscriber {
    tx: mpsc::Sender<Event>,
    topics: Mutex<std::collections::HashSet<String>>,
}

/// The event bus. Cheap to clone via `Arc` at the call sites that need to
/// share it (façade, presence sweeper, anchor dispatcher, multi-sig FSM).
pub struct EventBus {
    subscribers: DashMap<String, Subscriber>,
    history: Mutex<VecDeque<Event>>,
    history_cap: usize,
    max_sub_queue: usize,
    next_event_id: AtomicU64,
}

impl EventBus {
    pub fn new(history_cap: usize, max_sub_queue: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            history: Mutex::new(VecDeque::with_capacity(history_cap)),
            history_cap,
            max_sub_queue,
            next_event_id: AtomicU64::new(1),
        }
    }

    /// Opens a new durable session for `client_id`, returning the receiver
    /// end of its bounded send queue. A client with no subscribed topics
    /// receives nothing until [`EventBus::subscribe_topic`] is called.
    pub fn open_session(&self, client_id: impl Into<String>) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(self.max_sub_queue);
        self.subscribers.insert(
            client_id.into(),
            Subscriber {
                tx,
                topics: Mutex::new(std::collections::HashSet::new()),
            },
        );
        attest_telemetry::event_metrics().set_subscriber_count(self.subscribers.len() as u64);
        rx
    }

    /// Adds `topic` to `client_id`'s subscription set. No-op if the client
    /// has no open session.
    pub fn subscribe_topic(&self, client_id: &str, topic: &str) {
        if let Some(sub) = self.subscribers.get(client_id) {
            sub.topics
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(topic.to_string());
        }
    }

    /// Removes `topic` from `client_id`'s subscription set.
    pub fn unsubscribe_topic(&self, client_id: &str, topic: &str) {
        if let Some(sub) = self.subscribers.get(client_id) {
            sub.topics
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(topic);
        }
    }

    /// Closes `client_id`'s session, dropping its queue.
    pub fn disconnect(&self, client_id: &str) {
        self.subscribers.remove(client_id);
        attest_telemetry::event_metrics().set_subscriber_count(self.subscribers.len() as u64);
    }

    /// The number of currently connected subscriber sessions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Publishes an event on `topic`, pushing it onto the replay ring and
    /// delivering it to every subscriber currently interested in `topic`.
    /// Delivery is at-most-once and non-blocking: a subscriber whose queue
    /// is full is disconnected rather than made to block the publisher.
    pub fn publish(&self, topic: &str, payload: serde_json::Value, at: u64) -> Event {
        let event = Event {
            event_id: self.next_event_id.fetch_add(1, Ordering::SeqCst),
            kind: topic.to_string(),
            payload,
            at,
        };

        {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            history.push_back(event.clone());
            while history.len() > self.history_cap {
                history.pop_front();
            }
        }

        let mut dropped = Vec::new();
        for entry in self.subscribers.iter() {
            let client_id = entry.key().clone();
            let interested = entry
                .value()
                .topics
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .contains(topic);
            if !interested {
                continue;
            }
            if entry.value().tx.try_send(event.clone()).is_err() {
                dropped.push(client_id);
            }
        }
        for client_id in dropped {
            self.subscribers.remove(&client_id);
            attest_telemetry::event_metrics().inc_subscriber_dropped();
            tracing::warn!(client_id, "subscriber exceeded queue bound, disconnected");
        }
        attest_telemetry::event_metrics().set_subscriber_count(self.subscribers.len() as u64);
        attest_telemetry::event_metrics().inc_published(topic);

        event
    }

    /// The most recent `limit` events across all topics, oldest first
    /// within the returned slice.
    pub fn recent_events(&self, limit: usize) -> Vec<Event> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }
}

/// Convenience payload shape used by several publishers; not required by
/// the bus itself, which accepts arbitrary JSON.
pub fn device_topic_payload(device_id: &DeviceId, extra: serde_json::Value) -> serde_json::Value {
    let mut obj = match extra {
        serde_json::Value::Object(m) => m,
        _ => serde_json::Map::new(),
    };
    obj.insert(
        "device_id".to_string(),
        serde_json::Value::String(device_id.as_str().to_string()),
    );
    serde_json::Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_only_to_subscribed_topics() {
        let bus = EventBus::new(16, 8);
        let mut rx = bus.open_session("client-1");
        bus.subscribe_topic("client-1", "DEVICE_REGISTERED");

        bus.publish("DATA_SUBMITTED", serde_json::json!({}), 1);
        bus.publish("DEVICE_REGISTERED", serde_json::json!({"device_id": "d1"}), 2);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, "DEVICE_REGISTERED");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_subscriber_is_disconnected_past_queue_bound() {
        let bus = EventBus::new(16, 2);
        let _rx = bus.open_session("client-1");
        bus.subscribe_topic("client-1", "DATA_SUBMITTED");

        for i in 0..5 {
            bus.publish("DATA_SUBMITTED", serde_json::json!({"i": i}), i);
        }

        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn recent_events_respects_history_cap_and_limit() {
        let bus = EventBus::new(3, 8);
        for i in 0..10u64 {
            bus.publish("DATA_SUBMITTED", serde_json::json!({"i": i}), i);
        }
        let recent = bus.recent_events(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].payload["i"], 9);
    }

    #[tokio::test]
    async fn unsubscribe_stops_further_delivery() {
        let bus = EventBus::new(16, 8);
        let mut rx = bus.open_session("client-1");
        bus.subscribe_topic("client-1", "DEVICE_REGISTERED");
        bus.publish("DEVICE_REGISTERED", serde_json::json!({}), 1);
        rx.recv().await.unwrap();

        bus.unsubscribe_topic("client-1", "DEVICE_REGISTERED");
        bus.publish("DEVICE_REGISTERED", serde_json::json!({}), 2);
        assert!(rx.try_recv().is_err());
    }
}
