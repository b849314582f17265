//! Process-local completion bus.
//!
//! One listener per typed topic. Publishing removes the listener from the map
//! and only then invokes it, outside any shard lock, so:
//!
//! - a topic fires at most once even when two publishes race,
//! - a callback may dispatch new requests (and thus subscribe) re-entrantly,
//! - a panicking callback cannot leave its topic registered.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use optube_core::{CompletionEvent, Topic};
use tracing::debug;

use super::error::BusError;
use super::listener::CompletionListener;

/// Counters describing bus traffic since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub subscribed: u64,
    pub published: u64,
    pub delivered: u64,
    /// Publishes that found no listener.
    pub dropped: u64,
    /// Listeners removed without firing (hand-off failure, teardown).
    pub withdrawn: u64,
}

/// Thread-safe topic -> listener map.
#[derive(Debug, Default)]
pub struct CompletionBus {
    listeners: DashMap<Topic, CompletionListener>,
    subscribed: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    withdrawn: AtomicU64,
}

impl CompletionBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` on its topic.
    ///
    /// # Errors
    ///
    /// Returns `BusError::TopicInUse` if the topic already has a listener;
    /// the new listener is dropped without firing.
    pub fn subscribe(&self, listener: CompletionListener) -> Result<(), BusError> {
        let topic = listener.topic();
        match self.listeners.entry(topic) {
            Entry::Occupied(_) => Err(BusError::TopicInUse(topic)),
            Entry::Vacant(slot) => {
                slot.insert(listener);
                self.subscribed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    /// Removes the listener for `topic` without invoking it. Returns whether
    /// one was registered.
    pub fn unsubscribe(&self, topic: Topic) -> bool {
        let removed = self.listeners.remove(&topic).is_some();
        if removed {
            self.withdrawn.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Delivers `event` to the listener on its topic, if any, and forgets the
    /// topic. Returns whether a listener received it.
    pub fn publish(&self, event: CompletionEvent) -> bool {
        self.published.fetch_add(1, Ordering::Relaxed);
        // Bind first so the shard guard is released before the callback runs.
        let removed = self.listeners.remove(&event.topic);
        match removed {
            Some((_, listener)) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                listener.on_event(event);
                true
            }
            None => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(topic = %event.topic, "completion dropped: no listener");
                false
            }
        }
    }

    #[must_use]
    pub fn is_subscribed(&self, topic: Topic) -> bool {
        self.listeners.contains_key(&topic)
    }

    /// Number of registrations still waiting for a completion.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Drops every registration without firing. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let topics: Vec<Topic> = self.listeners.iter().map(|entry| *entry.key()).collect();
        topics
            .into_iter()
            .filter(|topic| self.unsubscribe(*topic))
            .count()
    }

    #[must_use]
    pub fn stats(&self) -> BusStats {
        BusStats {
            subscribed: self.subscribed.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            withdrawn: self.withdrawn.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    use optube_core::{Operation, RequestId};
    use proptest::prelude::*;

    use super::*;
    use crate::dispatch::listener::callback;

    fn counting_listener(topic: Topic, calls: &Arc<AtomicU32>) -> CompletionListener {
        let calls = Arc::clone(calls);
        CompletionListener::new(
            topic,
            callback(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    fn open_topic(id: u64) -> Topic {
        Topic::new(Operation::ClientOpen, RequestId(id))
    }

    #[test]
    fn second_publish_is_a_no_op() {
        let bus = CompletionBus::new();
        let calls = Arc::new(AtomicU32::new(0));
        bus.subscribe(counting_listener(open_topic(1), &calls)).unwrap();

        assert!(bus.publish(CompletionEvent::ack(open_topic(1))));
        assert!(!bus.publish(CompletionEvent::ack(open_topic(1))));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!bus.is_subscribed(open_topic(1)));
        let stats = bus.stats();
        assert_eq!(stats.published, 2);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn publish_only_reaches_exact_topic() {
        let bus = CompletionBus::new();
        let calls = Arc::new(AtomicU32::new(0));
        bus.subscribe(counting_listener(open_topic(1), &calls)).unwrap();

        // Same id, different operation.
        let other = Topic::new(Operation::ClientStatus, RequestId(1));
        assert!(!bus.publish(CompletionEvent::ack(other)));
        // Same operation, different id.
        assert!(!bus.publish(CompletionEvent::ack(open_topic(2))));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(bus.is_subscribed(open_topic(1)));
    }

    #[test]
    fn duplicate_subscribe_is_rejected() {
        let bus = CompletionBus::new();
        let calls = Arc::new(AtomicU32::new(0));
        bus.subscribe(counting_listener(open_topic(3), &calls)).unwrap();
        let err = bus
            .subscribe(counting_listener(open_topic(3), &calls))
            .unwrap_err();
        assert_eq!(err, BusError::TopicInUse(open_topic(3)));
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_never_fires() {
        let bus = CompletionBus::new();
        let calls = Arc::new(AtomicU32::new(0));
        bus.subscribe(counting_listener(open_topic(4), &calls)).unwrap();

        assert!(bus.unsubscribe(open_topic(4)));
        assert!(!bus.unsubscribe(open_topic(4)));
        assert!(!bus.publish(CompletionEvent::ack(open_topic(4))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(bus.stats().withdrawn, 1);
    }

    #[test]
    fn panicking_listener_is_still_removed() {
        let bus = CompletionBus::new();
        bus.subscribe(CompletionListener::new(
            open_topic(5),
            callback(|_| panic!("listener failure")),
        ))
        .unwrap();

        assert!(bus.publish(CompletionEvent::ack(open_topic(5))));
        assert!(bus.is_empty());
    }

    #[test]
    fn callback_may_subscribe_reentrantly() {
        let bus = Arc::new(CompletionBus::new());
        let calls = Arc::new(AtomicU32::new(0));
        let inner_bus = Arc::clone(&bus);
        let inner_calls = Arc::clone(&calls);
        bus.subscribe(CompletionListener::new(
            open_topic(6),
            callback(move |_| {
                inner_bus
                    .subscribe(counting_listener(open_topic(7), &inner_calls))
                    .unwrap();
            }),
        ))
        .unwrap();

        assert!(bus.publish(CompletionEvent::ack(open_topic(6))));
        assert!(bus.is_subscribed(open_topic(7)));
        assert!(bus.publish(CompletionEvent::ack(open_topic(7))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn racing_publishes_fire_once() {
        let bus = Arc::new(CompletionBus::new());
        let calls = Arc::new(AtomicU32::new(0));
        for id in 0..200 {
            bus.subscribe(counting_listener(open_topic(id), &calls)).unwrap();
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let bus = Arc::clone(&bus);
                std::thread::spawn(move || {
                    for id in 0..200 {
                        bus.publish(CompletionEvent::ack(open_topic(id)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 200);
        assert!(bus.is_empty());
        assert_eq!(bus.stats().delivered, 200);
        assert_eq!(bus.stats().dropped, 600);
    }

    #[test]
    fn publishes_racing_subscribes_fire_once() {
        let bus = Arc::new(CompletionBus::new());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for parity in 0..2_u64 {
            let bus_sub = Arc::clone(&bus);
            let calls = Arc::clone(&calls);
            handles.push(std::thread::spawn(move || {
                for id in (0..500).filter(|id| id % 2 == parity) {
                    bus_sub.subscribe(counting_listener(open_topic(id), &calls)).unwrap();
                }
            }));
            let bus_pub = Arc::clone(&bus);
            handles.push(std::thread::spawn(move || {
                for id in (0..500).filter(|id| id % 2 == parity) {
                    // Retry until the subscriber side has registered the topic.
                    while !bus_pub.publish(CompletionEvent::ack(open_topic(id))) {
                        std::thread::yield_now();
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 500);
        assert!(bus.is_empty());
        let stats = bus.stats();
        assert_eq!(stats.subscribed, 500);
        assert_eq!(stats.delivered, 500);
    }

    #[test]
    fn clear_drops_everything_without_firing() {
        let bus = CompletionBus::new();
        let calls = Arc::new(AtomicU32::new(0));
        for id in 1..=3 {
            bus.subscribe(counting_listener(open_topic(id), &calls)).unwrap();
        }
        assert_eq!(bus.clear(), 3);
        assert!(bus.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    proptest! {
        #[test]
        fn each_topic_fires_at_most_once(publishes in proptest::collection::vec(0u64..16, 0..64)) {
            let bus = CompletionBus::new();
            let ids: Vec<u64> = (0..16).collect();
            let calls: Vec<Arc<AtomicU32>> = ids.iter().map(|_| Arc::new(AtomicU32::new(0))).collect();
            for (id, count) in ids.iter().zip(&calls) {
                bus.subscribe(counting_listener(open_topic(*id), count)).unwrap();
            }

            for id in &publishes {
                bus.publish(CompletionEvent::ack(open_topic(*id)));
            }

            for (id, count) in ids.iter().zip(&calls) {
                let expected = u32::from(publishes.contains(id));
                prop_assert_eq!(count.load(Ordering::SeqCst), expected);
                prop_assert_eq!(bus.is_subscribed(open_topic(*id)), expected == 0);
            }
        }
    }
}
