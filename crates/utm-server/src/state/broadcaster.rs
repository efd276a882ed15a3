//! Fan-out of live events to WebSocket subscribers.
//!
//! Each subscriber owns a bounded queue. Publishing never waits: a subscriber whose queue
//! is full or closed is dropped and everyone else still gets the event.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};
use utm_core::models::LiveEvent;
use utm_core::UtmError;

pub type SubscriberId = u64;

/// A live subscription. Serialized events arrive on `rx` in publish order.
pub struct Subscription {
    pub id: SubscriberId,
    pub rx: mpsc::Receiver<Arc<str>>,
}

pub struct Broadcaster {
    subscribers: DashMap<SubscriberId, mpsc::Sender<Arc<str>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Broadcaster {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers.insert(id, tx);
        debug!(subscriber_id = id, "Subscriber added");
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.subscribers.remove(&id).is_some() {
            debug!(subscriber_id = id, "Subscriber removed");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver `event` to every subscriber. Returns how many received it.
    pub fn publish(&self, event: &LiveEvent) -> usize {
        let payload: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(err) => {
                error!(event = event.name(), error = %err, "Failed to serialize live event");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut unreachable = Vec::new();
        for subscriber in self.subscribers.iter() {
            match subscriber.value().try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => unreachable.push(*subscriber.key()),
            }
        }

        for id in unreachable {
            self.subscribers.remove(&id);
            let err = UtmError::SubscriberUnreachable(id);
            debug!(event = event.name(), error = %err, "Dropped subscriber");
        }
        delivered
    }
}
