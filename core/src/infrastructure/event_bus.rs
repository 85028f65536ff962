//! The internal publish/subscribe bus carrying [`GordonEvent`]s from the
//! config store, deployment orchestrator and runtime to the resolver and
//! the admin service's log-streaming endpoints.
//!
//! Unlike a broadcast channel, publishing here never blocks and never
//! penalizes a healthy subscriber for a slow one: each subscriber owns its
//! own bounded queue, and a full queue drops the new event for that
//! subscriber alone while bumping its drop counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::domain::events::GordonEvent;

const SUBSCRIBER_QUEUE_DEPTH: usize = 64;

struct Subscriber {
    tx: mpsc::Sender<GordonEvent>,
    dropped: Arc<AtomicU64>,
}

/// Publishing handle. Cheap to clone; all clones share the same
/// subscriber list.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<parking_lot::RwLock<Vec<Subscriber>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            inner: Arc::new(parking_lot::RwLock::new(Vec::new())),
        }
    }

    /// Register a new subscriber and return its receiver. The returned
    /// [`EventReceiver`] also exposes a live count of events this
    /// subscriber has had to drop due to a full queue.
    pub fn subscribe(&self) -> EventReceiver {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        let dropped = Arc::new(AtomicU64::new(0));
        self.inner.write().push(Subscriber {
            tx,
            dropped: dropped.clone(),
        });
        EventReceiver { rx, dropped }
    }

    /// Publish an event to every current subscriber. Never awaits: a
    /// subscriber whose queue is full has the event dropped for it alone,
    /// not for the bus as a whole.
    pub fn publish(&self, event: GordonEvent) {
        let subs = self.inner.read();
        for sub in subs.iter() {
            if sub.tx.try_send(event.clone()).is_err() {
                sub.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("event bus: subscriber queue full, dropping event");
            }
        }
    }

    /// Drop subscribers whose receiver has gone away, so the publish loop
    /// doesn't keep iterating over dead entries forever. Called
    /// opportunistically by long-lived owners (e.g. the resolver's
    /// background task) rather than on every publish.
    pub fn prune_closed(&self) {
        self.inner.write().retain(|s| !s.tx.is_closed());
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.read().len()
    }
}

pub struct EventReceiver {
    rx: mpsc::Receiver<GordonEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Option<GordonEvent> {
        self.rx.recv().await
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_all_subscribers() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(GordonEvent::ConfigReload);

        assert!(matches!(a.recv().await, Some(GordonEvent::ConfigReload)));
        assert!(matches!(b.recv().await, Some(GordonEvent::ConfigReload)));
    }

    #[tokio::test]
    async fn full_queue_drops_only_for_that_subscriber() {
        let bus = EventBus::new();
        let mut slow = bus.subscribe();
        let mut fast = bus.subscribe();

        for _ in 0..SUBSCRIBER_QUEUE_DEPTH + 10 {
            bus.publish(GordonEvent::ContainerStarted {
                name: "app".into(),
            });
        }
        assert!(slow.dropped_count() > 0);

        // fast subscriber drains immediately, so it should see no drops
        // from an independent round of publishes after draining.
        while fast.rx.try_recv().is_ok() {}
        bus.publish(GordonEvent::ContainerStopped { name: "app".into() });
        assert_eq!(fast.dropped_count(), 0);

        while slow.rx.try_recv().is_ok() {}
    }

    #[tokio::test]
    async fn prune_closed_removes_dropped_receivers() {
        let bus = EventBus::new();
        {
            let _rx = bus.subscribe();
        }
        assert_eq!(bus.subscriber_count(), 1);
        bus.prune_closed();
        assert_eq!(bus.subscriber_count(), 0);
    }
}
