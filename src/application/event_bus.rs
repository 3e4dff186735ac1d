//! In-process event bus.
//!
//! Typed publish/subscribe keyed by [`EventKind`]. Each subscription owns a
//! bounded channel; a subscriber that lets its buffer fill up is detached so
//! the publisher never waits on a slow consumer.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::domain::events::{Event, EventKind};
use crate::infrastructure::metrics;

/// Bus failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("Event bus is closed")]
    Closed,
}

struct Subscriber {
    kinds: HashSet<EventKind>,
    tx: mpsc::Sender<Event>,
}

#[derive(Default)]
struct Inner {
    subscribers: HashMap<u64, Subscriber>,
    closed: bool,
}

/// Broadcast bus shared by the command service, the hub and the message
/// cleaner.
pub struct EventBus {
    inner: Arc<RwLock<Inner>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl EventBus {
    /// Create a bus whose subscriptions buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    /// Deliver `events`, in order, to every subscriber of their kind.
    pub fn publish(&self, events: &[Event]) -> Result<(), BusError> {
        let mut detached = Vec::new();
        {
            let inner = self.inner.read();
            if inner.closed {
                return Err(BusError::Closed);
            }

            for event in events {
                let kind = event.kind();
                metrics::record_event_published(kind.as_str());

                for (id, subscriber) in inner.subscribers.iter() {
                    if !subscriber.kinds.contains(&kind) || detached.contains(id) {
                        continue;
                    }
                    match subscriber.tx.try_send(event.clone()) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            tracing::warn!(
                                subscription_id = id,
                                kind = %kind,
                                "Bus subscriber is too slow, detaching"
                            );
                            metrics::BUS_SUBSCRIBERS_DETACHED_TOTAL.inc();
                            detached.push(*id);
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            detached.push(*id);
                        }
                    }
                }
            }
        }

        if !detached.is_empty() {
            let mut inner = self.inner.write();
            for id in detached {
                inner.subscribers.remove(&id);
            }
        }

        Ok(())
    }

    /// Subscribe to the given kinds.
    pub fn subscribe(&self, kinds: &[EventKind]) -> Result<Subscription, BusError> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(BusError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);
        inner.subscribers.insert(
            id,
            Subscriber {
                kinds: kinds.iter().copied().collect(),
                tx,
            },
        );

        tracing::debug!(subscription_id = id, kinds = ?kinds, "Bus subscription added");

        Ok(Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        })
    }

    /// Close every subscription and refuse further use.
    pub fn shutdown(&self) {
        let mut inner = self.inner.write();
        if inner.closed {
            return;
        }
        inner.closed = true;
        // Dropping the senders ends every subscriber's stream.
        inner.subscribers.clear();
        tracing::info!("Event bus shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().closed
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.read().subscribers.len()
    }
}

/// Receiving end of a bus subscription.
///
/// Unsubscribes when dropped.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Event>,
    bus: std::sync::Weak<RwLock<Inner>>,
}

impl Subscription {
    /// Next event, or `None` once the subscription has been closed, detached
    /// or the bus shut down.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Unsubscribe explicitly.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            if inner.write().subscribers.remove(&self.id).is_some() {
                tracing::debug!(subscription_id = self.id, "Bus subscription removed");
            }
        }
    }
}
