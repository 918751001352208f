//! Typed publish/subscribe bus.
//!
//! Each subscriber owns an unbounded channel; the bus keeps the sending half
//! keyed by a [`SubscriptionId`] so a subscriber can be removed by identity.
//! `emit` never awaits, so it is safe to call while holding a synchronous
//! lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::trace;

/// Handle identifying one subscriber on one bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Receiving side of a subscription.
///
/// Dropping it is equivalent to unsubscribing: the bus prunes closed
/// channels on the next emit.
pub struct Subscription<E> {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<E>,
}

impl<E> Subscription<E> {
    /// Identity to pass to [`EventBus::unsubscribe`].
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next event. Returns `None` once the bus dropped this
    /// subscriber.
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Take an already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }
}

/// Fan-out bus for events of type `E`.
pub struct EventBus<E> {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<SubscriptionId, mpsc::UnboundedSender<E>>>,
}

impl<E: Clone + Send + 'static> EventBus<E> {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new subscriber. It receives every event emitted after
    /// this call.
    pub fn subscribe(&self) -> Subscription<E> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.subscribers.write().insert(id, tx);
        trace!(subscription = %id, "subscribed");
        Subscription { id, rx }
    }

    /// Remove one subscriber by identity. Returns `false` if it was not
    /// registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscribers.write().remove(&id).is_some();
        if removed {
            trace!(subscription = %id, "unsubscribed");
        }
        removed
    }

    /// Deliver `event` to all live subscribers. Non-blocking.
    ///
    /// Returns the number of subscribers the event was delivered to.
    pub fn emit(&self, event: &E) -> usize {
        let mut closed = Vec::new();
        let mut delivered = 0;
        {
            let subs = self.subscribers.read();
            for (id, tx) in subs.iter() {
                if tx.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    closed.push(*id);
                }
            }
        }
        if !closed.is_empty() {
            let mut subs = self.subscribers.write();
            for id in closed {
                let _ = subs.remove(&id);
            }
        }
        delivered
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
