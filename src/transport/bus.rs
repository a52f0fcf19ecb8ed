//! Event fan-out.
//!
//! The receive loop publishes every inbound event here. Each
//! [`Subscription`] owns a bounded queue; publishing never blocks, and a full
//! queue drops its oldest event with a warning.
//!
//! # Method Patterns
//!
//! | Pattern | Matches |
//! |---------|---------|
//! | `Page.lifecycleEvent` | That method only |
//! | `Network.*` | Every method of the domain |
//! | `*` | Every event |
//!
//! A session filter matches events whose `sessionId` equals it. Browser-level
//! `Target.*` events carry the session they concern in `params.sessionId`
//! instead, and are matched on that.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use crate::identifiers::{SessionId, SubscriptionId};
use crate::protocol::Event;

// ============================================================================
// Constants
// ============================================================================

/// Default per-subscriber queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

// ============================================================================
// EventFilter
// ============================================================================

/// Which events a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    patterns: Vec<String>,
    session: Option<SessionId>,
}

impl EventFilter {
    /// Matches any of `patterns`, from any session.
    #[must_use]
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
            session: None,
        }
    }

    /// Restricts the filter to one session.
    #[must_use]
    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = Some(session);
        self
    }

    /// Returns `true` if `event` passes the filter.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.matches_method(&event.method) && self.matches_session(event)
    }

    fn matches_method(&self, method: &str) -> bool {
        self.patterns.iter().any(|pattern| {
            if pattern == "*" {
                return true;
            }
            match pattern.strip_suffix(".*") {
                Some(domain) => method
                    .strip_prefix(domain)
                    .is_some_and(|rest| rest.starts_with('.')),
                None => pattern == method,
            }
        })
    }

    fn matches_session(&self, event: &Event) -> bool {
        let Some(wanted) = &self.session else {
            return true;
        };

        if let Some(session) = &event.session_id {
            return session == wanted;
        }

        event.domain() == "Target"
            && event
                .params
                .get("sessionId")
                .and_then(|v| v.as_str())
                .is_some_and(|s| s == wanted.as_str())
    }
}

// ============================================================================
// Subscriber Slot
// ============================================================================

/// Shared state between the bus and one [`Subscription`].
#[derive(Debug)]
struct Slot {
    filter: EventFilter,
    capacity: usize,
    queue: Mutex<VecDeque<Event>>,
    closed: AtomicBool,
    dropped: AtomicU64,
    notify: Notify,
}

impl Slot {
    fn push(&self, id: SubscriptionId, event: Event) {
        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.capacity
                && let Some(oldest) = queue.pop_front()
            {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    subscription = %id,
                    dropped_method = %oldest.method,
                    capacity = self.capacity,
                    "Subscriber queue full, dropping oldest event"
                );
            }
            queue.push_back(event);
        }
        self.notify.notify_one();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// Subscription registry for one connection.
#[derive(Debug)]
pub struct EventBus {
    subscribers: Mutex<FxHashMap<SubscriptionId, Arc<Slot>>>,
    capacity: usize,
    closed: AtomicBool,
}

impl EventBus {
    /// Creates a bus whose subscribers buffer up to `capacity` events each.
    #[must_use]
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            subscribers: Mutex::new(FxHashMap::default()),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        })
    }

    /// Registers a subscription.
    ///
    /// Subscribing to a closed bus returns a subscription that is already
    /// closed.
    #[must_use]
    pub fn subscribe(self: &Arc<Self>, filter: EventFilter) -> Subscription {
        let id = SubscriptionId::next();
        let slot = Arc::new(Slot {
            filter,
            capacity: self.capacity,
            queue: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            notify: Notify::new(),
        });

        {
            let mut subscribers = self.subscribers.lock();
            if self.closed.load(Ordering::Acquire) {
                slot.close();
            } else {
                subscribers.insert(id, Arc::clone(&slot));
            }
        }

        trace!(subscription = %id, "Subscribed");
        Subscription {
            id,
            slot,
            bus: Arc::downgrade(self),
        }
    }

    /// Delivers an event to every matching subscriber.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, event: &Event) -> usize {
        let targets: Vec<(SubscriptionId, Arc<Slot>)> = self
            .subscribers
            .lock()
            .iter()
            .filter(|(_, slot)| slot.filter.matches(event))
            .map(|(id, slot)| (*id, Arc::clone(slot)))
            .collect();

        if targets.is_empty() {
            trace!(method = %event.method, "Event has no subscribers");
        }

        let count = targets.len();
        for (id, slot) in targets {
            slot.push(id, event.clone());
        }
        count
    }

    /// Closes the bus and every subscription.
    pub fn close(&self) {
        let drained: Vec<Arc<Slot>> = {
            let mut subscribers = self.subscribers.lock();
            self.closed.store(true, Ordering::Release);
            subscribers.drain().map(|(_, slot)| slot).collect()
        };

        if !drained.is_empty() {
            debug!(count = drained.len(), "Closing subscriptions");
        }
        for slot in drained {
            slot.close();
        }
    }

    /// Returns the number of live subscriptions.
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn remove(&self, id: SubscriptionId) {
        if let Some(slot) = self.subscribers.lock().remove(&id) {
            slot.close();
            trace!(subscription = %id, "Unsubscribed");
        }
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Receiving end of a subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    slot: Arc<Slot>,
    bus: Weak<EventBus>,
}

impl Subscription {
    /// Returns the subscription id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once the subscription is closed and its queue drained.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.try_recv() {
                return Some(event);
            }
            if self.slot.closed.load(Ordering::Acquire) {
                return self.try_recv();
            }
            self.slot.notify.notified().await;
        }
    }

    /// Takes the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.slot.queue.lock().pop_front()
    }

    /// Returns `true` once the bus or this subscription is closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.slot.closed.load(Ordering::Acquire)
    }

    /// Number of events dropped because the queue was full.
    #[inline]
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.slot.dropped.load(Ordering::Relaxed)
    }

    /// Stops delivery. Events already queued can still be received.
    pub fn close(&self) {
        self.closer().close();
    }

    /// Returns a handle that closes this subscription from another task,
    /// waking a receiver blocked in [`Subscription::recv`].
    #[must_use]
    pub fn closer(&self) -> SubscriptionCloser {
        SubscriptionCloser {
            id: self.id,
            slot: Arc::clone(&self.slot),
            bus: Weak::clone(&self.bus),
        }
    }

    /// Removes the subscription from the bus.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}

// ============================================================================
// SubscriptionCloser
// ============================================================================

/// Closes a [`Subscription`] without access to its receiving end.
#[derive(Debug, Clone)]
pub struct SubscriptionCloser {
    id: SubscriptionId,
    slot: Arc<Slot>,
    bus: Weak<EventBus>,
}

impl SubscriptionCloser {
    /// Stops delivery and wakes the receiver. Idempotent.
    pub fn close(&self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
        self.slot.close();
    }
}

// ============================================================================
// Tests
// ============================================================================
