//! Topic- and type-filtered pub/sub event bus
//!
//! The EventBus is the central message broker: device layers publish item
//! events, the rule engine subscribes with per-trigger filters and
//! publishes rule status events. Delivery is fan-out over per-subscription
//! unbounded channels, so `fire` never blocks the publishing thread on a
//! slow consumer.

mod topic;

pub use topic::{TopicPattern, TopicPatternError};

use casa_core::{Context, Event, EventData, EventType};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Filter attached to a subscription
///
/// An event is delivered when its type is in `event_types` (an empty set
/// accepts every type) and its topic matches `topic` (absent matches every
/// topic).
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Accepted event types; empty means all
    pub event_types: HashSet<EventType>,

    /// Topic glob; `None` means all topics
    pub topic: Option<TopicPattern>,
}

impl EventFilter {
    /// A filter accepting every event
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to a single event type
    pub fn for_type(event_type: impl Into<EventType>) -> Self {
        let mut event_types = HashSet::new();
        event_types.insert(event_type.into());
        Self {
            event_types,
            topic: None,
        }
    }

    /// Add an accepted event type
    pub fn with_type(mut self, event_type: impl Into<EventType>) -> Self {
        self.event_types.insert(event_type.into());
        self
    }

    /// Restrict to a topic pattern
    pub fn with_topic(mut self, topic: TopicPattern) -> Self {
        self.topic = Some(topic);
        self
    }

    /// Check whether an event passes this filter
    pub fn matches(&self, event: &Event) -> bool {
        if !self.event_types.is_empty() && !self.event_types.contains(&event.event_type) {
            return false;
        }
        if let Some(topic) = &self.topic {
            if !topic.matches(&event.topic) {
                return false;
            }
        }
        true
    }
}

struct Subscription {
    filter: EventFilter,
    tx: mpsc::UnboundedSender<Event>,
}

/// The event bus for publishing and subscribing to events
pub struct EventBus {
    subscriptions: Arc<DashMap<u64, Subscription>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            subscriptions: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe with a filter
    ///
    /// The subscription is removed when the returned stream is dropped.
    pub fn subscribe(&self, filter: EventFilter) -> EventStream {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();

        trace!(id, ?filter.topic, "Subscribing to event bus");
        self.subscriptions.insert(id, Subscription { filter, tx });

        EventStream {
            id,
            rx,
            subscriptions: self.subscriptions.clone(),
        }
    }

    /// Subscribe to every event
    pub fn subscribe_all(&self) -> EventStream {
        self.subscribe(EventFilter::all())
    }

    /// Fire an event to all matching subscribers
    ///
    /// Synchronous and non-blocking; stale subscriptions whose receivers
    /// were dropped without unsubscribing are pruned as a side effect.
    pub fn fire(&self, event: Event) {
        debug!(topic = %event.topic, event_type = %event.event_type, "Firing event");

        let mut stale = Vec::new();
        for entry in self.subscriptions.iter() {
            if entry.filter.matches(&event) && entry.tx.send(event.clone()).is_err() {
                stale.push(*entry.key());
            }
        }

        for id in stale {
            self.subscriptions.remove(&id);
        }
    }

    /// Fire a typed payload on its own topic
    pub fn fire_typed<T: EventData + serde::Serialize>(&self, data: T, context: Context) {
        self.fire(Event::typed(data, context));
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A stream of events matching one subscription's filter
pub struct EventStream {
    id: u64,
    rx: mpsc::UnboundedReceiver<Event>,
    subscriptions: Arc<DashMap<u64, Subscription>>,
}

impl EventStream {
    /// Receive the next matching event
    ///
    /// Returns `None` when the bus side of the subscription is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Receive without waiting
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.subscriptions.remove(&self.id);
    }
}

/// Thread-safe wrapper for EventBus
pub type SharedEventBus = Arc<EventBus>;
