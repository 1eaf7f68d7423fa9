//! Event types for the Casa event bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Context;

/// Trait for typed event payloads
///
/// Implement this for any payload type that should be carried by events.
pub trait EventData: Clone + Send + Sync + 'static {
    /// The event type string for this payload type
    fn event_type() -> &'static str;

    /// The topic this payload is published on
    fn topic(&self) -> String;
}

/// Event type identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventType(String);

impl EventType {
    /// Create a new event type
    pub fn new(event_type: impl Into<String>) -> Self {
        Self(event_type.into())
    }

    /// Get the event type as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An event delivered over the bus
///
/// Events are addressed by a slash-separated topic and carry a type, an
/// arbitrary JSON payload, and an optional source naming the component
/// that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Slash-separated topic, e.g. "items/kitchen_light/state"
    pub topic: String,

    /// The type of event
    pub event_type: EventType,

    /// The event payload
    pub payload: serde_json::Value,

    /// Name of the producing component, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// When the event was fired
    pub time_fired: DateTime<Utc>,

    /// Context tracking origin and causality
    pub context: Context,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(
        topic: impl Into<String>,
        event_type: impl Into<EventType>,
        payload: serde_json::Value,
        context: Context,
    ) -> Self {
        Self {
            topic: topic.into(),
            event_type: event_type.into(),
            payload,
            source: None,
            time_fired: Utc::now(),
            context,
        }
    }

    /// Create an event from a typed payload
    pub fn typed<T: EventData + Serialize>(data: T, context: Context) -> Self {
        let topic = data.topic();
        let payload = serde_json::to_value(&data).unwrap_or_default();
        Self::new(topic, T::event_type(), payload, context)
    }

    /// Set the source of the event
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Try to parse the payload as a typed payload
    pub fn parse_payload<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.payload.clone()).ok()
    }
}
