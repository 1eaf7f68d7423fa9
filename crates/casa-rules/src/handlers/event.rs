//! Generic event trigger and event-match condition

use casa_core::{Event, EventType};
use casa_event_bus::{EventFilter, TopicPattern};
use serde_json::json;
use tracing::warn;

use crate::config::{optional_str, str_list, ConfigError, ConfigResult};
use crate::handler::{ConditionHandler, Inputs, Outputs, TriggerHandler};
use crate::module::ConfigMap;

/// Triggers on any bus event matching a type set, topic glob, and source
///
/// Outputs: `event` (the full event), `payload`, `topic`, `type`.
pub struct EventTrigger {
    types: Vec<EventType>,
    topic: Option<TopicPattern>,
    source: Option<String>,
    /// Set when the configured topic glob failed to parse; the trigger
    /// then matches nothing.
    broken: bool,
}

impl EventTrigger {
    pub fn from_config(config: &ConfigMap) -> ConfigResult<Self> {
        let types = str_list(config, "types")?
            .into_iter()
            .map(EventType::from)
            .collect();
        let source = optional_str(config, "source")?;

        let mut broken = false;
        let topic = match optional_str(config, "topic")? {
            Some(raw) => match TopicPattern::parse(&raw) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    warn!(topic = %raw, error = %err, "Invalid topic pattern; trigger will never fire");
                    broken = true;
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            types,
            topic,
            source,
            broken,
        })
    }
}

impl TriggerHandler for EventTrigger {
    fn event_filter(&self) -> Option<EventFilter> {
        if self.broken {
            return None;
        }
        let mut filter = EventFilter::all();
        for event_type in &self.types {
            filter = filter.with_type(event_type.clone());
        }
        if let Some(topic) = &self.topic {
            filter = filter.with_topic(topic.clone());
        }
        Some(filter)
    }

    fn on_event(&self, event: &Event) -> Option<Outputs> {
        if let Some(source) = &self.source {
            if event.source.as_deref() != Some(source.as_str()) {
                return None;
            }
        }

        Some(Outputs::from([
            (
                "event".to_string(),
                serde_json::to_value(event).unwrap_or_default(),
            ),
            ("payload".to_string(), event.payload.clone()),
            ("topic".to_string(), json!(event.topic)),
            ("type".to_string(), json!(event.event_type.as_str())),
        ]))
    }
}

/// Checks the wired `event` input against type, topic, source, and a
/// payload subset
pub struct EventMatchCondition {
    event_type: Option<String>,
    topic: Option<TopicPattern>,
    source: Option<String>,
    payload: Option<serde_json::Value>,
}

impl EventMatchCondition {
    pub fn from_config(config: &ConfigMap) -> ConfigResult<Self> {
        let topic = match optional_str(config, "topic")? {
            Some(raw) => {
                Some(
                    TopicPattern::parse(&raw).map_err(|err| ConfigError::InvalidParameter {
                        name: "topic".to_string(),
                        message: err.to_string(),
                    })?,
                )
            }
            None => None,
        };

        Ok(Self {
            event_type: optional_str(config, "type")?,
            topic,
            source: optional_str(config, "source")?,
            payload: config.get("payload").cloned(),
        })
    }
}

/// Structural subset match: every key in `expected` must appear in
/// `actual` with a matching value, recursively for objects.
fn json_matches(expected: &serde_json::Value, actual: &serde_json::Value) -> bool {
    match (expected, actual) {
        (serde_json::Value::Object(expected), serde_json::Value::Object(actual)) => expected
            .iter()
            .all(|(key, value)| actual.get(key).is_some_and(|a| json_matches(value, a))),
        _ => expected == actual,
    }
}

impl ConditionHandler for EventMatchCondition {
    fn is_satisfied(&self, inputs: &Inputs) -> bool {
        let Some(event) = inputs.get("event") else {
            return false;
        };

        if let Some(expected) = &self.event_type {
            if event.get("event_type").and_then(|t| t.as_str()) != Some(expected.as_str()) {
                return false;
            }
        }
        if let Some(pattern) = &self.topic {
            let matched = event
                .get("topic")
                .and_then(|t| t.as_str())
                .is_some_and(|t| pattern.matches(t));
            if !matched {
                return false;
            }
        }
        if let Some(expected) = &self.source {
            if event.get("source").and_then(|s| s.as_str()) != Some(expected.as_str()) {
                return false;
            }
        }
        if let Some(expected) = &self.payload {
            let matched = event
                .get("payload")
                .is_some_and(|payload| json_matches(expected, payload));
            if !matched {
                return false;
            }
        }
        true
    }
}
