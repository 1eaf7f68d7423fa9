//! Core types for the Casa rule engine
//!
//! This crate provides the fundamental types used throughout the
//! workspace: `Value` (canonical comparable values), `Event` and
//! `EventType`, `Context` (causality tracking), and the rule lifecycle
//! types `RuleStatus` / `RuleStatusInfo`.

mod context;
mod event;
mod status;
mod value;

pub use context::Context;
pub use event::{Event, EventData, EventType};
pub use status::{RuleStatus, RuleStatusDetail, RuleStatusInfo};
pub use value::Value;

/// Well-known event types and payloads
pub mod events {
    use super::*;
    use serde::{Deserialize, Serialize};

    /// Event type for item state changes
    pub const ITEM_STATE_CHANGED: &str = "item_state_changed";

    /// Event type for item commands
    pub const ITEM_COMMAND: &str = "item_command";

    /// Event type for rule status transitions
    pub const RULE_STATUS_INFO: &str = "rule_status_info";

    /// Topic an item's state changes are published on
    pub fn item_state_topic(item_name: &str) -> String {
        format!("items/{}/state", item_name)
    }

    /// Topic an item's commands are published on
    pub fn item_command_topic(item_name: &str) -> String {
        format!("items/{}/command", item_name)
    }

    /// Topic a rule's status transitions are published on
    pub fn rule_status_topic(rule_uid: &str) -> String {
        format!("automation/rules/{}/state", rule_uid)
    }

    /// Payload for ITEM_STATE_CHANGED events
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ItemStateChangedData {
        pub item_name: String,
        pub old_state: Option<Value>,
        pub new_state: Value,
    }

    impl EventData for ItemStateChangedData {
        fn event_type() -> &'static str {
            ITEM_STATE_CHANGED
        }

        fn topic(&self) -> String {
            item_state_topic(&self.item_name)
        }
    }

    /// Payload for ITEM_COMMAND events
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ItemCommandData {
        pub item_name: String,
        pub command: Value,
    }

    impl EventData for ItemCommandData {
        fn event_type() -> &'static str {
            ITEM_COMMAND
        }

        fn topic(&self) -> String {
            item_command_topic(&self.item_name)
        }
    }

    /// Payload for RULE_STATUS_INFO events
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct RuleStatusInfoData {
        pub rule_uid: String,
        pub status_info: RuleStatusInfo,
    }

    impl EventData for RuleStatusInfoData {
        fn event_type() -> &'static str {
            RULE_STATUS_INFO
        }

        fn topic(&self) -> String {
            rule_status_topic(&self.rule_uid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::events::*;
    use super::*;

    #[test]
    fn test_typed_event_topics() {
        let data = ItemStateChangedData {
            item_name: "kitchen_light".to_string(),
            old_state: Some(Value::from("OFF")),
            new_state: Value::from("ON"),
        };
        let event = Event::typed(data, Context::new());

        assert_eq!(event.topic, "items/kitchen_light/state");
        assert_eq!(event.event_type.as_str(), ITEM_STATE_CHANGED);
        assert_eq!(event.payload["new_state"], "ON");
    }

    #[test]
    fn test_rule_status_topic() {
        assert_eq!(rule_status_topic("scene_1"), "automation/rules/scene_1/state");
    }
}
