//! Item-facing trigger and action

use async_trait::async_trait;
use casa_core::events::{item_state_topic, ItemStateChangedData, ITEM_STATE_CHANGED};
use casa_core::{Context, Event, Value};
use casa_event_bus::{EventFilter, TopicPattern};
use casa_items::ItemRegistry;
use std::sync::Arc;

use crate::config::{optional_str, required_str, ConfigError, ConfigResult};
use crate::handler::{ActionError, ActionHandler, Inputs, Outputs, TriggerHandler};
use crate::module::ConfigMap;

/// Triggers when a specific item's state changes
///
/// Optional `state` and `previous_state` constrain the new and old
/// values. With neither configured the trigger fires only on an actual
/// change, not on a same-value update.
///
/// Outputs: `event`, `new_state`, `old_state`.
pub struct ItemStateChangedTrigger {
    state: Option<String>,
    previous_state: Option<String>,
    filter: EventFilter,
}

impl ItemStateChangedTrigger {
    pub fn from_config(config: &ConfigMap) -> ConfigResult<Self> {
        let item_name = required_str(config, "item_name")?;
        let topic = TopicPattern::parse(&item_state_topic(&item_name)).map_err(|err| {
            ConfigError::InvalidParameter {
                name: "item_name".to_string(),
                message: err.to_string(),
            }
        })?;

        Ok(Self {
            state: optional_str(config, "state")?,
            previous_state: optional_str(config, "previous_state")?,
            filter: EventFilter::for_type(ITEM_STATE_CHANGED).with_topic(topic),
        })
    }
}

impl TriggerHandler for ItemStateChangedTrigger {
    fn event_filter(&self) -> Option<EventFilter> {
        Some(self.filter.clone())
    }

    fn on_event(&self, event: &Event) -> Option<Outputs> {
        let data: ItemStateChangedData = event.parse_payload()?;
        let old_state = data.old_state.clone().unwrap_or(Value::Null);

        if let Some(expected) = &self.state {
            if data.new_state.canonical() != *expected {
                return None;
            }
        }
        if let Some(expected) = &self.previous_state {
            if old_state.canonical() != *expected {
                return None;
            }
        }
        if self.state.is_none() && self.previous_state.is_none() && old_state == data.new_state {
            return None;
        }

        Some(Outputs::from([
            (
                "event".to_string(),
                serde_json::to_value(event).unwrap_or_default(),
            ),
            ("new_state".to_string(), data.new_state.to_json()),
            ("old_state".to_string(), old_state.to_json()),
        ]))
    }
}

/// Posts a command to an item
///
/// The command comes from config, or from a wired `command` input which
/// takes precedence.
pub struct ItemCommandAction {
    item_name: String,
    command: String,
    items: Arc<ItemRegistry>,
}

impl ItemCommandAction {
    pub fn from_config(config: &ConfigMap, items: Arc<ItemRegistry>) -> ConfigResult<Self> {
        Ok(Self {
            item_name: required_str(config, "item_name")?,
            command: required_str(config, "command")?,
            items,
        })
    }
}

#[async_trait]
impl ActionHandler for ItemCommandAction {
    async fn execute(&self, inputs: &Inputs, context: &Context) -> Result<Outputs, ActionError> {
        let command = match inputs.get("command") {
            Some(value) => Value::from_json(value).canonical(),
            None => self.command.clone(),
        };

        self.items
            .post_command(&self.item_name, &command, context)
            .map_err(|err| ActionError::Failed(err.to_string()))?;
        Ok(Outputs::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casa_event_bus::EventBus;
    use serde_json::json;

    fn config(value: serde_json::Value) -> ConfigMap {
        value.as_object().cloned().unwrap_or_default()
    }

    fn state_changed(item: &str, old: Value, new: Value) -> Event {
        Event::typed(
            ItemStateChangedData {
                item_name: item.to_string(),
                old_state: Some(old),
                new_state: new,
            },
            Context::new(),
        )
    }

    #[test]
    fn test_fires_on_actual_change_only() {
        let trigger = ItemStateChangedTrigger::from_config(&config(
            json!({"item_name": "door_sensor"}),
        ))
        .unwrap();

        let changed = state_changed("door_sensor", Value::from("CLOSED"), Value::from("OPEN"));
        let outputs = trigger.on_event(&changed).unwrap();
        assert_eq!(outputs["new_state"], "OPEN");
        assert_eq!(outputs["old_state"], "CLOSED");

        let same = state_changed("door_sensor", Value::from("OPEN"), Value::from("OPEN"));
        assert!(trigger.on_event(&same).is_none());
    }

    #[test]
    fn test_state_constraints() {
        let trigger = ItemStateChangedTrigger::from_config(&config(
            json!({"item_name": "door_sensor", "state": "OPEN", "previous_state": "CLOSED"}),
        ))
        .unwrap();

        let matching = state_changed("door_sensor", Value::from("CLOSED"), Value::from("OPEN"));
        assert!(trigger.on_event(&matching).is_some());

        let wrong_old = state_changed("door_sensor", Value::from("AJAR"), Value::from("OPEN"));
        assert!(trigger.on_event(&wrong_old).is_none());
    }

    #[test]
    fn test_filter_restricted_to_item_topic() {
        let trigger = ItemStateChangedTrigger::from_config(&config(
            json!({"item_name": "door_sensor"}),
        ))
        .unwrap();
        let filter = trigger.event_filter().unwrap();

        let ours = state_changed("door_sensor", Value::from("CLOSED"), Value::from("OPEN"));
        let other = state_changed("window_sensor", Value::from("CLOSED"), Value::from("OPEN"));
        assert!(filter.matches(&ours));
        assert!(!filter.matches(&other));
    }

    #[tokio::test]
    async fn test_command_action_posts_to_item() {
        let bus = Arc::new(EventBus::new());
        let items = Arc::new(ItemRegistry::new(bus));
        items.add("hall_light", Value::from("OFF"));

        let action = ItemCommandAction::from_config(
            &config(json!({"item_name": "hall_light", "command": "ON"})),
            items.clone(),
        )
        .unwrap();

        action.execute(&Inputs::new(), &Context::new()).await.unwrap();
        assert_eq!(items.state("hall_light"), Some(Value::from("ON")));
    }

    #[tokio::test]
    async fn test_command_action_unknown_item_fails() {
        let bus = Arc::new(EventBus::new());
        let items = Arc::new(ItemRegistry::new(bus));

        let action = ItemCommandAction::from_config(
            &config(json!({"item_name": "missing", "command": "ON"})),
            items,
        )
        .unwrap();

        let result = action.execute(&Inputs::new(), &Context::new()).await;
        assert!(matches!(result, Err(ActionError::Failed(_))));
    }
}
