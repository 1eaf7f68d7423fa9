//! Built-in module handlers

pub mod compare;
pub mod event;
pub mod item;
pub mod rule;

use crate::handler::{
    ActionHandler, ConditionHandler, HandlerRegistry, HandlerServices, TriggerHandler,
};

use compare::CompareCondition;
use event::{EventMatchCondition, EventTrigger};
use item::{ItemCommandAction, ItemStateChangedTrigger};
use rule::{RuleEnablementAction, RunRuleAction};

/// Register the built-in handler set
pub(crate) fn register_defaults(registry: &HandlerRegistry) {
    registry.register_trigger("event", |config, _services| {
        let handler: Box<dyn TriggerHandler> = Box::new(EventTrigger::from_config(config)?);
        Ok(handler)
    });
    registry.register_trigger("item_state_changed", |config, _services| {
        let handler: Box<dyn TriggerHandler> =
            Box::new(ItemStateChangedTrigger::from_config(config)?);
        Ok(handler)
    });

    registry.register_condition("compare", |config, _services| {
        let handler: Box<dyn ConditionHandler> = Box::new(CompareCondition::from_config(config)?);
        Ok(handler)
    });
    registry.register_condition("event_match", |config, _services| {
        let handler: Box<dyn ConditionHandler> =
            Box::new(EventMatchCondition::from_config(config)?);
        Ok(handler)
    });

    registry.register_action("item_command", |config, services: &HandlerServices| {
        let handler: Box<dyn ActionHandler> =
            Box::new(ItemCommandAction::from_config(config, services.items.clone())?);
        Ok(handler)
    });
    registry.register_action("run_rule", |config, services: &HandlerServices| {
        let handler: Box<dyn ActionHandler> =
            Box::new(RunRuleAction::from_config(config, services.rules.clone())?);
        Ok(handler)
    });
    registry.register_action("rule_enablement", |config, services: &HandlerServices| {
        let handler: Box<dyn ActionHandler> =
            Box::new(RuleEnablementAction::from_config(config, services.rules.clone())?);
        Ok(handler)
    });
}
