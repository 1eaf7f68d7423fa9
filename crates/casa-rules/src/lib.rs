//! The Casa rule engine
//!
//! Rules bundle trigger, condition, and action modules. Triggers listen
//! on the event bus; when one matches, the rule moves IDLE -> TRIGGERED
//! and a single-flight evaluation pass runs its conditions and actions
//! on a dedicated worker task. Triggers firing mid-pass are dropped, not
//! queued. Every lifecycle transition is published on
//! `automation/rules/{uid}/state`.
//!
//! New module types plug in through the [`HandlerRegistry`]; the built-in
//! set covers event and item-state triggers, compare and event-match
//! conditions, and item-command and cross-rule actions.

mod config;
mod engine;
mod handler;
pub mod handlers;
mod module;
mod rule;

pub use config::{
    optional_str, required_bool, required_str, str_list, validate_config, ConfigError, ConfigParameter,
    ConfigResult, ParameterType,
};
pub use engine::{RuleEngine, RuleError, RuleResult};
pub use handler::{
    ActionError, ActionHandler, ConditionHandler, HandlerRegistry, HandlerServices, Inputs,
    Outputs, RuleInvoker, TriggerHandler,
};
pub use module::{ActionDef, ConditionDef, ConfigMap, Connection, InputSource, ModuleError, TriggerDef};
pub use rule::{Rule, RuleConfig};
