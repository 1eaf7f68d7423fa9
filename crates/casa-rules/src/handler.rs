//! Module handler traits and the open handler registry
//!
//! Handlers are resolved by type-id string against a factory registry, so
//! new trigger/condition/action types plug in without engine changes. A
//! rule referencing an unregistered type stays UNINITIALIZED with a
//! diagnostic until the type is registered and the rule is re-enabled.

use async_trait::async_trait;
use casa_core::{Context, Event};
use casa_event_bus::{EventBus, EventFilter};
use casa_items::ItemRegistry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use thiserror::Error;
use tracing::debug;

use crate::config::{ConfigError, ConfigResult};
use crate::module::ConfigMap;

/// Runtime inputs of a condition or action, keyed by input name
pub type Inputs = HashMap<String, serde_json::Value>;

/// Runtime outputs of a trigger or action, keyed by output name
pub type Outputs = HashMap<String, serde_json::Value>;

/// Action execution errors
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Action failed: {0}")]
    Failed(String),

    #[error("Rule engine is no longer available")]
    EngineGone,
}

/// A trigger handler matches bus events and supplies evaluation context
pub trait TriggerHandler: Send + Sync {
    /// Filter for the trigger's bus subscription
    ///
    /// `None` means the trigger can never match (e.g. an unparsable topic
    /// glob, which fails closed).
    fn event_filter(&self) -> Option<EventFilter>;

    /// Match an event, producing the trigger's outputs on success
    fn on_event(&self, event: &Event) -> Option<Outputs>;
}

/// A condition handler decides whether a triggered rule may proceed
///
/// Evaluation failures are treated as "not satisfied": implementations
/// log and return `false` rather than propagating errors.
pub trait ConditionHandler: Send + Sync {
    fn is_satisfied(&self, inputs: &Inputs) -> bool;
}

/// An action handler executes a side effect of a running rule
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, inputs: &Inputs, context: &Context) -> Result<Outputs, ActionError>;
}

/// Cross-rule operations available to action handlers
///
/// Implemented by the rule engine; handlers hold it weakly so the
/// engine -> handler -> engine reference chain never forms a cycle.
pub trait RuleInvoker: Send + Sync {
    /// Trigger an evaluation pass of another rule, as if an external
    /// event had matched it. Subject to the drop-on-reentry gate.
    fn run_rule(&self, uid: &str, context: &Context);

    /// Enable or disable another rule. Returns false for an unknown uid.
    fn set_rule_enabled(&self, uid: &str, enabled: bool) -> bool;
}

/// Services available to handler factories
#[derive(Clone)]
pub struct HandlerServices {
    /// The system event bus
    pub bus: Arc<EventBus>,

    /// The item registry, for command-dispatching actions
    pub items: Arc<ItemRegistry>,

    /// The rule engine, for cross-rule actions
    pub rules: Weak<dyn RuleInvoker>,
}

type TriggerFactory =
    Box<dyn Fn(&ConfigMap, &HandlerServices) -> ConfigResult<Box<dyn TriggerHandler>> + Send + Sync>;
type ConditionFactory = Box<
    dyn Fn(&ConfigMap, &HandlerServices) -> ConfigResult<Box<dyn ConditionHandler>> + Send + Sync,
>;
type ActionFactory =
    Box<dyn Fn(&ConfigMap, &HandlerServices) -> ConfigResult<Box<dyn ActionHandler>> + Send + Sync>;

/// The open registry of handler factories, keyed by type id
pub struct HandlerRegistry {
    triggers: DashMap<String, TriggerFactory>,
    conditions: DashMap<String, ConditionFactory>,
    actions: DashMap<String, ActionFactory>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            triggers: DashMap::new(),
            conditions: DashMap::new(),
            actions: DashMap::new(),
        }
    }

    /// Register a trigger handler factory
    pub fn register_trigger<F>(&self, type_id: impl Into<String>, factory: F)
    where
        F: Fn(&ConfigMap, &HandlerServices) -> ConfigResult<Box<dyn TriggerHandler>>
            + Send
            + Sync
            + 'static,
    {
        let type_id = type_id.into();
        debug!(type_id = %type_id, "Registering trigger handler");
        self.triggers.insert(type_id, Box::new(factory));
    }

    /// Register a condition handler factory
    pub fn register_condition<F>(&self, type_id: impl Into<String>, factory: F)
    where
        F: Fn(&ConfigMap, &HandlerServices) -> ConfigResult<Box<dyn ConditionHandler>>
            + Send
            + Sync
            + 'static,
    {
        let type_id = type_id.into();
        debug!(type_id = %type_id, "Registering condition handler");
        self.conditions.insert(type_id, Box::new(factory));
    }

    /// Register an action handler factory
    pub fn register_action<F>(&self, type_id: impl Into<String>, factory: F)
    where
        F: Fn(&ConfigMap, &HandlerServices) -> ConfigResult<Box<dyn ActionHandler>>
            + Send
            + Sync
            + 'static,
    {
        let type_id = type_id.into();
        debug!(type_id = %type_id, "Registering action handler");
        self.actions.insert(type_id, Box::new(factory));
    }

    /// Instantiate a trigger handler
    pub fn create_trigger(
        &self,
        type_id: &str,
        config: &ConfigMap,
        services: &HandlerServices,
    ) -> ConfigResult<Box<dyn TriggerHandler>> {
        let factory = self
            .triggers
            .get(type_id)
            .ok_or_else(|| ConfigError::UnknownType(type_id.to_string()))?;
        factory(config, services)
    }

    /// Instantiate a condition handler
    pub fn create_condition(
        &self,
        type_id: &str,
        config: &ConfigMap,
        services: &HandlerServices,
    ) -> ConfigResult<Box<dyn ConditionHandler>> {
        let factory = self
            .conditions
            .get(type_id)
            .ok_or_else(|| ConfigError::UnknownType(type_id.to_string()))?;
        factory(config, services)
    }

    /// Instantiate an action handler
    pub fn create_action(
        &self,
        type_id: &str,
        config: &ConfigMap,
        services: &HandlerServices,
    ) -> ConfigResult<Box<dyn ActionHandler>> {
        let factory = self
            .actions
            .get(type_id)
            .ok_or_else(|| ConfigError::UnknownType(type_id.to_string()))?;
        factory(config, services)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
