//! Rule execution engine
//!
//! Each stored rule gets one persistent worker task fed by an unbounded
//! request channel; every evaluation pass of that rule runs on it, so
//! passes are serialized for the rule's whole lifetime, across
//! enable/disable cycles. Activation additionally spawns one listener
//! task per trigger; the bus subscription is taken before activation
//! returns, so no event fired after `add` or `set_enabled(true)` can be
//! missed. Dispatch gates on the IDLE -> TRIGGERED transition under the
//! rule's status lock: a trigger firing while a pass is in flight is
//! dropped, never queued. Within a pass, conditions and actions run
//! strictly sequentially, reading and writing a slot buffer that carries
//! module outputs resolved to indices at activation time.

use casa_core::events::RuleStatusInfoData;
use casa_core::{Context, RuleStatus, RuleStatusDetail, RuleStatusInfo};
use casa_event_bus::EventBus;
use casa_items::ItemRegistry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::{validate_config, ConfigError, ConfigResult};
use crate::handler::{
    ActionHandler, ConditionHandler, HandlerRegistry, HandlerServices, Outputs, RuleInvoker,
    TriggerHandler,
};
use crate::handlers;
use crate::module::{Connection, InputSource};
use crate::rule::{Rule, RuleConfig};

/// Trigger module name reported for explicitly requested runs
const MANUAL_TRIGGER: &str = "manual";

/// Rule management errors
#[derive(Debug, Clone, Error)]
pub enum RuleError {
    #[error("Rule not found: {0}")]
    NotFound(String),

    #[error("Rule already exists: {0}")]
    AlreadyExists(String),
}

/// Result type for rule management operations
pub type RuleResult<T> = Result<T, RuleError>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// --- Resolved form ---

/// Where a module input takes its value from at evaluation time
enum InputBinding {
    /// A slot in the pass buffer, written by a producing module
    Slot(usize),

    /// A rule-level config value captured at resolution
    Literal(serde_json::Value),
}

struct ResolvedInput {
    name: String,
    binding: InputBinding,
}

struct ResolvedTrigger {
    module_id: String,
    handler: Arc<dyn TriggerHandler>,
    /// Output name -> slot, for outputs some downstream module consumes
    writes: Vec<(String, usize)>,
}

struct ResolvedCondition {
    module_id: String,
    handler: Box<dyn ConditionHandler>,
    inputs: Vec<ResolvedInput>,
}

struct ResolvedAction {
    module_id: String,
    handler: Box<dyn ActionHandler>,
    inputs: Vec<ResolvedInput>,
    writes: Vec<(String, usize)>,
}

impl std::fmt::Debug for ResolvedRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedRule")
            .field("triggers", &self.triggers.len())
            .field("conditions", &self.conditions.len())
            .field("actions", &self.actions.len())
            .field("slot_count", &self.slot_count)
            .finish()
    }
}

/// A rule with handlers instantiated and connections resolved to slots
struct ResolvedRule {
    triggers: Vec<ResolvedTrigger>,
    conditions: Vec<ResolvedCondition>,
    actions: Vec<ResolvedAction>,
    slot_count: usize,
}

/// Resolve a rule's modules against the handler registry
///
/// Connection references are checked here, once: conditions may only
/// consume trigger outputs, actions may consume trigger outputs or the
/// outputs of strictly earlier actions. `$param` references are captured
/// as literals from the rule config.
fn resolve_rule(
    rule: &Rule,
    registry: &HandlerRegistry,
    services: &HandlerServices,
) -> ConfigResult<ResolvedRule> {
    let mut module_ids: HashMap<&str, ()> = HashMap::new();
    for id in rule
        .triggers
        .iter()
        .map(|t| t.id.as_str())
        .chain(rule.conditions.iter().map(|c| c.id.as_str()))
        .chain(rule.actions.iter().map(|a| a.id.as_str()))
    {
        if module_ids.insert(id, ()).is_some() {
            return Err(ConfigError::DuplicateModuleId(id.to_string()));
        }
    }

    let trigger_ids: Vec<&str> = rule.triggers.iter().map(|t| t.id.as_str()).collect();
    let action_ids: Vec<&str> = rule.actions.iter().map(|a| a.id.as_str()).collect();

    // Slots are allocated per consumed (producer, output) pair.
    let mut slots: HashMap<(String, String), usize> = HashMap::new();
    let mut allocate = |module_id: &str, output: &str| -> usize {
        let next = slots.len();
        *slots
            .entry((module_id.to_string(), output.to_string()))
            .or_insert(next)
    };

    let mut resolve_inputs = |consumer: &str,
                              inputs: &HashMap<String, String>,
                              allowed: &dyn Fn(&str) -> bool|
     -> ConfigResult<Vec<ResolvedInput>> {
        let mut resolved = Vec::with_capacity(inputs.len());
        for (input, reference) in inputs {
            let connection = Connection::parse(input, reference).map_err(|err| {
                ConfigError::InvalidConnection {
                    module: consumer.to_string(),
                    input: input.clone(),
                    message: err.to_string(),
                }
            })?;
            let binding = match connection.source {
                InputSource::Config(param) => match rule.config.get(&param) {
                    Some(value) => InputBinding::Literal(value.clone()),
                    None => return Err(ConfigError::MissingParameter(param)),
                },
                InputSource::Output { module_id, output } => {
                    if !allowed(&module_id) {
                        return Err(ConfigError::InvalidConnection {
                            module: consumer.to_string(),
                            input: input.clone(),
                            message: format!("'{}' is not an upstream module", module_id),
                        });
                    }
                    InputBinding::Slot(allocate(&module_id, &output))
                }
            };
            resolved.push(ResolvedInput {
                name: input.clone(),
                binding,
            });
        }
        Ok(resolved)
    };

    let mut conditions = Vec::with_capacity(rule.conditions.len());
    for def in &rule.conditions {
        let allowed = |id: &str| trigger_ids.contains(&id);
        let inputs = resolve_inputs(&def.id, &def.inputs, &allowed)?;
        let handler = registry.create_condition(&def.type_id, &def.config, services)?;
        conditions.push(ResolvedCondition {
            module_id: def.id.clone(),
            handler,
            inputs,
        });
    }

    let mut actions = Vec::with_capacity(rule.actions.len());
    for (index, def) in rule.actions.iter().enumerate() {
        let allowed = |id: &str| {
            trigger_ids.contains(&id)
                || action_ids.iter().position(|a| *a == id).is_some_and(|p| p < index)
        };
        let inputs = resolve_inputs(&def.id, &def.inputs, &allowed)?;
        let handler = registry.create_action(&def.type_id, &def.config, services)?;
        actions.push(ResolvedAction {
            module_id: def.id.clone(),
            handler,
            inputs,
            writes: Vec::new(),
        });
    }

    let mut triggers = Vec::with_capacity(rule.triggers.len());
    for def in &rule.triggers {
        let handler: Arc<dyn TriggerHandler> =
            Arc::from(registry.create_trigger(&def.type_id, &def.config, services)?);
        triggers.push(ResolvedTrigger {
            module_id: def.id.clone(),
            handler,
            writes: Vec::new(),
        });
    }

    // Distribute the allocated slots back onto their producers.
    let slot_count = slots.len();
    for ((module_id, output), slot) in slots {
        if let Some(trigger) = triggers.iter_mut().find(|t| t.module_id == module_id) {
            trigger.writes.push((output, slot));
        } else if let Some(action) = actions.iter_mut().find(|a| a.module_id == module_id) {
            action.writes.push((output, slot));
        }
    }

    Ok(ResolvedRule {
        triggers,
        conditions,
        actions,
        slot_count,
    })
}

// --- Runtime ---

/// A work request for a rule's worker task
///
/// Carries the resolved rule so a re-resolution (update, re-enable) never
/// swaps module handlers out from under an already-queued pass.
struct EvalRequest {
    resolved: Arc<ResolvedRule>,
    trigger_module: String,
    outputs: Outputs,
    context: Context,
}

/// Subscriptions and resolved form of an activated rule
struct ActiveRule {
    resolved: Arc<ResolvedRule>,
    listeners: Vec<JoinHandle<()>>,
}

/// Shared mutable state of one rule
struct RuleRuntime {
    uid: String,
    status: Mutex<RuleStatusInfo>,
    enabled: AtomicBool,
    /// Feeds the rule's persistent worker; live until the rule is removed
    work_tx: mpsc::UnboundedSender<EvalRequest>,
    worker: Mutex<Option<JoinHandle<()>>>,
    active: Mutex<Option<ActiveRule>>,
}

impl RuleRuntime {
    fn new(uid: String, work_tx: mpsc::UnboundedSender<EvalRequest>) -> Self {
        Self {
            uid,
            status: Mutex::new(RuleStatusInfo::new(RuleStatus::Uninitialized)),
            enabled: AtomicBool::new(false),
            work_tx,
            worker: Mutex::new(None),
            active: Mutex::new(None),
        }
    }
}

/// Publish a status transition on the rule's status topic
fn publish_status(bus: &EventBus, runtime: &RuleRuntime, info: RuleStatusInfo, context: &Context) {
    debug!(rule = %runtime.uid, status = %info, "Rule status changed");
    bus.fire_typed(
        RuleStatusInfoData {
            rule_uid: runtime.uid.clone(),
            status_info: info,
        },
        context.clone(),
    );
}

/// Set the status under the lock, then publish the transition
fn set_status(bus: &EventBus, runtime: &RuleRuntime, info: RuleStatusInfo, context: &Context) {
    {
        let mut status = lock(&runtime.status);
        *status = info.clone();
    }
    publish_status(bus, runtime, info, context);
}

fn disabled_status() -> RuleStatusInfo {
    RuleStatusInfo::new(RuleStatus::Disabled).with_detail(RuleStatusDetail::Disabled)
}

/// Hand a matched trigger to the rule's worker
///
/// The IDLE -> TRIGGERED transition is taken under the status lock; any
/// other current status means a pass is in flight (or the rule is out of
/// service) and the firing is dropped.
fn dispatch(
    bus: &EventBus,
    runtime: &RuleRuntime,
    resolved: &Arc<ResolvedRule>,
    trigger_module: &str,
    outputs: Outputs,
    context: Context,
) {
    if !runtime.enabled.load(Ordering::SeqCst) {
        debug!(rule = %runtime.uid, module = %trigger_module, "Dropping trigger for disabled rule");
        return;
    }

    {
        let mut status = lock(&runtime.status);
        if status.status != RuleStatus::Idle {
            debug!(
                rule = %runtime.uid,
                module = %trigger_module,
                status = %status.status,
                "Dropping trigger; evaluation already in flight"
            );
            return;
        }
        *status = RuleStatusInfo::new(RuleStatus::Triggered);
    }
    publish_status(bus, runtime, RuleStatusInfo::new(RuleStatus::Triggered), &context);

    let _ = runtime.work_tx.send(EvalRequest {
        resolved: resolved.clone(),
        trigger_module: trigger_module.to_string(),
        outputs,
        context,
    });
}

async fn run_worker(
    bus: Arc<EventBus>,
    runtime: Arc<RuleRuntime>,
    mut work_rx: mpsc::UnboundedReceiver<EvalRequest>,
) {
    while let Some(request) = work_rx.recv().await {
        run_pass(&bus, &runtime, request).await;
    }
}

/// One evaluation pass: trigger outputs -> conditions -> actions
async fn run_pass(bus: &EventBus, runtime: &RuleRuntime, request: EvalRequest) {
    let EvalRequest {
        resolved,
        trigger_module,
        outputs,
        context,
    } = request;
    let (resolved, trigger_module, context) = (&*resolved, trigger_module.as_str(), &context);
    trace!(rule = %runtime.uid, module = %trigger_module, "Starting evaluation pass");

    let mut slots: Vec<Option<serde_json::Value>> = vec![None; resolved.slot_count];
    if let Some(trigger) = resolved
        .triggers
        .iter()
        .find(|t| t.module_id == trigger_module)
    {
        write_outputs(&mut slots, &trigger.writes, &outputs);
    }

    for condition in &resolved.conditions {
        let inputs = collect_inputs(&condition.inputs, &slots);
        if !condition.handler.is_satisfied(&inputs) {
            debug!(rule = %runtime.uid, module = %condition.module_id, "Condition not satisfied");
            finish_pass(bus, runtime, context);
            return;
        }
    }

    set_status(bus, runtime, RuleStatusInfo::new(RuleStatus::Running), context);

    for action in &resolved.actions {
        let inputs = collect_inputs(&action.inputs, &slots);
        match action.handler.execute(&inputs, context).await {
            Ok(outputs) => write_outputs(&mut slots, &action.writes, &outputs),
            Err(err) => {
                // Action failures do not abort the pass; later actions
                // still run with whatever outputs exist.
                warn!(rule = %runtime.uid, module = %action.module_id, error = %err, "Action failed");
            }
        }
    }

    finish_pass(bus, runtime, context);
}

/// Leave the pass: back to IDLE, or to DISABLED when a disable arrived
/// mid-pass
///
/// The transition is taken only while the rule is still in an active
/// state; a removal or failed re-resolution that already moved the
/// status elsewhere is left alone.
fn finish_pass(bus: &EventBus, runtime: &RuleRuntime, context: &Context) {
    let info = if runtime.enabled.load(Ordering::SeqCst) {
        RuleStatusInfo::new(RuleStatus::Idle)
    } else {
        disabled_status()
    };

    let published = {
        let mut status = lock(&runtime.status);
        if status.status.is_active() {
            *status = info.clone();
            true
        } else {
            false
        }
    };
    if published {
        publish_status(bus, runtime, info, context);
    }
}

fn collect_inputs(inputs: &[ResolvedInput], slots: &[Option<serde_json::Value>]) -> crate::handler::Inputs {
    let mut collected = crate::handler::Inputs::with_capacity(inputs.len());
    for input in inputs {
        match &input.binding {
            InputBinding::Slot(slot) => {
                // An unwritten slot leaves the input absent; consumers
                // fail closed on missing inputs.
                if let Some(value) = &slots[*slot] {
                    collected.insert(input.name.clone(), value.clone());
                }
            }
            InputBinding::Literal(value) => {
                collected.insert(input.name.clone(), value.clone());
            }
        }
    }
    collected
}

fn write_outputs(
    slots: &mut [Option<serde_json::Value>],
    writes: &[(String, usize)],
    outputs: &Outputs,
) {
    for (output, slot) in writes {
        if let Some(value) = outputs.get(output) {
            slots[*slot] = Some(value.clone());
        }
    }
}

// --- Engine ---

struct RuleEntry {
    rule: Rule,
    runtime: Arc<RuleRuntime>,
}

struct EngineInner {
    bus: Arc<EventBus>,
    handlers: Arc<HandlerRegistry>,
    services: HandlerServices,
    rules: DashMap<String, RuleEntry>,
}

/// The rule engine: rule storage, lifecycle, and evaluation
#[derive(Clone)]
pub struct RuleEngine {
    inner: Arc<EngineInner>,
}

impl RuleEngine {
    /// Create an engine with the default handler set registered
    pub fn new(bus: Arc<EventBus>, items: Arc<ItemRegistry>) -> Self {
        let registry = Arc::new(HandlerRegistry::new());
        handlers::register_defaults(&registry);

        let inner = Arc::new_cyclic(|weak: &Weak<EngineInner>| {
            let invoker: Weak<dyn RuleInvoker> = weak.clone();
            EngineInner {
                bus: bus.clone(),
                handlers: registry,
                services: HandlerServices {
                    bus,
                    items,
                    rules: invoker,
                },
                rules: DashMap::new(),
            }
        });

        Self { inner }
    }

    /// Add a rule; activates it immediately unless added disabled
    pub fn add(&self, config: RuleConfig) -> RuleResult<String> {
        let rule = Rule::from_config(config);
        if self.inner.rules.contains_key(&rule.uid) {
            return Err(RuleError::AlreadyExists(rule.uid));
        }
        Ok(self.inner.insert_and_start(rule))
    }

    /// Replace an existing rule's definition, restarting it
    pub fn update(&self, uid: &str, config: RuleConfig) -> RuleResult<()> {
        self.remove(uid)?;
        let mut rule = Rule::from_config(config);
        rule.uid = uid.to_string();
        self.inner.insert_and_start(rule);
        Ok(())
    }

    /// Remove a rule, tearing down its tasks
    pub fn remove(&self, uid: &str) -> RuleResult<()> {
        let (_, entry) = self
            .inner
            .rules
            .remove(uid)
            .ok_or_else(|| RuleError::NotFound(uid.to_string()))?;

        info!(rule = %uid, "Removing rule");
        entry.runtime.enabled.store(false, Ordering::SeqCst);
        if let Some(active) = lock(&entry.runtime.active).take() {
            for listener in active.listeners {
                listener.abort();
            }
        }
        if let Some(worker) = lock(&entry.runtime.worker).take() {
            worker.abort();
        }
        Ok(())
    }

    /// Enable or disable a rule
    ///
    /// Disabling lets an in-flight pass finish; the DISABLED status is
    /// published once the pass has drained.
    pub fn set_enabled(&self, uid: &str, enabled: bool) -> RuleResult<()> {
        {
            let mut entry = self
                .inner
                .rules
                .get_mut(uid)
                .ok_or_else(|| RuleError::NotFound(uid.to_string()))?;
            entry.rule.enabled = enabled;
        }
        if enabled {
            self.inner.activate(uid);
        } else {
            self.inner.deactivate(uid);
        }
        Ok(())
    }

    /// Request an evaluation pass as if a trigger had fired
    ///
    /// Subject to the same drop-on-reentry gate as real triggers. The
    /// request is silently dropped when the rule is not runnable.
    pub fn run_rule(&self, uid: &str, context: &Context) -> RuleResult<()> {
        self.inner.run_now(uid, context)
    }

    /// Get a rule's stored definition
    pub fn get(&self, uid: &str) -> Option<Rule> {
        self.inner.rules.get(uid).map(|entry| entry.rule.clone())
    }

    /// All stored rules
    pub fn all(&self) -> Vec<Rule> {
        self.inner
            .rules
            .iter()
            .map(|entry| entry.rule.clone())
            .collect()
    }

    /// A rule's current status
    pub fn get_status(&self, uid: &str) -> Option<RuleStatusInfo> {
        self.inner
            .rules
            .get(uid)
            .map(|entry| lock(&entry.runtime.status).clone())
    }

    /// The handler registry, for registering custom module types
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.inner.handlers
    }
}

impl EngineInner {
    fn insert_and_start(&self, rule: Rule) -> String {
        let uid = rule.uid.clone();
        let enabled = rule.enabled;

        // One worker per rule for its whole lifetime: every pass of this
        // rule is serialized through its queue, across enable/disable.
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let runtime = Arc::new(RuleRuntime::new(uid.clone(), work_tx));
        let worker = tokio::spawn(run_worker(self.bus.clone(), runtime.clone(), work_rx));
        *lock(&runtime.worker) = Some(worker);

        info!(rule = %uid, name = %rule.display_name(), enabled, "Adding rule");
        self.rules.insert(
            uid.clone(),
            RuleEntry {
                rule,
                runtime: runtime.clone(),
            },
        );

        if enabled {
            self.activate(&uid);
        } else {
            set_status(&self.bus, &runtime, disabled_status(), &Context::new());
        }
        uid
    }

    /// Resolve the rule and spawn its worker and listener tasks
    fn activate(&self, uid: &str) {
        let (mut rule, runtime) = match self.rules.get(uid) {
            Some(entry) => (entry.rule.clone(), entry.runtime.clone()),
            None => return,
        };

        if lock(&runtime.active).is_some() {
            return;
        }
        runtime.enabled.store(true, Ordering::SeqCst);

        if let Err(err) = validate_config(&rule.config_descriptions, &mut rule.config) {
            warn!(rule = %uid, error = %err, "Rule configuration invalid");
            set_status(
                &self.bus,
                &runtime,
                RuleStatusInfo::new(RuleStatus::Uninitialized)
                    .with_detail(RuleStatusDetail::ConfigurationError)
                    .with_message(err.to_string()),
                &Context::new(),
            );
            return;
        }

        let resolved = match resolve_rule(&rule, &self.handlers, &self.services) {
            Ok(resolved) => Arc::new(resolved),
            Err(err) => {
                let detail = match &err {
                    ConfigError::UnknownType(_) => RuleStatusDetail::HandlerMissingError,
                    _ => RuleStatusDetail::ConfigurationError,
                };
                warn!(rule = %uid, error = %err, "Rule failed to resolve");
                set_status(
                    &self.bus,
                    &runtime,
                    RuleStatusInfo::new(RuleStatus::Uninitialized)
                        .with_detail(detail)
                        .with_message(err.to_string()),
                    &Context::new(),
                );
                return;
            }
        };

        let mut listeners = Vec::with_capacity(resolved.triggers.len());
        for trigger in &resolved.triggers {
            let Some(filter) = trigger.handler.event_filter() else {
                warn!(rule = %uid, module = %trigger.module_id, "Trigger can never match; skipping subscription");
                continue;
            };

            // Subscribe before this call returns, so an event fired right
            // after add()/set_enabled(true) cannot slip past the rule.
            let stream = self.bus.subscribe(filter);

            let bus = self.bus.clone();
            let task_runtime = runtime.clone();
            let task_resolved = resolved.clone();
            let handler = trigger.handler.clone();
            let module_id = trigger.module_id.clone();
            listeners.push(tokio::spawn(async move {
                let mut stream = stream;
                while let Some(event) = stream.recv().await {
                    if let Some(outputs) = handler.on_event(&event) {
                        dispatch(
                            &bus,
                            &task_runtime,
                            &task_resolved,
                            &module_id,
                            outputs,
                            event.context.child(),
                        );
                    }
                }
            }));
        }

        {
            let mut active = lock(&runtime.active);
            *active = Some(ActiveRule {
                resolved,
                listeners,
            });
        }

        // A pass still draining from before a disable keeps the gate shut
        // and publishes its own exit transition; IDLE goes out here only
        // when no pass is in flight.
        let publish_idle = {
            let mut status = lock(&runtime.status);
            if status.status.is_active() {
                false
            } else {
                *status = RuleStatusInfo::new(RuleStatus::Idle);
                true
            }
        };
        if publish_idle {
            publish_status(
                &self.bus,
                &runtime,
                RuleStatusInfo::new(RuleStatus::Idle),
                &Context::new(),
            );
        }
    }

    /// Stop listening for triggers; an in-flight pass drains on the
    /// rule's worker and publishes DISABLED itself
    fn deactivate(&self, uid: &str) {
        let runtime = match self.rules.get(uid) {
            Some(entry) => entry.runtime.clone(),
            None => return,
        };

        runtime.enabled.store(false, Ordering::SeqCst);
        if let Some(active) = lock(&runtime.active).take() {
            for listener in active.listeners {
                listener.abort();
            }
        }

        // With no pass in flight, the worker has nothing to drain and the
        // transition is published here; otherwise the worker publishes it.
        let publish_now = {
            let status = lock(&runtime.status);
            !status.status.is_active() && status.status != RuleStatus::Disabled
        };
        if publish_now {
            set_status(&self.bus, &runtime, disabled_status(), &Context::new());
        }
    }

    fn run_now(&self, uid: &str, context: &Context) -> RuleResult<()> {
        let (runtime, resolved) = {
            let entry = self
                .rules
                .get(uid)
                .ok_or_else(|| RuleError::NotFound(uid.to_string()))?;
            let runtime = entry.runtime.clone();
            let resolved = lock(&runtime.active)
                .as_ref()
                .map(|active| active.resolved.clone());
            (runtime, resolved)
        };

        match resolved {
            Some(resolved) => {
                dispatch(
                    &self.bus,
                    &runtime,
                    &resolved,
                    MANUAL_TRIGGER,
                    Outputs::new(),
                    context.child(),
                );
                Ok(())
            }
            None => {
                debug!(rule = %uid, "Dropping run request; rule not active");
                Ok(())
            }
        }
    }
}

impl RuleInvoker for EngineInner {
    fn run_rule(&self, uid: &str, context: &Context) {
        if let Err(err) = self.run_now(uid, context) {
            warn!(rule = %uid, error = %err, "Cross-rule run failed");
        }
    }

    fn set_rule_enabled(&self, uid: &str, enabled: bool) -> bool {
        let found = {
            match self.rules.get_mut(uid) {
                Some(mut entry) => {
                    entry.rule.enabled = enabled;
                    true
                }
                None => false,
            }
        };
        if !found {
            return false;
        }
        if enabled {
            self.activate(uid);
        } else {
            self.deactivate(uid);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ActionDef, ConditionDef, TriggerDef};
    use serde_json::json;

    struct NoopInvoker;
    impl RuleInvoker for NoopInvoker {
        fn run_rule(&self, _uid: &str, _context: &Context) {}
        fn set_rule_enabled(&self, _uid: &str, _enabled: bool) -> bool {
            false
        }
    }

    fn services() -> (HandlerServices, Arc<dyn RuleInvoker>) {
        let bus = Arc::new(EventBus::new());
        let items = Arc::new(ItemRegistry::new(bus.clone()));
        let invoker: Arc<dyn RuleInvoker> = Arc::new(NoopInvoker);
        (
            HandlerServices {
                bus,
                items,
                rules: Arc::downgrade(&invoker),
            },
            invoker,
        )
    }

    fn registry() -> HandlerRegistry {
        let registry = HandlerRegistry::new();
        handlers::register_defaults(&registry);
        registry
    }

    fn config(value: serde_json::Value) -> crate::module::ConfigMap {
        value.as_object().cloned().unwrap_or_default()
    }

    fn base_rule() -> Rule {
        Rule::from_config(RuleConfig {
            uid: Some("r1".to_string()),
            name: None,
            description: None,
            tags: vec![],
            triggers: vec![TriggerDef {
                id: "t1".to_string(),
                type_id: "event".to_string(),
                config: config(json!({"types": "item_state_changed"})),
            }],
            conditions: vec![],
            actions: vec![],
            config: config(json!({"threshold": "21"})),
            config_descriptions: vec![],
            enabled: true,
        })
    }

    #[test]
    fn test_resolve_minimal_rule() {
        let (services, _invoker) = services();
        let rule = base_rule();
        let resolved = resolve_rule(&rule, &registry(), &services).unwrap();
        assert_eq!(resolved.triggers.len(), 1);
        assert_eq!(resolved.slot_count, 0);
    }

    #[test]
    fn test_resolve_allocates_slots_for_consumed_outputs() {
        let (services, _invoker) = services();
        let mut rule = base_rule();
        rule.conditions.push(ConditionDef {
            id: "c1".to_string(),
            type_id: "compare".to_string(),
            config: config(json!({"right": "ON"})),
            inputs: [("input".to_string(), "t1.payload".to_string())].into(),
        });

        let resolved = resolve_rule(&rule, &registry(), &services).unwrap();
        assert_eq!(resolved.slot_count, 1);
        assert_eq!(resolved.triggers[0].writes, vec![("payload".to_string(), 0)]);
    }

    #[test]
    fn test_duplicate_module_id_rejected() {
        let (services, _invoker) = services();
        let mut rule = base_rule();
        rule.actions.push(ActionDef {
            id: "t1".to_string(),
            type_id: "item_command".to_string(),
            config: config(json!({"item_name": "x", "command": "ON"})),
            inputs: Default::default(),
        });

        let err = resolve_rule(&rule, &registry(), &services).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateModuleId(id) if id == "t1"));
    }

    #[test]
    fn test_condition_may_not_consume_action_output() {
        let (services, _invoker) = services();
        let mut rule = base_rule();
        rule.actions.push(ActionDef {
            id: "a1".to_string(),
            type_id: "item_command".to_string(),
            config: config(json!({"item_name": "x", "command": "ON"})),
            inputs: Default::default(),
        });
        rule.conditions.push(ConditionDef {
            id: "c1".to_string(),
            type_id: "compare".to_string(),
            config: config(json!({"right": "ON"})),
            inputs: [("input".to_string(), "a1.result".to_string())].into(),
        });

        let err = resolve_rule(&rule, &registry(), &services).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConnection { .. }));
    }

    #[test]
    fn test_action_may_not_consume_later_action_output() {
        let (services, _invoker) = services();
        let mut rule = base_rule();
        rule.actions.push(ActionDef {
            id: "a1".to_string(),
            type_id: "item_command".to_string(),
            config: config(json!({"item_name": "x", "command": "ON"})),
            inputs: [("input".to_string(), "a2.result".to_string())].into(),
        });
        rule.actions.push(ActionDef {
            id: "a2".to_string(),
            type_id: "item_command".to_string(),
            config: config(json!({"item_name": "y", "command": "ON"})),
            inputs: Default::default(),
        });

        let err = resolve_rule(&rule, &registry(), &services).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConnection { .. }));
    }

    #[test]
    fn test_config_reference_captured_as_literal() {
        let (services, _invoker) = services();
        let mut rule = base_rule();
        rule.conditions.push(ConditionDef {
            id: "c1".to_string(),
            type_id: "compare".to_string(),
            config: config(json!({"right": "21"})),
            inputs: [("input".to_string(), "$threshold".to_string())].into(),
        });

        let resolved = resolve_rule(&rule, &registry(), &services).unwrap();
        let inputs = collect_inputs(&resolved.conditions[0].inputs, &[]);
        assert_eq!(inputs["input"], "21");
    }

    #[test]
    fn test_missing_config_reference_rejected() {
        let (services, _invoker) = services();
        let mut rule = base_rule();
        rule.conditions.push(ConditionDef {
            id: "c1".to_string(),
            type_id: "compare".to_string(),
            config: config(json!({"right": "21"})),
            inputs: [("input".to_string(), "$absent".to_string())].into(),
        });

        let err = resolve_rule(&rule, &registry(), &services).unwrap_err();
        assert!(matches!(err, ConfigError::MissingParameter(name) if name == "absent"));
    }

    #[test]
    fn test_unknown_handler_type() {
        let (services, _invoker) = services();
        let mut rule = base_rule();
        rule.triggers[0].type_id = "no_such_trigger".to_string();

        let err = resolve_rule(&rule, &registry(), &services).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownType(_)));
    }
}
