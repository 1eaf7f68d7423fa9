//! Rule definition
//!
//! A rule bundles trigger, condition, and action modules with rule-level
//! configuration. The definition is pure data; resolution against the
//! handler registry and the runtime state machine live in the engine.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::config::ConfigParameter;
use crate::module::{ActionDef, ConditionDef, ConfigMap, TriggerDef};

fn default_enabled() -> bool {
    true
}

/// A rule as submitted by a caller
///
/// The `on` / `if` / `then` aliases match the shorthand form used in
/// hand-written rule files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Unique rule id; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Organizational tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Trigger modules
    #[serde(default, alias = "on")]
    pub triggers: Vec<TriggerDef>,

    /// Condition modules
    #[serde(default, alias = "if")]
    pub conditions: Vec<ConditionDef>,

    /// Action modules
    #[serde(default, alias = "then")]
    pub actions: Vec<ActionDef>,

    /// Rule-level configuration, referenced from modules as `$param`
    #[serde(default)]
    pub config: ConfigMap,

    /// Parameter descriptors for `config`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_descriptions: Vec<ConfigParameter>,

    /// Whether the rule starts enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// A stored rule with its assigned uid
#[derive(Debug, Clone, Serialize)]
pub struct Rule {
    /// Unique rule id
    pub uid: String,

    /// Display name
    pub name: Option<String>,

    /// Free-form description
    pub description: Option<String>,

    /// Organizational tags
    pub tags: Vec<String>,

    /// Trigger modules
    pub triggers: Vec<TriggerDef>,

    /// Condition modules
    pub conditions: Vec<ConditionDef>,

    /// Action modules
    pub actions: Vec<ActionDef>,

    /// Rule-level configuration
    pub config: ConfigMap,

    /// Parameter descriptors for `config`
    pub config_descriptions: Vec<ConfigParameter>,

    /// Whether the rule is enabled
    pub enabled: bool,
}

impl Rule {
    /// Build a rule from its config, assigning a ULID uid when absent
    pub fn from_config(config: RuleConfig) -> Self {
        let uid = config
            .uid
            .unwrap_or_else(|| Ulid::new().to_string().to_lowercase());

        Self {
            uid,
            name: config.name,
            description: config.description,
            tags: config.tags,
            triggers: config.triggers,
            conditions: config.conditions,
            actions: config.actions,
            config: config.config,
            config_descriptions: config.config_descriptions,
            enabled: config.enabled,
        }
    }

    /// Name for log output: the display name, or the uid
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.uid)
    }
}
