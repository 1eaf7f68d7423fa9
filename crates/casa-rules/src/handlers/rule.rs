//! Cross-rule actions: run other rules, enable or disable them
//!
//! These compose scenes: a scene rule's actions command several items,
//! and other rules invoke it with `run_rule`. The engine reference is
//! weak; an action outliving its engine reports `EngineGone`.

use async_trait::async_trait;
use casa_core::Context;
use std::sync::Weak;
use tracing::warn;

use crate::config::{required_bool, str_list, ConfigError, ConfigResult};
use crate::handler::{ActionError, ActionHandler, Inputs, Outputs, RuleInvoker};
use crate::module::ConfigMap;

fn rule_uids(config: &ConfigMap) -> ConfigResult<Vec<String>> {
    let uids = str_list(config, "rule_uids")?;
    if uids.is_empty() {
        return Err(ConfigError::MissingParameter("rule_uids".to_string()));
    }
    Ok(uids)
}

/// Requests evaluation passes of other rules
pub struct RunRuleAction {
    rule_uids: Vec<String>,
    rules: Weak<dyn RuleInvoker>,
}

impl RunRuleAction {
    pub fn from_config(config: &ConfigMap, rules: Weak<dyn RuleInvoker>) -> ConfigResult<Self> {
        Ok(Self {
            rule_uids: rule_uids(config)?,
            rules,
        })
    }
}

#[async_trait]
impl ActionHandler for RunRuleAction {
    async fn execute(&self, _inputs: &Inputs, context: &Context) -> Result<Outputs, ActionError> {
        let rules = self.rules.upgrade().ok_or(ActionError::EngineGone)?;
        for uid in &self.rule_uids {
            rules.run_rule(uid, context);
        }
        Ok(Outputs::new())
    }
}

/// Enables or disables other rules
pub struct RuleEnablementAction {
    enable: bool,
    rule_uids: Vec<String>,
    rules: Weak<dyn RuleInvoker>,
}

impl RuleEnablementAction {
    pub fn from_config(config: &ConfigMap, rules: Weak<dyn RuleInvoker>) -> ConfigResult<Self> {
        Ok(Self {
            enable: required_bool(config, "enable")?,
            rule_uids: rule_uids(config)?,
            rules,
        })
    }
}

#[async_trait]
impl ActionHandler for RuleEnablementAction {
    async fn execute(&self, _inputs: &Inputs, context: &Context) -> Result<Outputs, ActionError> {
        let _ = context;
        let rules = self.rules.upgrade().ok_or(ActionError::EngineGone)?;
        for uid in &self.rule_uids {
            if !rules.set_rule_enabled(uid, self.enable) {
                warn!(rule = %uid, "Enablement target does not exist");
            }
        }
        Ok(Outputs::new())
    }
}
