//! Module model
//!
//! A module is a named, typed, configured unit inside a rule: a trigger,
//! a condition, or an action. Conditions and actions additionally declare
//! inputs wired to a producing module's output ("moduleId.outputName") or
//! to a rule-level config parameter ("$param"). References are parsed
//! once at rule activation, never on the evaluation path.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Configuration map of a module or rule
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

/// Module reference errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    #[error("Invalid input reference '{0}': expected 'moduleId.outputName' or '$configParam'")]
    InvalidReference(String),
}

/// A trigger module definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerDef {
    /// Module id, unique within the rule
    pub id: String,

    /// Handler type id, resolved against the handler registry
    #[serde(rename = "type")]
    pub type_id: String,

    /// Handler configuration
    #[serde(default)]
    pub config: ConfigMap,
}

/// A condition module definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionDef {
    /// Module id, unique within the rule
    pub id: String,

    /// Handler type id
    #[serde(rename = "type")]
    pub type_id: String,

    /// Handler configuration
    #[serde(default)]
    pub config: ConfigMap,

    /// Input name -> "moduleId.outputName" or "$configParam"
    #[serde(default)]
    pub inputs: HashMap<String, String>,
}

/// An action module definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDef {
    /// Module id, unique within the rule
    pub id: String,

    /// Handler type id
    #[serde(rename = "type")]
    pub type_id: String,

    /// Handler configuration
    #[serde(default)]
    pub config: ConfigMap,

    /// Input name -> "moduleId.outputName" or "$configParam"
    #[serde(default)]
    pub inputs: HashMap<String, String>,
}

/// Where a wired input takes its value from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Another module's named output
    Output { module_id: String, output: String },

    /// A rule-level configuration parameter
    Config(String),
}

/// A parsed input wiring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// The consuming module's input name
    pub input: String,

    /// Value source
    pub source: InputSource,
}

impl Connection {
    /// Parse an input reference string
    pub fn parse(input: &str, reference: &str) -> Result<Self, ModuleError> {
        if let Some(param) = reference.strip_prefix('$') {
            if param.is_empty() {
                return Err(ModuleError::InvalidReference(reference.to_string()));
            }
            return Ok(Self {
                input: input.to_string(),
                source: InputSource::Config(param.to_string()),
            });
        }

        match reference.split_once('.') {
            Some((module_id, output)) if !module_id.is_empty() && !output.is_empty() => Ok(Self {
                input: input.to_string(),
                source: InputSource::Output {
                    module_id: module_id.to_string(),
                    output: output.to_string(),
                },
            }),
            _ => Err(ModuleError::InvalidReference(reference.to_string())),
        }
    }
}
