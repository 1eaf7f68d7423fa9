//! Configuration parameter schemas
//!
//! Rules and module handlers can declare parameter descriptors. Validation
//! substitutes defaults for absent optional parameters and rejects a
//! configuration that is missing a required parameter or carries a value
//! of the wrong type. This happens at add/enable time, never during an
//! evaluation pass.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::module::ConfigMap;

/// Configuration errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Parameter '{name}' is not a valid {expected:?}")]
    InvalidParameterType { name: String, expected: ParameterType },

    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    #[error("No handler registered for type: {0}")]
    UnknownType(String),

    #[error("Duplicate module id: {0}")]
    DuplicateModuleId(String),

    #[error("Invalid connection on module '{module}' input '{input}': {message}")]
    InvalidConnection {
        module: String,
        input: String,
        message: String,
    },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Declared type of a configuration parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    Text,
    Integer,
    Decimal,
    Boolean,
}

fn default_type() -> ParameterType {
    ParameterType::Text
}

/// Descriptor for one configuration parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigParameter {
    /// Parameter name
    pub name: String,

    /// Declared type
    #[serde(rename = "type", default = "default_type")]
    pub kind: ParameterType,

    /// Whether the parameter must be present (after default substitution)
    #[serde(default)]
    pub required: bool,

    /// Default substituted when the parameter is absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl ConfigParameter {
    fn accepts(&self, value: &serde_json::Value) -> bool {
        match self.kind {
            ParameterType::Text => value.is_string(),
            ParameterType::Integer => value.as_i64().is_some(),
            ParameterType::Decimal => value.is_number(),
            ParameterType::Boolean => value.is_boolean(),
        }
    }
}

/// Validate a configuration against its parameter descriptors
///
/// Substitutes defaults in place. A missing required parameter with no
/// default, or a present value of the wrong type, is an error.
pub fn validate_config(parameters: &[ConfigParameter], config: &mut ConfigMap) -> ConfigResult<()> {
    for parameter in parameters {
        match config.get(&parameter.name) {
            Some(value) => {
                if !parameter.accepts(value) {
                    return Err(ConfigError::InvalidParameterType {
                        name: parameter.name.clone(),
                        expected: parameter.kind,
                    });
                }
            }
            None => {
                if let Some(default) = &parameter.default {
                    config.insert(parameter.name.clone(), default.clone());
                } else if parameter.required {
                    return Err(ConfigError::MissingParameter(parameter.name.clone()));
                }
            }
        }
    }
    Ok(())
}

// --- Accessors used by handler factories ---

/// A required string parameter
pub fn required_str(config: &ConfigMap, key: &str) -> ConfigResult<String> {
    match config.get(key) {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ConfigError::InvalidParameterType {
            name: key.to_string(),
            expected: ParameterType::Text,
        }),
        None => Err(ConfigError::MissingParameter(key.to_string())),
    }
}

/// An optional string parameter
pub fn optional_str(config: &ConfigMap, key: &str) -> ConfigResult<Option<String>> {
    match config.get(key) {
        Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ConfigError::InvalidParameterType {
            name: key.to_string(),
            expected: ParameterType::Text,
        }),
        None => Ok(None),
    }
}

/// A required boolean parameter
pub fn required_bool(config: &ConfigMap, key: &str) -> ConfigResult<bool> {
    match config.get(key) {
        Some(serde_json::Value::Bool(b)) => Ok(*b),
        Some(_) => Err(ConfigError::InvalidParameterType {
            name: key.to_string(),
            expected: ParameterType::Boolean,
        }),
        None => Err(ConfigError::MissingParameter(key.to_string())),
    }
}

/// A string-list parameter: a JSON array of strings, or one
/// comma-separated string. Absent means empty.
pub fn str_list(config: &ConfigMap, key: &str) -> ConfigResult<Vec<String>> {
    match config.get(key) {
        None => Ok(Vec::new()),
        Some(serde_json::Value::String(s)) => Ok(s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect()),
        Some(serde_json::Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    serde_json::Value::String(s) => out.push(s.clone()),
                    _ => {
                        return Err(ConfigError::InvalidParameter {
                            name: key.to_string(),
                            message: "expected a list of strings".to_string(),
                        })
                    }
                }
            }
            Ok(out)
        }
        Some(_) => Err(ConfigError::InvalidParameter {
            name: key.to_string(),
            message: "expected a string or a list of strings".to_string(),
        }),
    }
}
