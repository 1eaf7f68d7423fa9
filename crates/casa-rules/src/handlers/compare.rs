//! The generic compare condition
//!
//! Compares the wired `input` against a configured `right` literal under
//! one of `=`, `<`, `<=`, or `matches`. Both sides are coerced through the
//! canonical `Value` form, so `"21"` equals `21`. Ordering tries an exact
//! integer comparison first and falls back to floats; operands that are
//! not numeric under either reading are simply not satisfied.

use casa_core::Value;
use regex::Regex;
use tracing::trace;

use crate::config::{optional_str, required_str, ConfigError, ConfigResult};
use crate::handler::{ConditionHandler, Inputs};
use crate::module::ConfigMap;

enum Operator {
    Eq,
    Lt,
    Le,
    Matches(Regex),
}

pub struct CompareCondition {
    right: String,
    operator: Operator,
    input_property: Option<String>,
}

impl CompareCondition {
    pub fn from_config(config: &ConfigMap) -> ConfigResult<Self> {
        let right = required_str(config, "right")?;
        let operator = optional_str(config, "operator")?.unwrap_or_else(|| "=".to_string());
        let input_property = optional_str(config, "inputproperty")?;

        let operator = match operator.as_str() {
            "=" => Operator::Eq,
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            // The whole input must match, so the pattern is anchored.
            "matches" => {
                let regex = Regex::new(&format!(r"\A(?:{})\z", right)).map_err(|err| {
                    ConfigError::InvalidParameter {
                        name: "right".to_string(),
                        message: format!("invalid regex: {}", err),
                    }
                })?;
                Operator::Matches(regex)
            }
            other => {
                return Err(ConfigError::InvalidParameter {
                    name: "operator".to_string(),
                    message: format!("unsupported operator '{}'", other),
                })
            }
        };

        Ok(Self {
            right,
            operator,
            input_property,
        })
    }

    /// The effective left operand: the input, optionally narrowed to a
    /// property, with JSON null treated as absent.
    ///
    /// Returns `Err(())` when the input is present but the configured
    /// property is missing, which fails the condition outright.
    fn left<'a>(&self, inputs: &'a Inputs) -> Result<Option<&'a serde_json::Value>, ()> {
        let mut value = inputs.get("input");
        if let Some(property) = &self.input_property {
            if let Some(present) = value {
                value = Some(present.get(property).ok_or(())?);
            }
        }
        Ok(value.filter(|v| !v.is_null()))
    }
}

impl ConditionHandler for CompareCondition {
    fn is_satisfied(&self, inputs: &Inputs) -> bool {
        let left = match self.left(inputs) {
            Ok(left) => left,
            Err(()) => {
                trace!(property = ?self.input_property, "Input property missing");
                return false;
            }
        };

        match &self.operator {
            Operator::Eq => match left {
                // The literal "null" matches an absent input, and only
                // an absent input; the string "null" is not it.
                None => self.right == "null",
                Some(value) => {
                    self.right != "null" && Value::from_json(value).canonical() == self.right
                }
            },
            Operator::Lt | Operator::Le => {
                let Some(value) = left else { return false };
                let left = Value::from_json(value);
                let right = Value::parse(&self.right);
                let inclusive = matches!(self.operator, Operator::Le);

                if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
                    if inclusive { a <= b } else { a < b }
                } else if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
                    if inclusive { a <= b } else { a < b }
                } else {
                    false
                }
            }
            Operator::Matches(regex) => match left {
                None => false,
                Some(value) => regex.is_match(&Value::from_json(value).canonical()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn condition(config: serde_json::Value) -> CompareCondition {
        let config = config.as_object().cloned().unwrap_or_default();
        CompareCondition::from_config(&config).unwrap()
    }

    fn inputs(value: serde_json::Value) -> Inputs {
        [("input".to_string(), value)].into()
    }

    #[test]
    fn test_equality_coerces_types() {
        let c = condition(json!({"right": "21"}));
        assert!(c.is_satisfied(&inputs(json!(21))));
        assert!(c.is_satisfied(&inputs(json!("21"))));
        assert!(!c.is_satisfied(&inputs(json!(20))));

        let c = condition(json!({"right": "ON"}));
        assert!(c.is_satisfied(&inputs(json!("ON"))));
        assert!(!c.is_satisfied(&inputs(json!("OFF"))));
    }

    #[test]
    fn test_null_literal_matches_absent() {
        let c = condition(json!({"right": "null"}));
        assert!(c.is_satisfied(&Inputs::new()));
        assert!(c.is_satisfied(&inputs(json!(null))));
        assert!(!c.is_satisfied(&inputs(json!("ON"))));
        // The string "null" is a present value, not an absent one.
        assert!(!c.is_satisfied(&inputs(json!("null"))));
    }

    #[test]
    fn test_ordering_integer_path() {
        let c = condition(json!({"operator": "<", "right": "21"}));
        assert!(c.is_satisfied(&inputs(json!(20))));
        assert!(!c.is_satisfied(&inputs(json!(21))));
        assert!(c.is_satisfied(&inputs(json!("20"))));

        let c = condition(json!({"operator": "<=", "right": "21"}));
        assert!(c.is_satisfied(&inputs(json!(21))));
        assert!(!c.is_satisfied(&inputs(json!(22))));
    }

    #[test]
    fn test_ordering_float_fallback() {
        let c = condition(json!({"operator": "<", "right": "21"}));
        assert!(c.is_satisfied(&inputs(json!(20.9))));
        assert!(!c.is_satisfied(&inputs(json!(21.0))));
    }

    #[test]
    fn test_ordering_non_numeric_not_satisfied() {
        let c = condition(json!({"operator": "<", "right": "21"}));
        assert!(!c.is_satisfied(&inputs(json!("ON"))));
        assert!(!c.is_satisfied(&Inputs::new()));

        let c = condition(json!({"operator": "<", "right": "banana"}));
        assert!(!c.is_satisfied(&inputs(json!(20))));
    }

    #[test]
    fn test_matches_is_anchored() {
        let c = condition(json!({"operator": "matches", "right": "ON|OFF"}));
        assert!(c.is_satisfied(&inputs(json!("ON"))));
        assert!(c.is_satisfied(&inputs(json!("OFF"))));
        assert!(!c.is_satisfied(&inputs(json!("ONLY"))));
        assert!(!c.is_satisfied(&Inputs::new()));
    }

    #[test]
    fn test_invalid_regex_rejected_at_config_time() {
        let config = json!({"operator": "matches", "right": "("})
            .as_object()
            .cloned()
            .unwrap_or_default();
        assert!(CompareCondition::from_config(&config).is_err());
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let config = json!({"operator": ">", "right": "21"})
            .as_object()
            .cloned()
            .unwrap_or_default();
        assert!(CompareCondition::from_config(&config).is_err());
    }

    #[test]
    fn test_input_property_navigation() {
        let c = condition(json!({"right": "21", "inputproperty": "new_state"}));
        assert!(c.is_satisfied(&inputs(json!({"new_state": 21}))));
        assert!(!c.is_satisfied(&inputs(json!({"new_state": 20}))));
        // Present input without the property fails outright.
        assert!(!c.is_satisfied(&inputs(json!({"other": 21}))));
    }
}
