//! Rule lifecycle status types
//!
//! A rule moves through an ordered lifecycle: UNINITIALIZED until its
//! handlers resolve, then IDLE, TRIGGERED while conditions are checked,
//! RUNNING while actions execute, and DISABLED when taken out of service.
//! Every transition is published on the event bus as a RuleStatusInfo.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    /// Added but not runnable (handler or configuration problem)
    Uninitialized,

    /// Taken out of service; ignores all triggers
    Disabled,

    /// Waiting for a matching trigger
    Idle,

    /// A trigger matched; conditions are being evaluated
    Triggered,

    /// Conditions passed; actions are executing
    Running,
}

impl RuleStatus {
    /// Whether an evaluation pass is in flight
    pub fn is_active(&self) -> bool {
        matches!(self, RuleStatus::Triggered | RuleStatus::Running)
    }
}

impl std::fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RuleStatus::Uninitialized => "uninitialized",
            RuleStatus::Disabled => "disabled",
            RuleStatus::Idle => "idle",
            RuleStatus::Triggered => "triggered",
            RuleStatus::Running => "running",
        };
        write!(f, "{}", s)
    }
}

/// Additional detail qualifying a status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatusDetail {
    /// A referenced handler type is not registered
    HandlerMissingError,

    /// The rule or module configuration failed validation
    ConfigurationError,

    /// The rule was disabled explicitly
    Disabled,
}

/// Immutable status snapshot published on every transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleStatusInfo {
    /// Current lifecycle status
    pub status: RuleStatus,

    /// Optional qualifying detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<RuleStatusDetail>,

    /// Optional human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RuleStatusInfo {
    /// Create a status info with no detail
    pub fn new(status: RuleStatus) -> Self {
        Self {
            status,
            detail: None,
            message: None,
        }
    }

    /// Attach a detail
    pub fn with_detail(mut self, detail: RuleStatusDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Attach a human-readable message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl std::fmt::Display for RuleStatusInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.status)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({:?})", detail)?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_states() {
        assert!(RuleStatus::Triggered.is_active());
        assert!(RuleStatus::Running.is_active());
        assert!(!RuleStatus::Idle.is_active());
        assert!(!RuleStatus::Disabled.is_active());
        assert!(!RuleStatus::Uninitialized.is_active());
    }

    #[test]
    fn test_serde_snake_case() {
        let info = RuleStatusInfo::new(RuleStatus::Uninitialized)
            .with_detail(RuleStatusDetail::HandlerMissingError);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["status"], "uninitialized");
        assert_eq!(json["detail"], "handler_missing_error");
    }
}
