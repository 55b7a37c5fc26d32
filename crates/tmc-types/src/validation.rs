//! Declarative validation rules and their results.
//!
//! Rules are evaluated by an external validation subsystem before a
//! session or decision transition is accepted; the engine treats the
//! results as an admission gate, not something it computes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The closed set of rule categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationRuleType {
    SchemaCheck,
    ResourceQuota,
    PolicyConformance,
    TransitionGuard,
}

/// Which engine event a rule fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationTrigger {
    SessionCreate,
    SessionTransition,
    WorkloadAdmission,
    DecisionTransition,
}

/// Severity attached to a rule and its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Outcome of evaluating one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    Passed,
    Failed,
    Warning,
    Skipped,
}

/// A declarative check registered with the validation subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub name: String,
    pub rule_type: ValidationRuleType,
    pub trigger: ValidationTrigger,
    /// Restrict to these namespaces; empty means all.
    pub namespace_filters: Vec<String>,
    /// Validator-specific configuration, opaque to the engine.
    pub config: HashMap<String, String>,
    pub severity: ValidationSeverity,
    pub enabled: bool,
}

/// One rule's verdict on a pending change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub rule: String,
    pub outcome: ValidationOutcome,
    pub severity: ValidationSeverity,
    pub message: String,
}

impl ValidationResult {
    /// A Failed outcome at Error or Critical severity refuses the
    /// pending change; anything else may proceed.
    pub fn is_blocking(&self) -> bool {
        self.outcome == ValidationOutcome::Failed
            && self.severity >= ValidationSeverity::Error
    }
}

/// Whether any result in the set blocks the pending change.
pub fn any_blocking(results: &[ValidationResult]) -> bool {
    results.iter().any(ValidationResult::is_blocking)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(outcome: ValidationOutcome, severity: ValidationSeverity) -> ValidationResult {
        ValidationResult {
            rule: "r".to_string(),
            outcome,
            severity,
            message: "m".to_string(),
        }
    }

    #[test]
    fn failed_error_blocks() {
        assert!(result(ValidationOutcome::Failed, ValidationSeverity::Error).is_blocking());
        assert!(result(ValidationOutcome::Failed, ValidationSeverity::Critical).is_blocking());
    }

    #[test]
    fn warnings_do_not_block() {
        assert!(!result(ValidationOutcome::Warning, ValidationSeverity::Critical).is_blocking());
        assert!(!result(ValidationOutcome::Failed, ValidationSeverity::Warning).is_blocking());
        assert!(!result(ValidationOutcome::Passed, ValidationSeverity::Critical).is_blocking());
        assert!(!result(ValidationOutcome::Skipped, ValidationSeverity::Error).is_blocking());
    }

    #[test]
    fn any_blocking_over_a_set() {
        let results = vec![
            result(ValidationOutcome::Passed, ValidationSeverity::Info),
            result(ValidationOutcome::Warning, ValidationSeverity::Warning),
        ];
        assert!(!any_blocking(&results));

        let mut with_failure = results.clone();
        with_failure.push(result(ValidationOutcome::Failed, ValidationSeverity::Error));
        assert!(any_blocking(&with_failure));
    }
}
