//! Structural checks for rule definitions
//!
//! Errors block an upsert. Warnings describe rules that are well-formed but
//! can never match as written (they still evaluate, to `false`).

use autolist_common::{Error, Result, ValidationError, ValidationIssue};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{ConditionOperator, LogicalOperator, RuleGroup, RuleSet};

/// Outcome of validating a rule group or rule set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn from_issues(errors: Vec<ValidationIssue>, warnings: Vec<ValidationIssue>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Convert structural errors into [`Error::Validation`]; warnings are dropped
    pub fn into_result(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(ValidationError::new(self.errors)))
        }
    }
}

/// Validate a rule group, reporting paths under `rules`
pub fn validate_rule_group(group: &RuleGroup) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    check_group(group, "rules", &mut errors, &mut warnings);
    ValidationReport::from_issues(errors, warnings)
}

/// Validate a whole rule set: identity fields plus its root group
pub fn validate_rule_set(rule_set: &RuleSet) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if rule_set.id.trim().is_empty() {
        errors.push(ValidationIssue::new("id", "rule set id must not be empty"));
    }
    if rule_set.name.trim().is_empty() {
        errors.push(ValidationIssue::new("name", "rule set name must not be empty"));
    }
    check_group(&rule_set.rules, "rules", &mut errors, &mut warnings);

    ValidationReport::from_issues(errors, warnings)
}

fn check_group(
    group: &RuleGroup,
    prefix: &str,
    errors: &mut Vec<ValidationIssue>,
    warnings: &mut Vec<ValidationIssue>,
) {
    if let LogicalOperator::Unknown(name) = &group.operator {
        warnings.push(ValidationIssue::new(
            format!("{prefix}.operator"),
            format!("unknown logical operator '{name}'; group never matches"),
        ));
    }

    for (i, condition) in group.conditions.iter().enumerate() {
        let path = format!("{prefix}.conditions[{i}]");

        if condition.field.trim().is_empty() {
            errors.push(ValidationIssue::new(
                format!("{path}.field"),
                "field must not be empty",
            ));
        }

        match &condition.operator {
            ConditionOperator::Unknown(name) => warnings.push(ValidationIssue::new(
                format!("{path}.operator"),
                format!("unknown operator '{name}'; condition never matches"),
            )),
            op if op.is_numeric() && !condition.value.is_number() => {
                warnings.push(ValidationIssue::new(
                    format!("{path}.value"),
                    format!("'{op}' compares numbers but value is not a number"),
                ))
            }
            op if op.is_membership() && !matches!(condition.value, Value::Array(_)) => {
                warnings.push(ValidationIssue::new(
                    format!("{path}.value"),
                    format!("'{op}' needs a list value; condition never matches"),
                ))
            }
            _ => {}
        }
    }
}
