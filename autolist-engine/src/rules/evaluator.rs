//! Rule evaluator
//!
//! Pure and total: every condition and group, however malformed, maps to a
//! boolean. Unsupported input evaluates to `false`, so a bad rule excludes
//! tracks instead of aborting a whole batch.

use serde_json::Value;
use std::cmp::Ordering;

use super::merger::{EnrichmentView, FieldValue};
use crate::models::{ConditionOperator, LogicalOperator, RuleCondition, RuleGroup};

/// Evaluate a single condition against a merged view
pub fn evaluate_condition(view: &EnrichmentView, condition: &RuleCondition) -> bool {
    let left = view.lookup(&condition.field);
    let right = FieldValue::from_value(&condition.value);

    match &condition.operator {
        ConditionOperator::Eq => left.structurally_eq(&right),
        ConditionOperator::Ne => !left.structurally_eq(&right),
        ConditionOperator::Gt => compare_numbers(left, right, |o| o == Ordering::Greater),
        ConditionOperator::Lt => compare_numbers(left, right, |o| o == Ordering::Less),
        ConditionOperator::Gte => compare_numbers(left, right, |o| o != Ordering::Less),
        ConditionOperator::Lte => compare_numbers(left, right, |o| o != Ordering::Greater),
        ConditionOperator::In => match &condition.value {
            Value::Array(items) => contains(left, items),
            _ => false,
        },
        ConditionOperator::NotIn => match &condition.value {
            Value::Array(items) => !contains(left, items),
            _ => false,
        },
        ConditionOperator::Unknown(name) => {
            tracing::trace!(operator = %name, field = %condition.field, "Unknown condition operator");
            false
        }
    }
}

/// Evaluate a flat group: AND over no conditions is true, OR over none is false
pub fn evaluate_group(view: &EnrichmentView, group: &RuleGroup) -> bool {
    match &group.operator {
        LogicalOperator::And => group
            .conditions
            .iter()
            .all(|c| evaluate_condition(view, c)),
        LogicalOperator::Or => group
            .conditions
            .iter()
            .any(|c| evaluate_condition(view, c)),
        LogicalOperator::Unknown(name) => {
            tracing::trace!(operator = %name, "Unknown logical operator");
            false
        }
    }
}

fn compare_numbers<F>(left: FieldValue<'_>, right: FieldValue<'_>, accept: F) -> bool
where
    F: Fn(Ordering) -> bool,
{
    match (left.as_number(), right.as_number()) {
        (Some(l), Some(r)) => l.partial_cmp(&r).is_some_and(accept),
        _ => false,
    }
}

fn contains(needle: FieldValue<'_>, haystack: &[Value]) -> bool {
    haystack
        .iter()
        .any(|item| needle.structurally_eq(&FieldValue::from_value(item)))
}
