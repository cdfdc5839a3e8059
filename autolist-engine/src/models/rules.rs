//! Rule DSL: conditions, flat groups and named rule sets
//!
//! Operators are open enums: unrecognized names survive a load/save round
//! trip as `Unknown(..)` and evaluate to `false`.

use autolist_common::{Error, Result, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Comparison applied by a single condition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    NotIn,
    /// Operator name this build does not know
    Unknown(String),
}

impl ConditionOperator {
    pub fn as_str(&self) -> &str {
        match self {
            ConditionOperator::Eq => "eq",
            ConditionOperator::Ne => "ne",
            ConditionOperator::Gt => "gt",
            ConditionOperator::Lt => "lt",
            ConditionOperator::Gte => "gte",
            ConditionOperator::Lte => "lte",
            ConditionOperator::In => "in",
            ConditionOperator::NotIn => "not_in",
            ConditionOperator::Unknown(name) => name,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ConditionOperator::Gt
                | ConditionOperator::Lt
                | ConditionOperator::Gte
                | ConditionOperator::Lte
        )
    }

    pub fn is_membership(&self) -> bool {
        matches!(self, ConditionOperator::In | ConditionOperator::NotIn)
    }
}

impl From<String> for ConditionOperator {
    fn from(name: String) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "eq" => ConditionOperator::Eq,
            "ne" => ConditionOperator::Ne,
            "gt" => ConditionOperator::Gt,
            "lt" => ConditionOperator::Lt,
            "gte" => ConditionOperator::Gte,
            "lte" => ConditionOperator::Lte,
            "in" => ConditionOperator::In,
            "not_in" => ConditionOperator::NotIn,
            _ => ConditionOperator::Unknown(name),
        }
    }
}

impl From<ConditionOperator> for String {
    fn from(op: ConditionOperator) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a group combines its conditions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
    Unknown(String),
}

impl LogicalOperator {
    pub fn as_str(&self) -> &str {
        match self {
            LogicalOperator::And => "and",
            LogicalOperator::Or => "or",
            LogicalOperator::Unknown(name) => name,
        }
    }
}

impl From<String> for LogicalOperator {
    fn from(name: String) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "and" => LogicalOperator::And,
            "or" => LogicalOperator::Or,
            _ => LogicalOperator::Unknown(name),
        }
    }
}

impl From<LogicalOperator> for String {
    fn from(op: LogicalOperator) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `field <operator> value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    /// Key into a merged enrichment view
    pub field: String,
    pub operator: ConditionOperator,
    /// Scalar or list, depending on the operator
    #[serde(default)]
    pub value: Value,
}

impl RuleCondition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }
}

/// Flat boolean combination of conditions (no nesting)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    #[serde(default)]
    pub operator: LogicalOperator,
    pub conditions: Vec<RuleCondition>,
}

impl RuleGroup {
    pub fn new(operator: LogicalOperator, conditions: Vec<RuleCondition>) -> Self {
        Self {
            operator,
            conditions,
        }
    }

    pub fn all(conditions: Vec<RuleCondition>) -> Self {
        Self::new(LogicalOperator::And, conditions)
    }

    pub fn any(conditions: Vec<RuleCondition>) -> Self {
        Self::new(LogicalOperator::Or, conditions)
    }

    /// Parse a group from untrusted JSON, reporting shape errors as validation failures
    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::Validation(ValidationError::single("rules", e.to_string())))
    }
}

/// Named, enable-flagged rule policy
///
/// Identity is `id`; upserting by id overwrites the whole object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub id: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Label of the playlist this rule set feeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_label: Option<String>,

    /// Root condition group
    pub rules: RuleGroup,
}

fn default_enabled() -> bool {
    true
}

impl RuleSet {
    pub fn new(id: impl Into<String>, name: impl Into<String>, rules: RuleGroup) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            enabled: true,
            target_label: None,
            rules,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Parse a rule set from untrusted JSON, reporting shape errors as validation failures
    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::Validation(ValidationError::single("rule_set", e.to_string())))
    }
}
