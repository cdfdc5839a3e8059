//! Rule engine: enrichment merging, fail-closed evaluation and validation

pub mod evaluator;
pub mod merger;
pub mod validation;

pub use evaluator::{evaluate_condition, evaluate_group};
pub use merger::{build_view, values_equal, EnrichmentView, FieldValue, TrackView};
pub use validation::{validate_rule_group, validate_rule_set, ValidationReport};
