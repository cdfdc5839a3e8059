//! Data models for autolist-engine
//!
//! - Tracks and the sources they are fetched from
//! - Enrichment entries (per-track annotation records)
//! - Rule DSL: conditions, groups, named rule sets
//! - Persisted jobs and their four-state lifecycle

pub mod enrichment;
pub mod job;
pub mod rules;
pub mod track;

pub use enrichment::EnrichmentEntry;
pub use job::{FetchPayload, Job, JobStatus, FETCH_TRACKS_STEP};
pub use rules::{ConditionOperator, LogicalOperator, RuleCondition, RuleGroup, RuleSet};
pub use track::{Track, TrackSource, TrackSourceType};
