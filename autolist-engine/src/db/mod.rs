//! Stores built on the durable key-value contract
//!
//! All three stores share one [`KvStore`](autolist_common::kv::KvStore)
//! and partition it by key prefix.

pub mod enrichments;
pub mod jobs;
pub mod rule_sets;

pub use enrichments::EnrichmentStore;
pub use jobs::{JobStore, INTERRUPTED_MESSAGE};
pub use rule_sets::RuleSetStore;
