//! Playlist previews
//!
//! Applies every enabled rule set to precomputed per-track enrichment views.
//! Merging happens before this point; the builder only evaluates.

use serde::{Deserialize, Serialize};

use crate::models::RuleSet;
use crate::rules::{evaluate_group, TrackView};

/// Tracks matched by one rule set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    pub rule_id: String,
    pub rule_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_label: Option<String>,
    /// Matching track ids in input order
    pub track_ids: Vec<String>,
    pub track_count: usize,
}

/// One preview per enabled rule set, in rule set order
///
/// Disabled rule sets produce no record. A track given with an empty view
/// is evaluated with every field missing.
pub fn build_previews(rule_sets: &[RuleSet], tracks: &[TrackView]) -> Vec<Preview> {
    rule_sets
        .iter()
        .filter(|rule_set| rule_set.enabled)
        .map(|rule_set| {
            let track_ids: Vec<String> = tracks
                .iter()
                .filter(|track| evaluate_group(&track.enrichment_view, &rule_set.rules))
                .map(|track| track.track_id.clone())
                .collect();
            Preview {
                rule_id: rule_set.id.clone(),
                rule_name: rule_set.name.clone(),
                target_label: rule_set.target_label.clone(),
                track_count: track_ids.len(),
                track_ids,
            }
        })
        .collect()
}
