//! Enrichment entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One timestamped annotation record for a track from a single provider
///
/// Append-only: entries are never mutated once stored. `categories` is kept
/// as raw JSON so a malformed (non-object) value can be carried and ignored
/// at merge time instead of rejected at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentEntry {
    /// Logical provider name, e.g. "external_features" or "manual"
    pub source: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    pub timestamp: DateTime<Utc>,

    /// Flat field → scalar/collection mapping
    #[serde(default)]
    pub categories: Value,
}

impl EnrichmentEntry {
    pub fn new(source: impl Into<String>, categories: Value) -> Self {
        Self {
            source: source.into(),
            version: None,
            timestamp: Utc::now(),
            categories,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}
