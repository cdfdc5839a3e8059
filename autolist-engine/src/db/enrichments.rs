//! Enrichment entry persistence
//!
//! Each track's entries are stored as one list under `enrichment:<track_id>`.
//! Lists only grow; insertion order is the merge order.

use autolist_common::kv::{read_or_default, write_json, KvStore};
use autolist_common::{Error, Result, ValidationError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::models::EnrichmentEntry;
use crate::rules::{build_view, TrackView};

/// Key prefix of per-track enrichment lists
pub const ENRICHMENT_KEY_PREFIX: &str = "enrichment:";

fn enrichment_key(track_id: &str) -> String {
    format!("{ENRICHMENT_KEY_PREFIX}{track_id}")
}

pub struct EnrichmentStore {
    kv: Arc<dyn KvStore>,
    append_lock: Mutex<()>,
}

impl EnrichmentStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            append_lock: Mutex::new(()),
        }
    }

    /// Append one entry to the end of a track's list
    pub async fn append(&self, track_id: &str, entry: EnrichmentEntry) -> Result<Vec<EnrichmentEntry>> {
        if track_id.trim().is_empty() {
            return Err(Error::Validation(ValidationError::single(
                "track_id",
                "track id must not be empty",
            )));
        }

        let _guard = self.append_lock.lock().await;
        let key = enrichment_key(track_id);
        let mut raw: Vec<Value> = read_or_default(self.kv.as_ref(), &key, Vec::new()).await?;
        raw.push(serde_json::to_value(&entry)?);
        write_json(self.kv.as_ref(), &key, &raw).await?;

        debug!(track_id, source = %entry.source, count = raw.len(), "Enrichment appended");
        Ok(parse_entries(track_id, raw))
    }

    /// Entries for one track in insertion order (empty when none)
    pub async fn entries(&self, track_id: &str) -> Result<Vec<EnrichmentEntry>> {
        let raw: Vec<Value> =
            read_or_default(self.kv.as_ref(), &enrichment_key(track_id), Vec::new()).await?;
        Ok(parse_entries(track_id, raw))
    }

    /// Every stored track's entries, keyed by track id
    pub async fn all(&self) -> Result<BTreeMap<String, Vec<EnrichmentEntry>>> {
        let mut all = BTreeMap::new();
        for (key, raw) in self.kv.scan_prefix(ENRICHMENT_KEY_PREFIX).await? {
            let Some(track_id) = key.strip_prefix(ENRICHMENT_KEY_PREFIX) else {
                continue;
            };
            match serde_json::from_str::<Vec<Value>>(&raw) {
                Ok(values) => {
                    all.insert(track_id.to_string(), parse_entries(track_id, values));
                }
                Err(e) => warn!(track_id, error = %e, "Skipping unreadable enrichment list"),
            }
        }
        Ok(all)
    }

    /// Merged view per requested track, in the order given
    pub async fn views(&self, track_ids: &[String]) -> Result<Vec<TrackView>> {
        let mut views = Vec::with_capacity(track_ids.len());
        for track_id in track_ids {
            let entries = self.entries(track_id).await?;
            views.push(TrackView::new(track_id.clone(), build_view(&entries)));
        }
        Ok(views)
    }
}

fn parse_entries(track_id: &str, raw: Vec<Value>) -> Vec<EnrichmentEntry> {
    raw.into_iter()
        .filter_map(|value| match serde_json::from_value::<EnrichmentEntry>(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(track_id, error = %e, "Skipping malformed enrichment entry");
                None
            }
        })
        .collect()
}
