//! Cross-job track aggregation
//!
//! Read-only view over `fetch_tracks` jobs. Jobs are visited in
//! (`created_at`, `id`) order; a track id seen in more than one DONE job
//! keeps the record of the first job visited, so the result does not depend
//! on which fetch happened to finish first.

use autolist_common::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use crate::db::JobStore;
use crate::models::{Job, JobStatus, Track, TrackSource, FETCH_TRACKS_STEP};

/// Per-job status line of an aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<TrackSource>,
    pub label: String,
    pub status: JobStatus,
    pub progress: f64,
    /// Tracks reported by this job before deduplication (0 unless DONE)
    pub track_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Deduplicated tracks plus the state of every source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub tracks: Vec<Track>,
    pub sources: Vec<SourceSummary>,
}

impl Aggregation {
    pub fn track_ids(&self) -> Vec<String> {
        self.tracks.iter().map(|track| track.id.clone()).collect()
    }
}

/// Aggregate an arbitrary job list; ordering of the input does not matter
pub fn aggregate_jobs(jobs: &[Job]) -> Aggregation {
    let mut fetch_jobs: Vec<&Job> = jobs
        .iter()
        .filter(|job| job.step == FETCH_TRACKS_STEP)
        .collect();
    fetch_jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let mut seen = HashSet::new();
    let mut aggregation = Aggregation::default();

    for job in fetch_jobs {
        let source = job.track_source();
        let label = source
            .as_ref()
            .map_or_else(|| "Unknown source".to_string(), TrackSource::display_label);

        let tracks = if job.status == JobStatus::Done {
            payload_tracks(job)
        } else {
            Vec::new()
        };

        aggregation.sources.push(SourceSummary {
            job_id: job.id.clone(),
            source,
            label,
            status: job.status,
            progress: job.progress,
            track_count: tracks.len(),
            message: job.message.clone(),
        });

        for track in tracks {
            if seen.insert(track.id.clone()) {
                aggregation.tracks.push(track);
            }
        }
    }

    aggregation
}

// Malformed track records inside a payload are skipped individually
fn payload_tracks(job: &Job) -> Vec<Track> {
    let Some(Value::Array(items)) = job.payload.as_ref().and_then(|p| p.get("tracks")) else {
        warn!(job_id = %job.id, "Done job has no track list in its payload");
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<Track>(item.clone()) {
            Ok(track) => Some(track),
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Skipping malformed track in payload");
                None
            }
        })
        .collect()
}

/// [`aggregate_jobs`] over the current contents of a [`JobStore`]
pub struct AggregationView {
    jobs: Arc<JobStore>,
}

impl AggregationView {
    pub fn new(jobs: Arc<JobStore>) -> Self {
        Self { jobs }
    }

    pub async fn aggregate(&self) -> Result<Aggregation> {
        let jobs = self.jobs.list().await?;
        Ok(aggregate_jobs(&jobs))
    }
}
