//! Job state machine
//!
//! PENDING → RUNNING → DONE | FAILED
//!
//! - `begin` is accepted exactly once, from PENDING
//! - `complete` is accepted only from RUNNING
//! - `fail` is accepted from PENDING or RUNNING (a job that cannot even start
//!   still has to reach a terminal state)
//! - DONE and FAILED are absorbing; every further transition is rejected
//!
//! These methods only mutate the in-memory record. `JobStore` persists the
//! result before any caller observes it.

use autolist_common::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use super::{Track, TrackSource};

/// Step tag of per-source track fetch jobs
pub const FETCH_TRACKS_STEP: &str = "fetch_tracks";

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted unit of asynchronous work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique, immutable after creation
    pub id: String,

    /// Kind tag, e.g. "fetch_tracks"
    pub step: String,

    pub status: JobStatus,

    /// Always within [0.0, 1.0]
    #[serde(default)]
    pub progress: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Opaque result container, set by `complete`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Opaque input container (for fetch jobs: the TrackSource)
    #[serde(default)]
    pub metadata: Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// New PENDING job with a fresh id
    pub fn new(step: impl Into<String>, metadata: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            step: step.into(),
            status: JobStatus::Pending,
            progress: 0.0,
            message: None,
            payload: None,
            metadata,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// PENDING → RUNNING
    pub fn begin(&mut self) -> Result<()> {
        self.ensure_status(&[JobStatus::Pending], "begin")?;
        let now = Utc::now();
        self.status = JobStatus::Running;
        self.progress = 0.0;
        self.message = None;
        self.started_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// RUNNING → DONE
    pub fn complete(&mut self, payload: Value) -> Result<()> {
        self.ensure_status(&[JobStatus::Running], "complete")?;
        let now = Utc::now();
        self.status = JobStatus::Done;
        self.progress = 1.0;
        self.payload = Some(payload);
        self.finished_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// PENDING | RUNNING → FAILED
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.ensure_status(&[JobStatus::Pending, JobStatus::Running], "fail")?;
        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.message = Some(message.into());
        self.finished_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// Update progress of a RUNNING job; values are clamped into [0, 1]
    pub fn set_progress(&mut self, progress: f64, message: Option<String>) -> Result<()> {
        self.ensure_status(&[JobStatus::Running], "report progress on")?;
        self.progress = if progress.is_nan() {
            self.progress
        } else {
            progress.clamp(0.0, 1.0)
        };
        if message.is_some() {
            self.message = message;
        }
        self.touch(Utc::now());
        Ok(())
    }

    /// Source this job was created for, if its metadata holds one
    pub fn track_source(&self) -> Option<TrackSource> {
        serde_json::from_value(self.metadata.clone()).ok()
    }

    fn ensure_status(&self, allowed: &[JobStatus], action: &str) -> Result<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                job_id: self.id.clone(),
                from: self.status.to_string(),
                action: action.to_string(),
            })
        }
    }

    // updated_at never moves backwards, even if the wall clock does
    fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

/// Payload stored on a DONE fetch job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchPayload {
    pub source: TrackSource,
    pub tracks: Vec<Track>,
}
