//! Job persistence
//!
//! [`JobStore`] is the only shared-mutable component of the engine. Each job
//! is stored as one JSON record under `job:<id>`:
//! - transitions on the same id are serialized by a per-id async lock
//! - transitions on different ids, and all reads, run unserialized
//! - every transition is written to the [`KvStore`] before it returns, and
//!   events are emitted only after that write
//!
//! A per-id lock lives in the lock map only while some call holds or awaits
//! it, whatever the outcome of that call.

use autolist_common::events::{EngineEvent, EventBus};
use autolist_common::kv::{read_or_default, write_json, KvStore};
use autolist_common::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::models::{Job, JobStatus};

/// Key prefix of job records
pub const JOB_KEY_PREFIX: &str = "job:";

/// Failure message given to jobs found RUNNING when the store is recovered
pub const INTERRUPTED_MESSAGE: &str = "interrupted: engine restarted while job was running";

fn job_key(id: &str) -> String {
    format!("{JOB_KEY_PREFIX}{id}")
}

/// Per-id lock plus the number of calls holding or awaiting it
struct LockEntry {
    lock: Arc<Mutex<()>>,
    users: usize,
}

type LockMap = StdMutex<HashMap<String, LockEntry>>;

fn lock_map(locks: &LockMap) -> StdMutexGuard<'_, HashMap<String, LockEntry>> {
    // A panic while holding this guard cannot leave the map inconsistent
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registration of one call against a job id
///
/// The map entry is removed when the last registration is dropped, on every
/// exit path including a cancelled wait.
struct JobLock<'a> {
    locks: &'a LockMap,
    id: String,
    lock: Arc<Mutex<()>>,
}

impl JobLock<'_> {
    async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for JobLock<'_> {
    fn drop(&mut self) {
        let mut map = lock_map(self.locks);
        if let Some(entry) = map.get_mut(&self.id) {
            entry.users = entry.users.saturating_sub(1);
            if entry.users == 0 {
                map.remove(&self.id);
            }
        }
    }
}

/// Injectable job registry with explicit open/close lifecycle
pub struct JobStore {
    kv: Arc<dyn KvStore>,
    events: EventBus,
    locks: LockMap,
    closed: AtomicBool,
}

impl JobStore {
    /// Open a store over `kv`
    ///
    /// Does not touch existing records; [`JobStore::recover_stale`] fails jobs
    /// left RUNNING by a process that is gone.
    pub async fn open(kv: Arc<dyn KvStore>, events: EventBus) -> Result<Self> {
        let existing = kv.scan_prefix(JOB_KEY_PREFIX).await?.len();
        debug!(existing, "Job store opened");
        Ok(Self {
            kv,
            events,
            locks: StdMutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Reject all further operations
    ///
    /// Waits for in-flight transitions to finish writing.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let locks: Vec<Arc<Mutex<()>>> = lock_map(&self.locks)
            .values()
            .map(|entry| Arc::clone(&entry.lock))
            .collect();
        for lock in locks {
            drop(lock.lock().await);
        }
        info!("Job store closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Persist a new PENDING job
    pub async fn create(&self, step: &str, metadata: Value) -> Result<Job> {
        self.ensure_open()?;
        let job = Job::new(step, metadata);
        write_json(self.kv.as_ref(), &job_key(&job.id), &job).await?;

        info!(job_id = %job.id, step = %job.step, "Job created");
        self.events.emit_lossy(EngineEvent::JobCreated {
            job_id: job.id.clone(),
            step: job.step.clone(),
            timestamp: job.created_at,
        });
        Ok(job)
    }

    /// Job by id; unknown or unreadable records are `NotFound`
    pub async fn get(&self, id: &str) -> Result<Job> {
        self.ensure_open()?;
        self.load(id).await
    }

    /// All readable jobs, ordered by (`created_at`, `id`)
    pub async fn list(&self) -> Result<Vec<Job>> {
        self.ensure_open()?;
        let mut jobs = Vec::new();
        for (key, raw) in self.kv.scan_prefix(JOB_KEY_PREFIX).await? {
            match serde_json::from_str::<Job>(&raw) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(key = %key, error = %e, "Skipping malformed job record"),
            }
        }
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }

    /// Jobs currently in `status`, in listing order
    pub async fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|job| job.status == status)
            .collect())
    }

    /// PENDING → RUNNING
    pub async fn begin(&self, id: &str) -> Result<Job> {
        self.transition(id, |job| job.begin()).await
    }

    /// RUNNING → DONE with `payload`
    pub async fn complete(&self, id: &str, payload: Value) -> Result<Job> {
        self.transition(id, move |job| job.complete(payload)).await
    }

    /// PENDING | RUNNING → FAILED with `message`
    pub async fn fail(&self, id: &str, message: impl Into<String>) -> Result<Job> {
        let message = message.into();
        self.transition(id, move |job| job.fail(message)).await
    }

    /// Update progress of a RUNNING job (clamped into [0, 1])
    pub async fn report_progress(
        &self,
        id: &str,
        progress: f64,
        message: Option<String>,
    ) -> Result<Job> {
        self.ensure_open()?;
        let registration = self.register(id);
        let _guard = registration.acquire().await;

        let mut job = self.load(id).await?;
        job.set_progress(progress, message)?;
        self.save(&job).await?;

        debug!(job_id = %job.id, progress = job.progress, "Job progress");
        self.events.emit_lossy(EngineEvent::JobProgress {
            job_id: job.id.clone(),
            progress: job.progress,
            message: job.message.clone(),
            timestamp: job.updated_at,
        });
        Ok(job)
    }

    /// Fail every job still RUNNING; returns the jobs that were failed
    ///
    /// Only a previous process can have left a job RUNNING, since transitions
    /// are persisted before they return.
    pub async fn recover_stale(&self) -> Result<Vec<Job>> {
        let mut recovered = Vec::new();
        for job in self.list_by_status(JobStatus::Running).await? {
            match self.fail(&job.id, INTERRUPTED_MESSAGE).await {
                Ok(job) => recovered.push(job),
                // Finished between the scan and the lock
                Err(Error::InvalidTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        if !recovered.is_empty() {
            warn!(count = recovered.len(), "Failed stale running jobs");
        }
        Ok(recovered)
    }

    async fn transition<F>(&self, id: &str, apply: F) -> Result<Job>
    where
        F: FnOnce(&mut Job) -> Result<()>,
    {
        self.ensure_open()?;
        let registration = self.register(id);
        let _guard = registration.acquire().await;

        let mut job = self.load(id).await?;
        let old_status = job.status;
        apply(&mut job)?;
        self.save(&job).await?;

        info!(
            job_id = %job.id,
            step = %job.step,
            from = %old_status,
            to = %job.status,
            "Job transition"
        );
        self.events.emit_lossy(EngineEvent::JobStatusChanged {
            job_id: job.id.clone(),
            step: job.step.clone(),
            old_status: old_status.to_string(),
            new_status: job.status.to_string(),
            timestamp: job.updated_at,
        });
        Ok(job)
    }

    async fn load(&self, id: &str) -> Result<Job> {
        read_or_default::<Option<Job>>(self.kv.as_ref(), &job_key(id), None)
            .await?
            .ok_or_else(|| Error::NotFound(format!("job {id}")))
    }

    async fn save(&self, job: &Job) -> Result<()> {
        write_json(self.kv.as_ref(), &job_key(&job.id), job)
            .await
            .map_err(|e| {
                tracing::error!(job_id = %job.id, error = %e, "Failed to persist job");
                e
            })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::Internal("job store is closed".to_string()))
        } else {
            Ok(())
        }
    }

    fn register(&self, id: &str) -> JobLock<'_> {
        let mut map = lock_map(&self.locks);
        let entry = map.entry(id.to_string()).or_insert_with(|| LockEntry {
            lock: Arc::new(Mutex::new(())),
            users: 0,
        });
        entry.users += 1;
        JobLock {
            locks: &self.locks,
            id: id.to_string(),
            lock: Arc::clone(&entry.lock),
        }
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        lock_map(&self.locks).len()
    }
}
