//! Source fetch coordinator
//!
//! Turns a batch of [`TrackSource`]s into one `fetch_tracks` job each and
//! runs one fetch task per job. Tasks are owned by a `JoinSet` so none is
//! left unaccounted for when the coordinator shuts down.
//!
//! Task lifecycle per job:
//! 1. invalid source → FAILED without starting
//! 2. PENDING → RUNNING
//! 3. fetch via the [`TrackSourceFetcher`] collaborator
//! 4. RUNNING → DONE with `{source, tracks}`, or RUNNING → FAILED with the error
//!
//! One task failing never affects its siblings. No retries: resubmitting a
//! source creates a new job.

use async_trait::async_trait;
use autolist_common::{Error, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::db::JobStore;
use crate::models::{FetchPayload, Job, JobStatus, Track, TrackSource, FETCH_TRACKS_STEP};

/// Failure message of jobs interrupted by [`SourceFetchCoordinator::shutdown`]
pub const CANCELLED_MESSAGE: &str = "cancelled: coordinator shut down";

/// Retrieves the tracks of one source
///
/// Owns all network and authentication detail of the external service.
#[async_trait]
pub trait TrackSourceFetcher: Send + Sync {
    async fn fetch(&self, source: &TrackSource) -> Result<Vec<Track>>;
}

pub struct SourceFetchCoordinator {
    jobs: Arc<JobStore>,
    fetcher: Arc<dyn TrackSourceFetcher>,
    tasks: Mutex<JoinSet<()>>,
    cancel: CancellationToken,
}

impl SourceFetchCoordinator {
    pub fn new(jobs: Arc<JobStore>, fetcher: Arc<dyn TrackSourceFetcher>) -> Self {
        Self {
            jobs,
            fetcher,
            tasks: Mutex::new(JoinSet::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Create one PENDING job per source, then schedule their fetch tasks
    ///
    /// Returns the jobs as created (all PENDING). Fetch outcomes are written
    /// into the jobs, never returned here.
    pub async fn submit(&self, sources: Vec<TrackSource>) -> Result<Vec<Job>> {
        self.ensure_running()?;

        let mut created = Vec::with_capacity(sources.len());
        for source in sources {
            let metadata = serde_json::to_value(&source)?;
            let job = self.jobs.create(FETCH_TRACKS_STEP, metadata).await?;
            created.push((job, source));
        }

        for (job, source) in &created {
            self.schedule(job.id.clone(), source.clone()).await;
        }
        info!(count = created.len(), "Submitted source fetch batch");

        Ok(created.into_iter().map(|(job, _)| job).collect())
    }

    /// Schedule tasks for `fetch_tracks` jobs still PENDING (after a restart)
    ///
    /// Jobs whose metadata is not a readable source are failed instead.
    pub async fn resume_pending(&self) -> Result<Vec<Job>> {
        self.ensure_running()?;

        let mut resumed = Vec::new();
        for job in self.jobs.list_by_status(JobStatus::Pending).await? {
            if job.step != FETCH_TRACKS_STEP {
                continue;
            }
            match job.track_source() {
                Some(source) => {
                    self.schedule(job.id.clone(), source).await;
                    resumed.push(job);
                }
                None => {
                    warn!(job_id = %job.id, "Pending job has unreadable source metadata");
                    self.jobs
                        .fail(&job.id, "unreadable source metadata")
                        .await?;
                }
            }
        }
        if !resumed.is_empty() {
            info!(count = resumed.len(), "Resumed pending fetch jobs");
        }
        Ok(resumed)
    }

    /// Number of tasks not yet joined
    pub async fn task_count(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Wait until every scheduled task has finished
    ///
    /// Submissions wait for the drain to complete. Dropping the returned
    /// future leaves unfinished tasks running.
    pub async fn drain(&self) {
        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Fetch task panicked");
            }
        }
    }

    /// Cancel in-flight fetches and wait for every task to record its outcome
    ///
    /// Interrupted jobs end FAILED with [`CANCELLED_MESSAGE`]; the terminal
    /// state contract is unchanged.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.drain().await;
        info!("Source fetch coordinator shut down");
    }

    async fn schedule(&self, job_id: String, source: TrackSource) {
        let jobs = Arc::clone(&self.jobs);
        let fetcher = Arc::clone(&self.fetcher);
        let cancel = self.cancel.child_token();
        let span = tracing::info_span!(
            "fetch_tracks",
            job_id = %job_id,
            source_type = %source.source_type
        );

        let mut tasks = self.tasks.lock().await;
        // Reap finished tasks so the set does not grow across batches
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                error!(error = %e, "Fetch task panicked");
            }
        }
        tasks.spawn(
            async move {
                if let Err(e) = run_fetch(&jobs, fetcher.as_ref(), &job_id, source, &cancel).await {
                    error!(job_id = %job_id, error = %e, "Fetch task could not record its outcome");
                }
            }
            .instrument(span),
        );
    }

    fn ensure_running(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Internal("source fetch coordinator is shut down".to_string()))
        } else {
            Ok(())
        }
    }
}

async fn run_fetch(
    jobs: &JobStore,
    fetcher: &dyn TrackSourceFetcher,
    job_id: &str,
    source: TrackSource,
    cancel: &CancellationToken,
) -> Result<()> {
    if let Err(invalid) = source.validate() {
        warn!(job_id, error = %invalid, "Invalid track source");
        jobs.fail(job_id, invalid.to_string()).await?;
        return Ok(());
    }

    match jobs.begin(job_id).await {
        Ok(_) => {}
        // Another task (or an earlier resume) already claimed this job
        Err(Error::InvalidTransition { .. }) => {
            debug!(job_id, "Job already started elsewhere");
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Fetch(CANCELLED_MESSAGE.to_string())),
        result = fetcher.fetch(&source) => result,
    };

    match outcome {
        Ok(tracks) => {
            let label = source.display_label();
            let tracks: Vec<Track> = tracks
                .into_iter()
                .map(|track| track.with_source(label.clone()))
                .collect();
            let track_count = tracks.len();

            jobs.report_progress(job_id, 0.9, Some(format!("fetched {track_count} tracks")))
                .await?;
            let payload = serde_json::to_value(FetchPayload { source, tracks })?;
            jobs.complete(job_id, payload).await?;
            info!(job_id, track_count, "Source fetch completed");
        }
        Err(e) => {
            let message = failure_message(&e);
            warn!(job_id, error = %message, "Source fetch failed");
            jobs.fail(job_id, message).await?;
        }
    }
    Ok(())
}

fn failure_message(error: &Error) -> String {
    match error {
        Error::Fetch(message) => message.clone(),
        other => other.to_string(),
    }
}
