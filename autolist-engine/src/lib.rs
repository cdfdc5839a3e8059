//! autolist engine library
//!
//! Rule evaluation over merged track enrichments, plus the job-backed
//! multi-source fetch and aggregation layer that feeds it.
//!
//! [`Engine`] wires the stores and services over one key-value store and
//! exposes the logical operations used by the `autolist` binary and by
//! embedders.

pub mod config;
pub mod db;
pub mod models;
pub mod rules;
pub mod services;

pub use config::EngineConfig;

use autolist_common::events::{EngineEvent, EventBus};
use autolist_common::kv::{KvStore, MemoryKvStore, SqliteKvStore};
use autolist_common::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use crate::db::{EnrichmentStore, JobStore, RuleSetStore};
use crate::models::{EnrichmentEntry, Job, RuleGroup, RuleSet, TrackSource};
use crate::rules::{EnrichmentView, TrackView, ValidationReport};
use crate::services::{
    Aggregation, AggregationView, Preview, SourceFetchCoordinator, TrackSourceFetcher,
};

/// Engine state shared by all operations
pub struct Engine {
    events: EventBus,
    jobs: Arc<JobStore>,
    rule_sets: RuleSetStore,
    enrichments: EnrichmentStore,
    coordinator: SourceFetchCoordinator,
    aggregation: AggregationView,
    startup_time: DateTime<Utc>,
}

impl Engine {
    /// Open an engine over `kv`
    ///
    /// Existing jobs are left untouched, including RUNNING ones that may
    /// belong to another engine sharing the same store. Use
    /// [`Engine::recover_stale`] to fail jobs left behind by a dead process.
    pub async fn open(
        kv: Arc<dyn KvStore>,
        fetcher: Arc<dyn TrackSourceFetcher>,
        events: EventBus,
    ) -> Result<Self> {
        let jobs = Arc::new(JobStore::open(Arc::clone(&kv), events.clone()).await?);

        let engine = Self {
            rule_sets: RuleSetStore::new(Arc::clone(&kv), events.clone()),
            enrichments: EnrichmentStore::new(Arc::clone(&kv)),
            coordinator: SourceFetchCoordinator::new(Arc::clone(&jobs), fetcher),
            aggregation: AggregationView::new(Arc::clone(&jobs)),
            jobs,
            events,
            startup_time: Utc::now(),
        };
        info!("Engine opened");
        Ok(engine)
    }

    /// Engine persisting to the SQLite database named by `config`
    pub async fn open_sqlite(
        config: &EngineConfig,
        fetcher: Arc<dyn TrackSourceFetcher>,
    ) -> Result<Self> {
        let kv: Arc<dyn KvStore> =
            Arc::new(SqliteKvStore::open_with(&config.database_path, config.lock_retry).await?);
        Self::open(kv, fetcher, EventBus::new(config.event_capacity)).await
    }

    /// Engine without persistence
    pub async fn in_memory(fetcher: Arc<dyn TrackSourceFetcher>) -> Result<Self> {
        Self::open(Arc::new(MemoryKvStore::new()), fetcher, EventBus::default()).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn startup_time(&self) -> DateTime<Utc> {
        self.startup_time
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    /// One new PENDING job per source; fetches run in the background
    pub async fn submit_source_fetch(&self, sources: Vec<TrackSource>) -> Result<Vec<Job>> {
        self.coordinator.submit(sources).await
    }

    /// Re-schedule fetch jobs still PENDING from an earlier run
    pub async fn resume_pending(&self) -> Result<Vec<Job>> {
        self.coordinator.resume_pending().await
    }

    /// Wait for every scheduled fetch to reach a terminal state
    pub async fn wait_for_fetches(&self) {
        self.coordinator.drain().await
    }

    /// Cancel outstanding fetches and wait until each has been recorded as failed
    ///
    /// Later submissions are rejected. The job store stays open, so the
    /// outcomes can still be read back.
    pub async fn cancel_fetches(&self) {
        self.coordinator.shutdown().await
    }

    /// Fail every RUNNING job with the interrupted message
    ///
    /// Only call this when no other engine is fetching through the same
    /// store: a RUNNING job cannot be told apart from one owned by a live
    /// process.
    pub async fn recover_stale(&self) -> Result<Vec<Job>> {
        self.jobs.recover_stale().await
    }

    pub async fn get_job(&self, id: &str) -> Result<Job> {
        self.jobs.get(id).await
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.jobs.list().await
    }

    pub async fn aggregate_tracks(&self) -> Result<Aggregation> {
        self.aggregation.aggregate().await
    }

    // ========================================================================
    // Rules
    // ========================================================================

    pub async fn list_rule_sets(&self) -> Result<Vec<RuleSet>> {
        self.rule_sets.list().await
    }

    pub async fn get_rule_set(&self, id: &str) -> Result<RuleSet> {
        self.rule_sets.get(id).await
    }

    pub async fn upsert_rule_set(&self, rule_set: RuleSet) -> Result<RuleSet> {
        self.rule_sets.upsert(rule_set).await
    }

    pub fn evaluate_rule(&self, group: &RuleGroup, view: &EnrichmentView) -> bool {
        rules::evaluate_group(view, group)
    }

    pub fn validate_rule_group(&self, group: &RuleGroup) -> ValidationReport {
        rules::validate_rule_group(group)
    }

    pub fn preview_from_rules(&self, rule_sets: &[RuleSet], tracks: &[TrackView]) -> Vec<Preview> {
        services::build_previews(rule_sets, tracks)
    }

    /// Preview stored rule sets against the aggregated tracks and their stored enrichments
    pub async fn preview_aggregated(&self) -> Result<Vec<Preview>> {
        let aggregation = self.aggregate_tracks().await?;
        let views = self.enrichments.views(&aggregation.track_ids()).await?;
        let rule_sets = self.list_rule_sets().await?;
        Ok(services::build_previews(&rule_sets, &views))
    }

    // ========================================================================
    // Enrichments
    // ========================================================================

    pub async fn append_enrichment(
        &self,
        track_id: &str,
        entry: EnrichmentEntry,
    ) -> Result<Vec<EnrichmentEntry>> {
        self.enrichments.append(track_id, entry).await
    }

    pub async fn enrichment_entries(&self, track_id: &str) -> Result<Vec<EnrichmentEntry>> {
        self.enrichments.entries(track_id).await
    }

    pub async fn all_enrichments(&self) -> Result<BTreeMap<String, Vec<EnrichmentEntry>>> {
        self.enrichments.all().await
    }

    pub async fn enrichment_views(&self, track_ids: &[String]) -> Result<Vec<TrackView>> {
        self.enrichments.views(track_ids).await
    }

    /// Cancel outstanding fetches, wait for their outcomes, then close the job store
    pub async fn shutdown(&self) {
        self.coordinator.shutdown().await;
        self.jobs.close().await;
    }
}
