//! Integration tests for job persistence
//!
//! Durability across reopen (SQLite on disk), per-id serialization under
//! concurrency, stale-job recovery and resumption of pending jobs.

mod helpers;

use autolist_common::events::EventBus;
use autolist_common::kv::{KvStore, SqliteKvStore};
use autolist_common::Error;
use autolist_engine::db::{JobStore, INTERRUPTED_MESSAGE};
use autolist_engine::models::{JobStatus, TrackSource, FETCH_TRACKS_STEP};
use autolist_engine::Engine;
use helpers::{tracks, ScriptedFetcher};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinSet;

async fn open_store(path: &std::path::Path) -> (Arc<dyn KvStore>, JobStore) {
    let kv: Arc<dyn KvStore> = Arc::new(SqliteKvStore::open(path).await.unwrap());
    let store = JobStore::open(Arc::clone(&kv), EventBus::default()).await.unwrap();
    (kv, store)
}

#[tokio::test]
async fn test_jobs_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("autolist.db");

    let (_, store) = open_store(&db_path).await;
    let job = store
        .create(FETCH_TRACKS_STEP, json!({"type": "liked"}))
        .await
        .unwrap();
    store.begin(&job.id).await.unwrap();
    store.report_progress(&job.id, 0.4, Some("halfway".to_string())).await.unwrap();
    let done = store.complete(&job.id, json!({"tracks": []})).await.unwrap();
    store.close().await;
    drop(store);

    let (_, reopened) = open_store(&db_path).await;
    let loaded = reopened.get(&job.id).await.unwrap();
    assert_eq!(loaded, done);
    assert_eq!(loaded.status, JobStatus::Done);
    assert_eq!(loaded.message.as_deref(), Some("halfway"));
}

#[tokio::test]
async fn test_terminal_jobs_reject_transitions() {
    let temp_dir = TempDir::new().unwrap();
    let (_, store) = open_store(&temp_dir.path().join("autolist.db")).await;

    let job = store.create("fetch_tracks", json!(null)).await.unwrap();
    store.begin(&job.id).await.unwrap();
    store.fail(&job.id, "boom").await.unwrap();

    for result in [
        store.begin(&job.id).await,
        store.complete(&job.id, json!({})).await,
        store.fail(&job.id, "again").await,
        store.report_progress(&job.id, 0.5, None).await,
    ] {
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
    }
    assert_eq!(store.get(&job.id).await.unwrap().message.as_deref(), Some("boom"));
}

#[tokio::test]
async fn test_concurrent_begin_on_one_job_is_serialized() {
    let temp_dir = TempDir::new().unwrap();
    let (_, store) = open_store(&temp_dir.path().join("autolist.db")).await;
    let store = Arc::new(store);
    let job = store.create("fetch_tracks", json!(null)).await.unwrap();

    let mut join_set = JoinSet::new();
    for _ in 0..10 {
        let store = Arc::clone(&store);
        let id = job.id.clone();
        join_set.spawn(async move { store.begin(&id).await.is_ok() });
    }

    let mut accepted = 0;
    while let Some(result) = join_set.join_next().await {
        if result.unwrap() {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 1, "begin must be accepted exactly once");
    assert_eq!(store.get(&job.id).await.unwrap().status, JobStatus::Running);
}

#[tokio::test]
async fn test_transitions_on_different_jobs_are_independent() {
    let temp_dir = TempDir::new().unwrap();
    let (_, store) = open_store(&temp_dir.path().join("autolist.db")).await;
    let store = Arc::new(store);

    let mut ids = Vec::new();
    for _ in 0..8 {
        ids.push(store.create("fetch_tracks", json!(null)).await.unwrap().id);
    }

    let mut join_set = JoinSet::new();
    for (i, id) in ids.iter().cloned().enumerate() {
        let store = Arc::clone(&store);
        join_set.spawn(async move {
            store.begin(&id).await.unwrap();
            if i % 2 == 0 {
                store.complete(&id, json!({"tracks": []})).await.unwrap();
            } else {
                store.fail(&id, "odd").await.unwrap();
            }
        });
    }
    while let Some(result) = join_set.join_next().await {
        result.unwrap();
    }

    let jobs = store.list().await.unwrap();
    assert_eq!(jobs.len(), 8);
    assert_eq!(jobs.iter().filter(|j| j.status == JobStatus::Done).count(), 4);
    assert_eq!(jobs.iter().filter(|j| j.status == JobStatus::Failed).count(), 4);
    assert!(jobs
        .windows(2)
        .all(|w| (w[0].created_at, &w[0].id) <= (w[1].created_at, &w[1].id)));
}

#[tokio::test]
async fn test_progress_is_clamped() {
    let temp_dir = TempDir::new().unwrap();
    let (_, store) = open_store(&temp_dir.path().join("autolist.db")).await;
    let job = store.create("fetch_tracks", json!(null)).await.unwrap();
    store.begin(&job.id).await.unwrap();

    assert_eq!(store.report_progress(&job.id, 7.5, None).await.unwrap().progress, 1.0);
    assert_eq!(store.report_progress(&job.id, -1.0, None).await.unwrap().progress, 0.0);
}

#[tokio::test]
async fn test_explicit_recovery_fails_stale_running_jobs() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("autolist.db");

    // Simulate a process that died mid-fetch
    let (kv, store) = open_store(&db_path).await;
    let running = store
        .create(FETCH_TRACKS_STEP, serde_json::to_value(TrackSource::liked()).unwrap())
        .await
        .unwrap();
    store.begin(&running.id).await.unwrap();
    let done = store.create(FETCH_TRACKS_STEP, json!({"type": "liked"})).await.unwrap();
    store.begin(&done.id).await.unwrap();
    store.complete(&done.id, json!({"tracks": []})).await.unwrap();
    drop(store);

    let engine = Engine::open(kv, Arc::new(ScriptedFetcher::new()), EventBus::default())
        .await
        .unwrap();
    assert_eq!(engine.get_job(&running.id).await.unwrap().status, JobStatus::Running);

    let recovered = engine.recover_stale().await.unwrap();
    assert_eq!(recovered.len(), 1);
    let failed = engine.get_job(&running.id).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.message.as_deref(), Some(INTERRUPTED_MESSAGE));
    assert_eq!(engine.get_job(&done.id).await.unwrap().status, JobStatus::Done);
}

#[tokio::test]
async fn test_second_engine_observing_does_not_disturb_running_fetch() {
    let temp_dir = TempDir::new().unwrap();
    let kv: Arc<dyn KvStore> =
        Arc::new(SqliteKvStore::open(&temp_dir.path().join("autolist.db")).await.unwrap());

    let fetcher = ScriptedFetcher::new()
        .succeed("p1", tracks(&["t1", "t2"]))
        .delay("p1", Duration::from_millis(200));
    let worker = Engine::open(Arc::clone(&kv), Arc::new(fetcher), EventBus::default())
        .await
        .unwrap();
    let job = worker
        .submit_source_fetch(vec![TrackSource::playlist("p1", None)])
        .await
        .unwrap()
        .remove(0);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Another process checking progress while the fetch is outstanding
    let observer = Engine::open(kv, Arc::new(ScriptedFetcher::new()), EventBus::default())
        .await
        .unwrap();
    let during = observer.aggregate_tracks().await.unwrap();
    assert!(during.tracks.is_empty());
    assert_eq!(during.sources[0].status, JobStatus::Running);
    assert_eq!(observer.list_jobs().await.unwrap().len(), 1);

    worker.wait_for_fetches().await;
    let finished = observer.get_job(&job.id).await.unwrap();
    assert_eq!(finished.status, JobStatus::Done);
    assert_eq!(observer.aggregate_tracks().await.unwrap().track_ids(), vec!["t1", "t2"]);
}

#[tokio::test]
async fn test_resume_pending_runs_leftover_jobs() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("autolist.db");

    let (kv, store) = open_store(&db_path).await;
    let pending = store
        .create(FETCH_TRACKS_STEP, serde_json::to_value(TrackSource::playlist("p1", None)).unwrap())
        .await
        .unwrap();
    let unreadable = store.create(FETCH_TRACKS_STEP, json!("not a source")).await.unwrap();
    let other_step = store.create("other", json!(null)).await.unwrap();
    drop(store);

    let fetcher = ScriptedFetcher::new().succeed("p1", tracks(&["t1", "t2"]));
    let engine = Engine::open(kv, Arc::new(fetcher), EventBus::default())
        .await
        .unwrap();
    let resumed = engine.resume_pending().await.unwrap();
    assert_eq!(resumed.len(), 1);
    assert_eq!(resumed[0].id, pending.id);
    engine.wait_for_fetches().await;

    assert_eq!(engine.get_job(&pending.id).await.unwrap().status, JobStatus::Done);
    assert_eq!(engine.get_job(&unreadable.id).await.unwrap().status, JobStatus::Failed);
    assert_eq!(engine.get_job(&other_step.id).await.unwrap().status, JobStatus::Pending);
    assert_eq!(engine.aggregate_tracks().await.unwrap().tracks.len(), 2);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let (_, store) = open_store(&temp_dir.path().join("autolist.db")).await;
    assert!(matches!(store.get("missing").await, Err(Error::NotFound(_))));
}
