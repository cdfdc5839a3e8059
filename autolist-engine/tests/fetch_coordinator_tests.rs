//! Integration tests for multi-source fetching
//!
//! Covers submission, independent per-source outcomes, cancellation on
//! shutdown and the events emitted along the way.

mod helpers;

use autolist_common::events::EngineEvent;
use autolist_common::Error;
use autolist_engine::models::{JobStatus, TrackSource, TrackSourceType, FETCH_TRACKS_STEP};
use autolist_engine::services::CANCELLED_MESSAGE;
use helpers::{memory_engine, tracks, BlockingFetcher, ScriptedFetcher};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_one_failing_source_does_not_affect_the_other() {
    let fetcher = ScriptedFetcher::new()
        .fail("a", "upstream returned 500")
        .succeed("b", tracks(&["t1", "t2"]));
    let (_, engine) = memory_engine(Arc::new(fetcher)).await;

    let jobs = engine
        .submit_source_fetch(vec![
            TrackSource::playlist("a", Some("Source A".to_string())),
            TrackSource::playlist("b", Some("Source B".to_string())),
        ])
        .await
        .unwrap();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|job| job.status == JobStatus::Pending));
    assert!(jobs.iter().all(|job| job.step == FETCH_TRACKS_STEP));

    engine.wait_for_fetches().await;

    let aggregation = engine.aggregate_tracks().await.unwrap();
    assert_eq!(aggregation.track_ids(), vec!["t1", "t2"]);
    assert!(aggregation.tracks.iter().all(|t| t.sources.contains("Source B")));

    let a = aggregation.sources.iter().find(|s| s.label == "Source A").unwrap();
    let b = aggregation.sources.iter().find(|s| s.label == "Source B").unwrap();
    assert_eq!(a.status, JobStatus::Failed);
    assert_eq!(a.message.as_deref(), Some("upstream returned 500"));
    assert_eq!(a.track_count, 0);
    assert_eq!(b.status, JobStatus::Done);
    assert_eq!(b.track_count, 2);
}

#[tokio::test]
async fn test_done_job_carries_source_and_tracks() {
    let fetcher = ScriptedFetcher::new().succeed("liked", tracks(&["t9"]));
    let (_, engine) = memory_engine(Arc::new(fetcher)).await;

    let job = engine
        .submit_source_fetch(vec![TrackSource::liked()])
        .await
        .unwrap()
        .remove(0);
    engine.wait_for_fetches().await;

    let done = engine.get_job(&job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Done);
    assert_eq!(done.progress, 1.0);
    assert!(done.started_at.is_some());
    assert!(done.finished_at.is_some());
    assert!(done.updated_at >= done.created_at);

    let payload = done.payload.unwrap();
    assert_eq!(payload["source"]["type"], "liked");
    assert_eq!(payload["tracks"][0]["id"], "t9");
    assert_eq!(done.metadata["type"], "liked");
}

#[tokio::test]
async fn test_resubmitting_a_source_creates_a_new_job() {
    let fetcher = Arc::new(ScriptedFetcher::new().succeed("p1", tracks(&["t1"])));
    let (_, engine) = memory_engine(fetcher.clone()).await;

    let first = engine
        .submit_source_fetch(vec![TrackSource::playlist("p1", None)])
        .await
        .unwrap();
    let second = engine
        .submit_source_fetch(vec![TrackSource::playlist("p1", None)])
        .await
        .unwrap();
    engine.wait_for_fetches().await;

    assert_ne!(first[0].id, second[0].id);
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(engine.list_jobs().await.unwrap().len(), 2);
    // Same track from both jobs aggregates once
    assert_eq!(engine.aggregate_tracks().await.unwrap().tracks.len(), 1);
}

#[tokio::test]
async fn test_playlist_without_id_fails_without_fetching() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let (_, engine) = memory_engine(fetcher.clone()).await;

    let source = TrackSource {
        source_type: TrackSourceType::Playlist,
        id: None,
        label: None,
    };
    let job = engine.submit_source_fetch(vec![source]).await.unwrap().remove(0);
    engine.wait_for_fetches().await;

    let failed = engine.get_job(&job.id).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.message.unwrap().contains("source.id"));
    assert!(failed.started_at.is_none());
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_slow_sources_run_concurrently() {
    let fetcher = ScriptedFetcher::new()
        .succeed("a", tracks(&["t1"]))
        .succeed("b", tracks(&["t2"]))
        .succeed("c", tracks(&["t3"]))
        .delay("a", Duration::from_millis(200))
        .delay("b", Duration::from_millis(200))
        .delay("c", Duration::from_millis(200));
    let (_, engine) = memory_engine(Arc::new(fetcher)).await;

    let started = std::time::Instant::now();
    engine
        .submit_source_fetch(vec![
            TrackSource::playlist("a", None),
            TrackSource::playlist("b", None),
            TrackSource::playlist("c", None),
        ])
        .await
        .unwrap();
    engine.wait_for_fetches().await;

    assert!(started.elapsed() < Duration::from_millis(550));
    assert_eq!(engine.aggregate_tracks().await.unwrap().tracks.len(), 3);
}

#[tokio::test]
async fn test_shutdown_rejects_new_batches() {
    let (_, engine) = memory_engine(Arc::new(BlockingFetcher)).await;
    engine
        .submit_source_fetch(vec![TrackSource::liked()])
        .await
        .unwrap();

    engine.shutdown().await;

    let err = engine.submit_source_fetch(vec![TrackSource::liked()]).await.unwrap_err();
    assert!(matches!(err, Error::Internal(_)));
}

#[tokio::test]
async fn test_cancelled_job_is_terminal() {
    let fetcher = Arc::new(BlockingFetcher);
    let (kv, engine) = memory_engine(fetcher.clone()).await;
    let job = engine
        .submit_source_fetch(vec![TrackSource::playlist("slow", None)])
        .await
        .unwrap()
        .remove(0);
    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.shutdown().await;

    let reopened = autolist_engine::Engine::open(kv, fetcher, Default::default())
        .await
        .unwrap();
    let cancelled = reopened.get_job(&job.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Failed);
    assert_eq!(cancelled.message.as_deref(), Some(CANCELLED_MESSAGE));
    assert!(reopened.recover_stale().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancelled_fetches_are_readable_before_shutdown() {
    let (_, engine) = memory_engine(Arc::new(BlockingFetcher)).await;
    let submitted = engine
        .submit_source_fetch(vec![TrackSource::liked(), TrackSource::playlist("p1", None)])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    engine.cancel_fetches().await;

    for job in &submitted {
        let cancelled = engine.get_job(&job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Failed);
        assert_eq!(cancelled.message.as_deref(), Some(CANCELLED_MESSAGE));
        assert!(cancelled.finished_at.is_some());
    }
    assert!(matches!(
        engine.submit_source_fetch(vec![TrackSource::liked()]).await,
        Err(Error::Internal(_))
    ));
    engine.shutdown().await;
}

#[tokio::test]
async fn test_events_follow_the_job_lifecycle() {
    let fetcher = ScriptedFetcher::new().succeed("liked", tracks(&["t1"]));
    let (_, engine) = memory_engine(Arc::new(fetcher)).await;
    let mut rx = engine.subscribe();

    let job = engine
        .submit_source_fetch(vec![TrackSource::liked()])
        .await
        .unwrap()
        .remove(0);
    engine.wait_for_fetches().await;

    let mut statuses = Vec::new();
    let mut created = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            EngineEvent::JobCreated { job_id, .. } => {
                assert_eq!(job_id, job.id);
                created = true;
            }
            EngineEvent::JobStatusChanged { new_status, .. } => statuses.push(new_status),
            _ => {}
        }
    }
    assert!(created);
    assert_eq!(statuses, vec!["running", "done"]);
}
