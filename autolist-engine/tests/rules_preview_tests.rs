//! Integration tests for rule management and previews
//!
//! Rule sets and enrichments persisted through the engine, evaluated against
//! aggregated tracks end to end.

mod helpers;

use autolist_common::events::EngineEvent;
use autolist_common::kv::{KvStore, SqliteKvStore};
use autolist_common::Error;
use autolist_engine::models::{EnrichmentEntry, RuleGroup, RuleSet, TrackSource};
use autolist_engine::rules::{EnrichmentView, TrackView};
use autolist_engine::Engine;
use helpers::{memory_engine, tracks, ScriptedFetcher};
use serde_json::json;
use std::sync::Arc;

fn rule_set(value: serde_json::Value) -> RuleSet {
    RuleSet::from_json(value).unwrap()
}

fn happy_rule() -> RuleSet {
    rule_set(json!({
        "id": "happy",
        "name": "Happy songs",
        "target_label": "Happy",
        "rules": {"operator": "and", "conditions": [
            {"field": "mood", "operator": "eq", "value": "happy"}
        ]}
    }))
}

#[tokio::test]
async fn test_upsert_replaces_by_id_and_appends_new_ids() {
    let (_, engine) = memory_engine(Arc::new(ScriptedFetcher::new())).await;
    let mut rx = engine.subscribe();

    engine.upsert_rule_set(happy_rule()).await.unwrap();
    engine
        .upsert_rule_set(rule_set(json!({
            "id": "fast", "name": "Fast",
            "rules": {"conditions": [{"field": "bpm", "operator": "gte", "value": 140}]}
        })))
        .await
        .unwrap();
    assert_eq!(engine.list_rule_sets().await.unwrap().len(), 2);

    let mut replacement = happy_rule();
    replacement.name = "Cheerful".to_string();
    replacement.enabled = false;
    engine.upsert_rule_set(replacement).await.unwrap();

    let stored = engine.list_rule_sets().await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].id, "happy");
    assert_eq!(stored[0].name, "Cheerful");
    assert_eq!(stored[0].target_label.as_deref(), Some("Happy"));
    assert_eq!(engine.get_rule_set("fast").await.unwrap().name, "Fast");

    let mut replaced_flags = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::RuleSetUpserted { replaced, .. } = event {
            replaced_flags.push(replaced);
        }
    }
    assert_eq!(replaced_flags, vec![false, false, true]);
}

#[tokio::test]
async fn test_get_unknown_rule_set_is_not_found() {
    let (_, engine) = memory_engine(Arc::new(ScriptedFetcher::new())).await;
    assert!(matches!(engine.get_rule_set("nope").await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_invalid_rule_set_is_rejected_with_paths() {
    let (_, engine) = memory_engine(Arc::new(ScriptedFetcher::new())).await;
    let bad = rule_set(json!({
        "id": "bad", "name": "Bad",
        "rules": {"conditions": [
            {"field": "mood", "operator": "eq", "value": "happy"},
            {"field": "", "operator": "eq", "value": 1}
        ]}
    }));

    match engine.upsert_rule_set(bad).await {
        Err(Error::Validation(v)) => assert_eq!(v.issues[0].path, "rules.conditions[1].field"),
        other => panic!("expected validation error, got {:?}", other),
    }
    assert!(engine.list_rule_sets().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_warnings_do_not_block_upsert() {
    let (_, engine) = memory_engine(Arc::new(ScriptedFetcher::new())).await;
    let odd = rule_set(json!({
        "id": "odd", "name": "Odd",
        "rules": {"conditions": [{"field": "bpm", "operator": "between", "value": [1, 2]}]}
    }));

    let report = engine.validate_rule_group(&odd.rules);
    assert!(report.valid);
    assert_eq!(report.warnings.len(), 1);
    engine.upsert_rule_set(odd).await.unwrap();
}

#[tokio::test]
async fn test_mood_scenario_through_evaluate_rule() {
    let (_, engine) = memory_engine(Arc::new(ScriptedFetcher::new())).await;
    let group: RuleGroup = happy_rule().rules;

    let view = |value: serde_json::Value| match value {
        serde_json::Value::Object(map) => EnrichmentView::from(map),
        _ => EnrichmentView::new(),
    };
    assert!(engine.evaluate_rule(&group, &view(json!({"mood": "happy"}))));
    assert!(!engine.evaluate_rule(&group, &view(json!({"mood": "sad"}))));
    assert!(!engine.evaluate_rule(&group, &view(json!({}))));
}

#[tokio::test]
async fn test_preview_from_rules_skips_disabled_sets() {
    let (_, engine) = memory_engine(Arc::new(ScriptedFetcher::new())).await;
    let tracks = vec![
        TrackView::new("t1", EnrichmentView::from_iter([("mood".to_string(), json!("happy"))])),
        TrackView::new("t2", EnrichmentView::new()),
    ];
    let previews = engine.preview_from_rules(&[happy_rule(), happy_rule().disabled()], &tracks);
    assert_eq!(previews.len(), 1);
    assert_eq!(previews[0].track_ids, vec!["t1"]);
}

#[tokio::test]
async fn test_preview_aggregated_end_to_end() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let kv: Arc<dyn KvStore> =
        Arc::new(SqliteKvStore::open(&temp_dir.path().join("autolist.db")).await.unwrap());
    let fetcher = ScriptedFetcher::new()
        .succeed("liked", tracks(&["t1", "t2"]))
        .succeed("p1", tracks(&["t2", "t3"]))
        .fail("p2", "playlist deleted");
    let engine = Engine::open(kv, Arc::new(fetcher), Default::default())
        .await
        .unwrap();

    engine
        .submit_source_fetch(vec![
            TrackSource::liked(),
            TrackSource::playlist("p1", None),
            TrackSource::playlist("p2", None),
        ])
        .await
        .unwrap();
    engine.wait_for_fetches().await;

    // t1: automated says sad, manual override says happy (later entry wins)
    engine
        .append_enrichment("t1", EnrichmentEntry::new("external_features", json!({"mood": "sad", "bpm": 150})))
        .await
        .unwrap();
    engine
        .append_enrichment("t1", EnrichmentEntry::new("manual", json!({"mood": "happy"})))
        .await
        .unwrap();
    engine
        .append_enrichment("t3", EnrichmentEntry::new("external_features", json!({"mood": "happy", "bpm": 90})))
        .await
        .unwrap();
    // t2 has no enrichment at all

    engine.upsert_rule_set(happy_rule()).await.unwrap();
    engine
        .upsert_rule_set(rule_set(json!({
            "id": "fast", "name": "Fast",
            "rules": {"conditions": [{"field": "bpm", "operator": "gte", "value": 140}]}
        })))
        .await
        .unwrap();
    engine
        .upsert_rule_set(rule_set(json!({
            "id": "off", "name": "Off", "enabled": false,
            "rules": {"conditions": []}
        })))
        .await
        .unwrap();

    let previews = engine.preview_aggregated().await.unwrap();
    assert_eq!(previews.len(), 2);
    assert_eq!(previews[0].rule_id, "happy");
    assert_eq!(previews[0].track_ids, vec!["t1", "t3"]);
    assert_eq!(previews[1].rule_id, "fast");
    assert_eq!(previews[1].track_ids, vec!["t1"]);
    assert_eq!(previews[1].track_count, 1);

    let aggregation = engine.aggregate_tracks().await.unwrap();
    assert_eq!(aggregation.tracks.len(), 3);
    assert_eq!(aggregation.sources.len(), 3);
}
