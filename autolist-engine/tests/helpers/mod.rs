//! Test helpers shared by integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use autolist_common::events::EventBus;
use autolist_common::kv::{KvStore, MemoryKvStore};
use autolist_common::{Error, Result};
use autolist_engine::models::{Track, TrackSource};
use autolist_engine::services::TrackSourceFetcher;
use autolist_engine::Engine;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fetcher returning canned outcomes keyed by playlist id (`"liked"` for liked tracks)
#[derive(Default)]
pub struct ScriptedFetcher {
    outcomes: HashMap<String, std::result::Result<Vec<Track>, String>>,
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeed(mut self, key: &str, tracks: Vec<Track>) -> Self {
        self.outcomes.insert(key.to_string(), Ok(tracks));
        self
    }

    pub fn fail(mut self, key: &str, message: &str) -> Self {
        self.outcomes.insert(key.to_string(), Err(message.to_string()));
        self
    }

    pub fn delay(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_string(), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn source_key(source: &TrackSource) -> String {
    source.id.clone().unwrap_or_else(|| "liked".to_string())
}

#[async_trait]
impl TrackSourceFetcher for ScriptedFetcher {
    async fn fetch(&self, source: &TrackSource) -> Result<Vec<Track>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = source_key(source);
        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        match self.outcomes.get(&key) {
            Some(Ok(tracks)) => Ok(tracks.clone()),
            Some(Err(message)) => Err(Error::Fetch(message.clone())),
            None => Err(Error::Fetch(format!("no scripted outcome for {key}"))),
        }
    }
}

/// Fetcher that never finishes on its own
pub struct BlockingFetcher;

#[async_trait]
impl TrackSourceFetcher for BlockingFetcher {
    async fn fetch(&self, _source: &TrackSource) -> Result<Vec<Track>> {
        std::future::pending::<()>().await;
        Ok(Vec::new())
    }
}

pub async fn memory_engine(fetcher: Arc<dyn TrackSourceFetcher>) -> (Arc<MemoryKvStore>, Engine) {
    let kv = Arc::new(MemoryKvStore::new());
    let engine = Engine::open(kv.clone() as Arc<dyn KvStore>, fetcher, EventBus::default())
        .await
        .unwrap();
    (kv, engine)
}

pub fn tracks(ids: &[&str]) -> Vec<Track> {
    ids.iter()
        .map(|id| Track::new(*id, format!("Song {id}"), "Artist", "Album"))
        .collect()
}
