//! File-backed [`TrackSourceFetcher`]
//!
//! Reads a JSON array of tracks per source from a directory:
//! - liked tracks: `liked.json`
//! - playlist `<id>`: `playlist-<id>.json`

use async_trait::async_trait;
use autolist_common::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::fetch_coordinator::TrackSourceFetcher;
use crate::models::{Track, TrackSource, TrackSourceType};

pub struct FixtureFetcher {
    dir: PathBuf,
}

impl FixtureFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the tracks of `source`
    pub fn fixture_path(&self, source: &TrackSource) -> Result<PathBuf> {
        let file_name = match (source.source_type, source.id.as_deref()) {
            (TrackSourceType::Liked, _) => "liked.json".to_string(),
            (TrackSourceType::Playlist, Some(id)) if is_safe_id(id) => format!("playlist-{id}.json"),
            (TrackSourceType::Playlist, Some(id)) => {
                return Err(Error::Fetch(format!("invalid playlist id '{id}'")))
            }
            (TrackSourceType::Playlist, None) => {
                return Err(Error::Fetch("playlist source has no id".to_string()))
            }
        };
        Ok(self.dir.join(file_name))
    }
}

fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[async_trait]
impl TrackSourceFetcher for FixtureFetcher {
    async fn fetch(&self, source: &TrackSource) -> Result<Vec<Track>> {
        let path = self.fixture_path(source)?;
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::Fetch(format!("cannot read {}: {}", path.display(), e))
        })?;
        let tracks: Vec<Track> = serde_json::from_str(&raw).map_err(|e| {
            Error::Fetch(format!("malformed track list in {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), track_count = tracks.len(), "Loaded fixture tracks");
        Ok(tracks)
    }
}
