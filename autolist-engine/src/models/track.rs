//! Tracks and track sources

use autolist_common::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kind of collection tracks are fetched from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackSourceType {
    /// The user's liked-tracks collection
    Liked,
    /// A specific playlist (requires an id)
    Playlist,
}

impl fmt::Display for TrackSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackSourceType::Liked => write!(f, "liked"),
            TrackSourceType::Playlist => write!(f, "playlist"),
        }
    }
}

/// Where a batch of tracks comes from
///
/// Value object: two sources with the same fields are the same source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackSource {
    #[serde(rename = "type")]
    pub source_type: TrackSourceType,

    /// Playlist id; required when `source_type` is `playlist`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Human-readable label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl TrackSource {
    pub fn liked() -> Self {
        Self {
            source_type: TrackSourceType::Liked,
            id: None,
            label: Some("Liked tracks".to_string()),
        }
    }

    pub fn playlist(id: impl Into<String>, label: Option<String>) -> Self {
        Self {
            source_type: TrackSourceType::Playlist,
            id: Some(id.into()),
            label,
        }
    }

    /// Label shown to users, derived when none was given
    pub fn display_label(&self) -> String {
        if let Some(label) = self.label.as_deref().filter(|l| !l.trim().is_empty()) {
            return label.to_string();
        }
        match (&self.source_type, &self.id) {
            (TrackSourceType::Liked, _) => "Liked tracks".to_string(),
            (TrackSourceType::Playlist, Some(id)) => format!("Playlist {}", id),
            (TrackSourceType::Playlist, None) => "Playlist".to_string(),
        }
    }

    /// Playlist sources must carry a non-empty id
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.source_type == TrackSourceType::Playlist
            && self.id.as_deref().map_or(true, |id| id.trim().is_empty())
        {
            return Err(ValidationError::single(
                "source.id",
                "playlist sources require an id",
            ));
        }
        Ok(())
    }
}

/// A single music item
///
/// Immutable once produced by a fetch; `sources` holds the labels of the
/// sources it was observed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub artist: String,

    #[serde(default)]
    pub album: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<String>,

    #[serde(default)]
    pub sources: BTreeSet<String>,
}

impl Track {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        artist: impl Into<String>,
        album: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            artist: artist.into(),
            album: album.into(),
            release_date: None,
            added_at: None,
            sources: BTreeSet::new(),
        }
    }

    /// Track known only by id (playlist listings often carry nothing else)
    pub fn id_only(id: impl Into<String>) -> Self {
        Self::new(id, "", "", "")
    }

    pub fn with_source(mut self, label: impl Into<String>) -> Self {
        self.sources.insert(label.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_serializes_with_type_key() {
        let source = TrackSource::playlist("p1", Some("Road trip".to_string()));
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "playlist", "id": "p1", "label": "Road trip"})
        );

        let liked: TrackSource = serde_json::from_value(serde_json::json!({"type": "liked"})).unwrap();
        assert_eq!(liked.source_type, TrackSourceType::Liked);
        assert_eq!(liked.id, None);
    }

    #[test]
    fn playlist_without_id_is_invalid() {
        let source = TrackSource {
            source_type: TrackSourceType::Playlist,
            id: Some("  ".to_string()),
            label: None,
        };
        let err = source.validate().unwrap_err();
        assert_eq!(err.issues[0].path, "source.id");
        assert!(TrackSource::liked().validate().is_ok());
    }

    #[test]
    fn display_label_falls_back_by_type() {
        assert_eq!(TrackSource::playlist("p9", None).display_label(), "Playlist p9");
        let unnamed = TrackSource {
            source_type: TrackSourceType::Liked,
            id: None,
            label: None,
        };
        assert_eq!(unnamed.display_label(), "Liked tracks");
    }

    #[test]
    fn track_deserializes_with_only_an_id() {
        let track: Track = serde_json::from_value(serde_json::json!({"id": "t1"})).unwrap();
        assert_eq!(track, Track::id_only("t1"));
    }
}
