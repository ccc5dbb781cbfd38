//! Track descriptors held by the queue.

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

use crate::audio::media::MediaSource;

/// A queued track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Playable locator: a path or URL.
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artwork: Option<String>,
    /// Duration in seconds, when known up front.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default)]
    pub is_live_stream: bool,
    /// Host-defined fields carried along untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Track {
    /// Creates a track with only the required fields.
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            artist: None,
            album: None,
            artwork: None,
            duration: None,
            is_live_stream: false,
            extra: Map::new(),
        }
    }

    /// The source handed to the media element.
    #[must_use]
    pub fn media_source(&self) -> MediaSource {
        MediaSource {
            url: self.url.clone(),
            is_live: self.is_live_stream,
            duration_hint: self.duration,
        }
    }

    /// Merges `patch` into this track.
    pub fn apply(&mut self, patch: TrackMetadataPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(artist) = patch.artist {
            self.artist = Some(artist);
        }
        if let Some(album) = patch.album {
            self.album = Some(album);
        }
        if let Some(artwork) = patch.artwork {
            self.artwork = Some(artwork);
        }
        if let Some(duration) = patch.duration {
            self.duration = Some(duration);
        }
        if let Some(is_live_stream) = patch.is_live_stream {
            self.is_live_stream = is_live_stream;
        }
        self.extra.extend(patch.extra);
    }
}

/// Fields to overwrite in `update_metadata_for_track`.
///
/// The locator is deliberately absent: a track keeps its source for life.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackMetadataPatch {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub artwork: Option<String>,
    pub duration: Option<f64>,
    pub is_live_stream: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
