//! Metadata probing using the `lofty` crate.
//!
//! The engine only needs a source's duration ahead of time (to warm the
//! metadata-loaded cache for the next track). `LoftyProbe` answers that for
//! local files and can also build a `Track` from a file's tags.

use std::path::{Path, PathBuf};

use {
    async_trait::async_trait,
    lofty::{
        error::LoftyError,
        prelude::{AudioFile, TaggedFileExt},
        probe::Probe,
        tag::Accessor,
    },
    thiserror::Error,
    tokio::task::spawn_blocking,
};

use crate::audio::{media::MediaSource, track::Track};

/// Error type for metadata probing.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Failed to read or parse the audio file.
    #[error("Failed to read audio file: {0}")]
    ReadError(#[from] LoftyError),
    /// The locator is not something this probe can open.
    #[error("Unsupported source: {url}")]
    UnsupportedSource { url: String },
    /// The probe task did not complete.
    #[error("Probe task failed: {reason}")]
    TaskFailed { reason: String },
}

/// Loads only the metadata of a source, without playing it.
#[async_trait]
pub trait MetadataProbe: Send + Sync {
    /// Resolves the source's duration in seconds.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError` if the source cannot be opened or parsed.
    async fn probe_duration(&self, source: &MediaSource) -> Result<f64, ProbeError>;
}

/// Probe backed by `lofty`, for local paths and `file://` URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyProbe;

impl LoftyProbe {
    /// Builds a track from a file's tags.
    ///
    /// Falls back to the file stem when the title tag is missing.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::ReadError` if the file cannot be parsed.
    pub fn read_track(path: impl AsRef<Path>) -> Result<Track, ProbeError> {
        let path = path.as_ref();
        let tagged_file = Probe::open(path)?.read()?;
        let tag = tagged_file.primary_tag();

        let fallback_title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut track = Track::new(
            path.to_string_lossy(),
            tag.and_then(|tag| tag.title().map(|s| s.to_string()))
                .unwrap_or(fallback_title),
        );
        track.artist = tag.and_then(|tag| tag.artist().map(|s| s.to_string()));
        track.album = tag.and_then(|tag| tag.album().map(|s| s.to_string()));
        track.duration = Some(tagged_file.properties().duration().as_secs_f64());
        Ok(track)
    }

    fn local_path(url: &str) -> Option<PathBuf> {
        if let Some(path) = url.strip_prefix("file://") {
            return Some(PathBuf::from(path));
        }
        if url.contains("://") {
            return None;
        }
        Some(PathBuf::from(url))
    }
}

#[async_trait]
impl MetadataProbe for LoftyProbe {
    async fn probe_duration(&self, source: &MediaSource) -> Result<f64, ProbeError> {
        let path = Self::local_path(&source.url).ok_or_else(|| ProbeError::UnsupportedSource {
            url: source.url.clone(),
        })?;

        spawn_blocking(move || -> Result<f64, ProbeError> {
            let tagged_file = Probe::open(&path)?.read()?;
            Ok(tagged_file.properties().duration().as_secs_f64())
        })
        .await
        .map_err(|e| ProbeError::TaskFailed {
            reason: e.to_string(),
        })?
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::audio::{
        media::MediaSource,
        metadata::{LoftyProbe, MetadataProbe, ProbeError},
    };

    fn source(url: &str) -> MediaSource {
        MediaSource {
            url: url.to_string(),
            is_live: false,
            duration_hint: None,
        }
    }

    #[test]
    fn test_local_path_resolution() {
        assert_eq!(
            LoftyProbe::local_path("file:///music/a.flac"),
            Some(PathBuf::from("/music/a.flac"))
        );
        assert_eq!(
            LoftyProbe::local_path("music/a.flac"),
            Some(PathBuf::from("music/a.flac"))
        );
        assert_eq!(LoftyProbe::local_path("https://host/a.mp3"), None);
    }

    #[tokio::test]
    async fn test_probe_rejects_remote_sources() {
        let result = LoftyProbe.probe_duration(&source("https://host/a.mp3")).await;
        assert!(matches!(result, Err(ProbeError::UnsupportedSource { .. })));
    }

    #[tokio::test]
    async fn test_probe_nonexistent_file() {
        let result = LoftyProbe
            .probe_duration(&source("/nonexistent/file.flac"))
            .await;
        assert!(matches!(result, Err(ProbeError::ReadError(_))));
    }

    #[test]
    fn test_read_track_nonexistent_file() {
        assert!(LoftyProbe::read_track("/nonexistent/file.flac").is_err());
    }
}
