//! The media element the engine drives.
//!
//! A `MediaBackend` wraps whatever actually decodes and renders audio. The
//! engine calls into it directly and hears back through `MediaEvent`s sent on
//! the channel handed over in `attach`.

use std::fmt::{Display, Formatter, Result as FmtResult};

use {
    async_channel::Sender,
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

/// Coarse failure category reported by a media element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaErrorCode {
    /// Fetching was aborted, or the play request was refused.
    Aborted,
    /// A network error interrupted fetching.
    Network,
    /// The media could not be decoded.
    Decode,
    /// The source format or locator is not supported.
    SourceNotSupported,
    /// Any other failure.
    Unknown,
}

impl MediaErrorCode {
    /// Human-readable description.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            MediaErrorCode::Aborted => "Playback was aborted",
            MediaErrorCode::Network => "A network error occurred while fetching the media",
            MediaErrorCode::Decode => "The media could not be decoded",
            MediaErrorCode::SourceNotSupported => "The media format is not supported",
            MediaErrorCode::Unknown => "An unknown playback error occurred",
        }
    }

    /// Short machine-friendly name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MediaErrorCode::Aborted => "aborted",
            MediaErrorCode::Network => "network",
            MediaErrorCode::Decode => "decode",
            MediaErrorCode::SourceNotSupported => "src_not_supported",
            MediaErrorCode::Unknown => "unknown",
        }
    }
}

impl Display for MediaErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Error type for media element operations.
#[derive(Error, Debug)]
pub enum MediaError {
    /// The element is not attached to an engine.
    #[error("Media element is not attached")]
    Detached,
    /// The source could not be assigned or loaded.
    #[error("Failed to load {url}: {reason}")]
    Load { url: String, reason: String },
    /// The element refused a play request.
    #[error("Play request rejected: {reason}")]
    Rejected { code: MediaErrorCode, reason: String },
}

impl MediaError {
    /// Failure category for event reporting.
    #[must_use]
    pub fn code(&self) -> MediaErrorCode {
        match self {
            MediaError::Detached => MediaErrorCode::Aborted,
            MediaError::Load { .. } => MediaErrorCode::SourceNotSupported,
            MediaError::Rejected { code, .. } => *code,
        }
    }
}

/// Notifications emitted by a media element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEvent {
    /// Enough data is available to start playing.
    CanPlay,
    /// Enough data is buffered to play through without stalling.
    CanPlayThrough,
    /// Playback started or resumed.
    Playing,
    /// Playback paused.
    ///
    /// A pause reported at the end of a finite source is treated as part of
    /// `Ended` and leaves the play intent alone.
    Paused,
    /// Playback stalled waiting for data.
    Waiting,
    /// The current source played to its end.
    Ended,
    /// Loading or decoding failed.
    Error(MediaErrorCode),
}

/// What the engine asks a media element to load.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSource {
    /// Playable locator: a path or URL.
    pub url: String,
    /// Whether the source is a live stream.
    pub is_live: bool,
    /// Known duration in seconds, if the track carries one.
    pub duration_hint: Option<f64>,
}

/// A media playback primitive.
///
/// Methods take `&self` so the element can be shared with the progress
/// sampler; implementations handle their own interior mutability.
///
/// Events are delivered in the order they happened. When a source runs
/// out, the element sends `Ended`; it may send `Paused` just before it, as
/// long as `position` already reports the end by then.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Connects the element to the engine's event channel.
    ///
    /// # Errors
    ///
    /// Returns `MediaError` if the underlying sink cannot be opened.
    fn attach(&self, events: Sender<MediaEvent>) -> Result<(), MediaError>;

    /// Releases the sink and stops emitting events.
    fn detach(&self);

    /// Whether a sink is currently attached.
    fn is_attached(&self) -> bool;

    /// Assigns a new source and starts loading it.
    ///
    /// Readiness is announced later through `CanPlay`/`CanPlayThrough`.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::Load` if the source cannot be assigned.
    fn load(&self, source: &MediaSource) -> Result<(), MediaError>;

    /// Drops the current source.
    fn clear_source(&self);

    /// Starts or resumes playback.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::Rejected` if the element refuses to play.
    async fn play(&self) -> Result<(), MediaError>;

    /// Pauses without moving the position.
    fn pause(&self);

    /// Current position in seconds.
    fn position(&self) -> f64;

    /// Moves the position, in seconds.
    fn set_position(&self, seconds: f64);

    /// Duration in seconds, `None` while unknown or for live streams.
    fn duration(&self) -> Option<f64>;

    /// End of the buffered range in seconds.
    fn buffered(&self) -> f64;

    /// Position representing "now" for a live stream.
    fn live_edge(&self) -> Option<f64>;

    fn volume(&self) -> f32;

    fn set_volume(&self, volume: f32);

    fn rate(&self) -> f32;

    fn set_rate(&self, rate: f32);
}
