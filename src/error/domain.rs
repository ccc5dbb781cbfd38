//! Domain-specific error types using `thiserror`.
//!
//! This module defines the error enum surfaced by every public player
//! operation, along with the collaborator errors that feed into it.

use std::result::Result as StdResult;

use thiserror::Error;

use crate::{
    audio::media::{MediaError, MediaErrorCode},
    config::{Capability, OptionsError},
};

/// Errors returned by player operations.
#[derive(Error, Debug)]
pub enum PlayerError {
    /// An operation was attempted before `setup_player`.
    #[error("The player is not set up. Call setup_player first")]
    SetupNotCalled,
    /// The requested capability is not in the configured capability set.
    #[error("Capability disabled: {capability}")]
    CapabilityDisabled { capability: Capability },
    /// A queue or band index is outside the valid range.
    #[error("Index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: usize, len: usize },
    /// No track is active.
    #[error("No track loaded")]
    NoTrackLoaded,
    /// There is no track in the requested direction.
    #[error("No adjacent track in queue")]
    NoAdjacentTrack,
    /// The underlying media sink is missing.
    #[error("Player not initialized")]
    PlayerNotInitialized,
    /// The media element failed to load or play.
    #[error("Playback error ({code}): {message}")]
    MediaPlayback {
        code: MediaErrorCode,
        message: String,
    },
    /// Invalid configuration value.
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
    /// Options could not be loaded or validated.
    #[error("Options error: {0}")]
    Options(#[from] OptionsError),
}

impl PlayerError {
    /// Creates a new `Configuration` error.
    ///
    /// # Arguments
    ///
    /// * `reason` - Why the configuration was rejected.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}

impl From<MediaError> for PlayerError {
    fn from(error: MediaError) -> Self {
        Self::MediaPlayback {
            code: error.code(),
            message: error.to_string(),
        }
    }
}

/// Result alias for player operations.
pub type PlayerResult<T> = StdResult<T, PlayerError>;
