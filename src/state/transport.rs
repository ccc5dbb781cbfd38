//! Transport state: playback state, repeat mode and load phase.

use serde::{Deserialize, Serialize};

/// Current playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackState {
    /// The player has not been set up, or was reset.
    #[default]
    None,
    /// Set up and waiting for a track.
    Ready,
    /// Audio is playing.
    Playing,
    /// A track is loaded and paused.
    Paused,
    /// Playback was stopped or reached the end of the queue.
    Stopped,
    /// A track is loading or the media element is starved.
    Buffering,
    /// The media element reported a failure.
    Error,
}

/// What happens when a track ends or a skip reaches a queue boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RepeatMode {
    #[default]
    Off,
    Track,
    Queue,
}

/// Whether a track swap is in flight.
///
/// While `Transitioning`, play/pause/waiting callbacks from the media
/// element are ignored; the phase returns to `Idle` once the load reports
/// readiness, fails, or is superseded by a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportPhase {
    #[default]
    Idle,
    Transitioning,
}

/// Playback state machine owned by the engine.
#[derive(Debug, Default)]
pub struct Transport {
    state: PlaybackState,
    phase: TransportPhase,
    play_when_ready: bool,
    repeat_mode: RepeatMode,
}

impl Transport {
    /// Current playback state.
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Moves to `state`.
    ///
    /// # Returns
    ///
    /// `true` if the state actually changed. Setting the current state again
    /// is a no-op so observers never see duplicates.
    pub fn set_state(&mut self, state: PlaybackState) -> bool {
        if self.state == state {
            return false;
        }
        self.state = state;
        true
    }

    #[must_use]
    pub fn phase(&self) -> TransportPhase {
        self.phase
    }

    #[must_use]
    pub fn is_transitioning(&self) -> bool {
        self.phase == TransportPhase::Transitioning
    }

    /// Enters the transitioning phase for a new load.
    pub fn begin_transition(&mut self) {
        self.phase = TransportPhase::Transitioning;
    }

    /// Leaves the transitioning phase.
    ///
    /// # Returns
    ///
    /// `true` if a transition was in flight.
    pub fn finish_transition(&mut self) -> bool {
        let was_transitioning = self.is_transitioning();
        self.phase = TransportPhase::Idle;
        was_transitioning
    }

    #[must_use]
    pub fn play_when_ready(&self) -> bool {
        self.play_when_ready
    }

    pub fn set_play_when_ready(&mut self, play_when_ready: bool) {
        self.play_when_ready = play_when_ready;
    }

    #[must_use]
    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
    }

    /// Clears everything except the repeat mode.
    pub fn reset(&mut self) {
        self.state = PlaybackState::None;
        self.phase = TransportPhase::Idle;
        self.play_when_ready = false;
    }
}
