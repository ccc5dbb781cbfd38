//! Audio playback system.
//!
//! Provides the playback engine and its collaborators: the queue store, the
//! transport rules for track transitions and repeat handling, the audio
//! graph with its equalizer and analyser, progress sampling, and the media,
//! metadata and "now playing" seams.

#[cfg(test)]
mod engine_tests;

pub mod dsp;
pub mod engine;
pub mod equalizer;
pub mod graph;
pub mod media;
pub mod metadata;
pub mod now_playing;
pub mod progress;
pub mod queue;
pub mod repeat;
pub mod session;
pub mod simulated;
pub mod track;
pub mod transition;

pub use {
    engine::PlayerEngine,
    session::Backends,
    track::{Track, TrackMetadataPatch},
};
