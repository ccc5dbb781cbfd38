//! Tonearm - queue-based audio playback engine
//!
//! A single-instance playback engine built around a track queue. It drives
//! an external media element through a transport state machine, resolves
//! repeat modes at track ends, routes audio through an equalizer and
//! analyser graph, and publishes state, track, progress and error events.

pub mod audio;
pub mod config;
pub mod error;
pub mod state;

// Re-export key types for convenience
pub use {
    audio::{
        Backends, PlayerEngine, Track, TrackMetadataPatch,
        dsp::DspGraph,
        equalizer::{EqualizerBand, EqualizerOptions, EqualizerPreset},
        graph::{AnalyserConfig, AnalysisData, AudioGraph},
        media::{MediaBackend, MediaErrorCode, MediaEvent},
        metadata::{LoftyProbe, MetadataProbe},
        now_playing::{NowPlaying, RemoteCommand, TracingNowPlaying},
        progress::Progress,
        simulated::SimulatedMedia,
    },
    config::{Capability, CapabilitySet, SetupOptions, UpdateOptions},
    error::{PlayerError, PlayerResult},
    state::{EventKind, ListenerId, PlaybackState, PlayerEvent, RepeatMode},
};
