//! Transport state and event publication.
//!
//! This module holds the playback state machine and the bus through which
//! every change is announced to observers.

pub mod events;
pub mod transport;

pub use {
    events::{EventBus, EventKind, ListenerId, PlayerEvent},
    transport::{PlaybackState, RepeatMode, Transport, TransportPhase},
};
