//! Headless, clock-driven media element.
//!
//! `SimulatedMedia` renders nothing: its position only moves when `advance`
//! is called. It backs the demo binary and lets tests script readiness,
//! rejections, errors and track ends deterministically.

use std::{collections::HashSet, sync::Arc};

use {
    async_channel::Sender,
    async_trait::async_trait,
    parking_lot::Mutex,
    tracing::{debug, warn},
};

use crate::audio::media::{MediaBackend, MediaError, MediaErrorCode, MediaEvent, MediaSource};

/// Duration assumed for sources without a duration hint.
pub const DEFAULT_SIMULATED_DURATION: f64 = 180.0;

/// How far ahead of the position the simulated buffer reaches, in seconds.
const BUFFER_AHEAD: f64 = 30.0;

/// Live edge of a freshly loaded live source, in seconds.
const INITIAL_LIVE_EDGE: f64 = 60.0;

#[derive(Debug)]
struct SimulatedState {
    events: Option<Sender<MediaEvent>>,
    source: Option<MediaSource>,
    position: f64,
    duration: Option<f64>,
    live_edge: f64,
    playing: bool,
    volume: f32,
    rate: f32,
    auto_ready: bool,
    reject_play: Option<MediaErrorCode>,
    failing_urls: HashSet<String>,
    load_count: usize,
}

impl SimulatedState {
    fn emit(&self, event: MediaEvent) {
        if let Some(tx) = &self.events
            && let Err(e) = tx.try_send(event)
        {
            warn!("SimulatedMedia: Failed to send {event:?}: {e}");
        }
    }
}

/// A media element driven by an explicit clock.
///
/// Clones share the same element, so a test or host can keep a handle
/// after giving one to the engine.
#[derive(Debug, Clone)]
pub struct SimulatedMedia {
    state: Arc<Mutex<SimulatedState>>,
}

impl Default for SimulatedMedia {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedMedia {
    /// Creates an element that reports readiness as soon as a source loads.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimulatedState {
                events: None,
                source: None,
                position: 0.0,
                duration: None,
                live_edge: INITIAL_LIVE_EDGE,
                playing: false,
                volume: 1.0,
                rate: 1.0,
                auto_ready: true,
                reject_play: None,
                failing_urls: HashSet::new(),
                load_count: 0,
            })),
        }
    }

    /// Controls whether `load` immediately emits `CanPlay` and `CanPlayThrough`.
    pub fn set_auto_ready(&self, auto_ready: bool) {
        self.state.lock().auto_ready = auto_ready;
    }

    /// Makes subsequent `play` calls fail with `code`, or succeed again with `None`.
    pub fn set_reject_play(&self, code: Option<MediaErrorCode>) {
        self.state.lock().reject_play = code;
    }

    /// Makes `load` fail for `url`.
    pub fn fail_loads_of(&self, url: impl Into<String>) {
        self.state.lock().failing_urls.insert(url.into());
    }

    /// Injects an arbitrary event, as a real element would on its own.
    pub fn emit(&self, event: MediaEvent) {
        self.state.lock().emit(event);
    }

    /// Moves the clock forward by `seconds` of wall time.
    ///
    /// Emits `Ended` when a finite source reaches its duration.
    pub fn advance(&self, seconds: f64) {
        let mut state = self.state.lock();
        if state.source.is_none() {
            return;
        }
        state.live_edge += seconds;
        if !state.playing {
            return;
        }
        state.position += seconds * f64::from(state.rate);
        if let Some(duration) = state.duration
            && state.position >= duration
        {
            state.position = duration;
            state.playing = false;
            debug!("SimulatedMedia: Reached end of source");
            state.emit(MediaEvent::Ended);
        }
    }

    /// Locator of the loaded source.
    #[must_use]
    pub fn current_url(&self) -> Option<String> {
        self.state.lock().source.as_ref().map(|source| source.url.clone())
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    /// Number of successful `load` calls so far.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.state.lock().load_count
    }
}

#[async_trait]
impl MediaBackend for SimulatedMedia {
    fn attach(&self, events: Sender<MediaEvent>) -> Result<(), MediaError> {
        self.state.lock().events = Some(events);
        Ok(())
    }

    fn detach(&self) {
        let mut state = self.state.lock();
        state.events = None;
        state.source = None;
        state.playing = false;
        state.position = 0.0;
    }

    fn is_attached(&self) -> bool {
        self.state.lock().events.is_some()
    }

    fn load(&self, source: &MediaSource) -> Result<(), MediaError> {
        let mut state = self.state.lock();
        if state.events.is_none() {
            return Err(MediaError::Detached);
        }
        if state.failing_urls.contains(&source.url) {
            return Err(MediaError::Load {
                url: source.url.clone(),
                reason: "source rejected by simulated element".to_string(),
            });
        }

        state.duration = if source.is_live {
            None
        } else {
            Some(source.duration_hint.unwrap_or(DEFAULT_SIMULATED_DURATION))
        };
        state.source = Some(source.clone());
        state.position = 0.0;
        state.live_edge = INITIAL_LIVE_EDGE;
        state.playing = false;
        state.load_count += 1;

        if state.auto_ready {
            state.emit(MediaEvent::CanPlay);
            state.emit(MediaEvent::CanPlayThrough);
        }
        Ok(())
    }

    fn clear_source(&self) {
        let mut state = self.state.lock();
        state.source = None;
        state.duration = None;
        state.playing = false;
        state.position = 0.0;
    }

    async fn play(&self) -> Result<(), MediaError> {
        let mut state = self.state.lock();
        if let Some(code) = state.reject_play {
            return Err(MediaError::Rejected {
                code,
                reason: "play request refused".to_string(),
            });
        }
        if state.source.is_none() {
            return Err(MediaError::Rejected {
                code: MediaErrorCode::SourceNotSupported,
                reason: "no source assigned".to_string(),
            });
        }
        if !state.playing {
            state.playing = true;
            state.emit(MediaEvent::Playing);
        }
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        if state.playing {
            state.playing = false;
            state.emit(MediaEvent::Paused);
        }
    }

    fn position(&self) -> f64 {
        self.state.lock().position
    }

    fn set_position(&self, seconds: f64) {
        let mut state = self.state.lock();
        let upper = state.duration.unwrap_or(f64::MAX);
        state.position = seconds.clamp(0.0, upper);
    }

    fn duration(&self) -> Option<f64> {
        self.state.lock().duration
    }

    fn buffered(&self) -> f64 {
        let state = self.state.lock();
        if state.source.is_none() {
            return 0.0;
        }
        let ahead = state.position + BUFFER_AHEAD;
        state.duration.map_or(ahead, |duration| ahead.min(duration))
    }

    fn live_edge(&self) -> Option<f64> {
        let state = self.state.lock();
        state
            .source
            .as_ref()
            .filter(|source| source.is_live)
            .map(|_| state.live_edge)
    }

    fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    fn set_volume(&self, volume: f32) {
        self.state.lock().volume = volume;
    }

    fn rate(&self) -> f32 {
        self.state.lock().rate
    }

    fn set_rate(&self, rate: f32) {
        self.state.lock().rate = rate;
    }
}
