//! Track transition protocol and next-track preloading.
//!
//! Every change of the active track goes through `Session::load_track`. The
//! transport stays in `TransportPhase::Transitioning` until the media element
//! reports readiness or the load fails, which keeps the element's own
//! play/pause/waiting callbacks from leaking out as state changes mid-swap.

use std::{sync::Arc, time::Duration};

use {
    anyhow::Error as AnyhowError,
    tokio::{runtime::Handle, time::timeout},
    tracing::{debug, warn},
};

use crate::{
    audio::{session::Session, track::TrackMetadataPatch},
    error::{ErrorReporter, PlayerError, PlayerResult},
    state::PlaybackState,
};

/// Upper bound on a single preload probe.
pub const PRELOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Whether a load announces a track change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrackChange {
    /// Same track reloaded: retry, repeat or a restart after stop.
    Silent,
    Announce { prev: Option<usize> },
}

/// Parameters of one track transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LoadRequest {
    pub index: usize,
    /// Keep the current play-when-ready intent; otherwise clear it.
    pub keep_play_intent: bool,
    /// Initial position for non-live tracks, in seconds.
    pub start_at: Option<f64>,
    pub change: TrackChange,
}

impl LoadRequest {
    /// Makes `index` active, announcing the change from `prev`.
    pub fn change_to(index: usize, prev: Option<usize>) -> Self {
        Self {
            index,
            keep_play_intent: true,
            start_at: None,
            change: TrackChange::Announce { prev },
        }
    }

    /// Reloads `index` without announcing a change.
    pub fn reload(index: usize) -> Self {
        Self {
            index,
            keep_play_intent: true,
            start_at: None,
            change: TrackChange::Silent,
        }
    }

    pub fn starting_at(self, start_at: Option<f64>) -> Self {
        Self { start_at, ..self }
    }

    pub fn without_play_intent(self) -> Self {
        Self {
            keep_play_intent: false,
            ..self
        }
    }
}

/// Duration learned for a queued track by the preloader.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Preloaded {
    pub index: usize,
    pub url: String,
    pub duration: f64,
}

impl Session {
    /// Swaps the media element over to the track at `request.index`.
    ///
    /// Returns once the source is assigned; readiness arrives later as a
    /// media event and finishes the transition.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::IndexOutOfBounds` for an invalid index, or
    /// `PlayerError::MediaPlayback` if the element rejects the source. The
    /// latter also moves the transport to `Error` and publishes
    /// `PlaybackError`.
    pub(crate) async fn load_track(&mut self, request: LoadRequest) -> PlayerResult<()> {
        let index = request.index;
        let track = self
            .queue
            .get(index)
            .cloned()
            .ok_or(PlayerError::IndexOutOfBounds {
                index,
                len: self.queue.len(),
            })?;

        self.transport.begin_transition();
        let resume = request.keep_play_intent && self.transport.play_when_ready();
        self.transport.set_play_when_ready(resume);

        self.media.pause();
        self.queue.set_active(Some(index))?;
        if let TrackChange::Announce { prev } = request.change {
            self.publish_track_change(prev, Some(index));
        }

        debug!(index, url = %track.url, resume, "Loading track");
        if let Err(e) = self.media.load(&track.media_source()) {
            warn!("Failed to load track {index}: {e}");
            self.transport.finish_transition();
            self.publish_error(e.code(), e.to_string());
            self.set_state(PlaybackState::Error);
            self.sync_view();
            return Err(e.into());
        }

        if track.is_live_stream {
            if let Some(edge) = self.media.live_edge() {
                self.media.set_position(edge);
            }
        } else if let Some(position) = request.start_at {
            self.media.set_position(position.max(0.0));
        }

        self.set_state(PlaybackState::Buffering);
        self.refresh_now_playing();
        self.sync_view();
        self.preload_after(index);
        Ok(())
    }

    /// Probes the duration of the track after `index` in the background.
    ///
    /// Live streams and already probed tracks are skipped. Failures are
    /// only logged.
    fn preload_after(&self, index: usize) {
        let next = index + 1;
        let Some(track) = self.queue.get(next) else {
            return;
        };
        if track.is_live_stream || self.queue.is_metadata_loaded(next) {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            return;
        };

        let probe = Arc::clone(&self.probe);
        let tx = self.preload_tx.clone();
        let source = track.media_source();
        runtime.spawn(async move {
            let outcome = timeout(PRELOAD_TIMEOUT, probe.probe_duration(&source)).await;
            match outcome {
                Ok(Ok(duration)) => {
                    let preloaded = Preloaded {
                        index: next,
                        url: source.url,
                        duration,
                    };
                    if tx.send(preloaded).await.is_err() {
                        debug!("Session closed before preload of track {next} finished");
                    }
                }
                Ok(Err(e)) => ErrorReporter::debug(
                    &AnyhowError::new(e).context(format!("probing {}", source.url)),
                    "preloading next track",
                ),
                Err(elapsed) => ErrorReporter::debug(
                    &AnyhowError::new(elapsed).context(format!("probing {}", source.url)),
                    "preloading next track",
                ),
            }
        });
    }

    /// Records a finished preload if the queue still holds the same track.
    pub(crate) fn apply_preload(&mut self, preloaded: Preloaded) {
        let Some(track) = self.queue.get(preloaded.index) else {
            return;
        };
        if track.url != preloaded.url {
            debug!(
                "Discarding preload for {}, the queue moved on",
                preloaded.url
            );
            return;
        }

        if track.duration.is_none() {
            let patch = TrackMetadataPatch {
                duration: Some(preloaded.duration),
                ..TrackMetadataPatch::default()
            };
            if let Err(e) = self.queue.update_metadata(preloaded.index, patch) {
                warn!("Failed to store preloaded duration: {e}");
                return;
            }
        }
        self.queue.mark_metadata_loaded(preloaded.index);
        debug!(
            "Preloaded track {} ({:.1}s)",
            preloaded.index, preloaded.duration
        );
    }
}
