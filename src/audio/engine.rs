//! Audio playback engine.
//!
//! `PlayerEngine` is the caller-owned entry point: lifecycle, queue,
//! transport, settings, equalizer and introspection. It is constructed with
//! its collaborators, becomes usable after `setup_player`, and returns to
//! the not-set-up state on `destroy`.
//!
//! Media element callbacks and "now playing" buttons are queued on channels.
//! The host drives them with `process_pending_events` or `next_event`.

use std::sync::Arc;

use {
    anyhow::Error as AnyhowError,
    async_channel::{Receiver, Sender, unbounded},
    tokio::select,
    tracing::{debug, info},
};

use crate::{
    audio::{
        equalizer::{BAND_COUNT, EqualizerBand, EqualizerPreset},
        graph::{AnalyserConfig, AnalysisData},
        now_playing::RemoteCommand,
        progress::Progress,
        repeat::Direction,
        session::{Backends, Session},
        track::{Track, TrackMetadataPatch},
    },
    config::{SetupOptions, UpdateOptions},
    error::{ErrorReporter, PlayerError, PlayerResult},
    state::{EventBus, EventKind, ListenerId, PlaybackState, PlayerEvent, RepeatMode},
};

/// Single-instance playback engine.
pub struct PlayerEngine {
    bus: Arc<EventBus>,
    /// Present while not set up.
    backends: Option<Backends>,
    /// Present while set up.
    session: Option<Session>,
}

impl PlayerEngine {
    /// Creates an engine that still needs `setup_player`.
    #[must_use]
    pub fn new(backends: Backends) -> Self {
        Self {
            bus: Arc::new(EventBus::new()),
            backends: Some(backends),
            session: None,
        }
    }

    #[must_use]
    pub fn is_set_up(&self) -> bool {
        self.session.is_some()
    }

    fn session(&self) -> PlayerResult<&Session> {
        self.session.as_ref().ok_or(PlayerError::SetupNotCalled)
    }

    fn session_mut(&mut self) -> PlayerResult<&mut Session> {
        self.session.as_mut().ok_or(PlayerError::SetupNotCalled)
    }

    // Lifecycle

    /// Attaches the media element, prepares the audio graph and starts
    /// progress sampling. The state moves from `None` to `Ready`.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Options` for invalid options,
    /// `PlayerError::Configuration` if the player is already set up, or
    /// `PlayerError::MediaPlayback` if the media element cannot attach.
    pub fn setup_player(&mut self, options: SetupOptions) -> PlayerResult<()> {
        if self.session.is_some() {
            return Err(PlayerError::configuration("the player is already set up"));
        }
        options.validate()?;
        let Some(backends) = self.backends.take() else {
            return Err(PlayerError::PlayerNotInitialized);
        };

        let (media_tx, media_rx) = unbounded();
        if let Err(e) = backends.media.attach(media_tx) {
            self.backends = Some(backends);
            return Err(e.into());
        }

        self.session = Some(Session::open(
            backends,
            options,
            Arc::clone(&self.bus),
            media_rx,
        ));
        Ok(())
    }

    /// Merges partial options into the active configuration.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup, or
    /// `PlayerError::Options` for an invalid value, in which case nothing
    /// is applied.
    pub fn update_options(&mut self, update: UpdateOptions) -> PlayerResult<()> {
        self.session_mut()?.update_options(update)
    }

    /// Empties the queue and unloads the current source.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub fn reset(&mut self) -> PlayerResult<()> {
        self.session_mut()?.reset();
        Ok(())
    }

    /// Resets, stops sampling, closes the graph and detaches the media
    /// element. Does nothing when not set up.
    pub fn destroy(&mut self) {
        if let Some(session) = self.session.take() {
            self.backends = Some(session.close());
        }
    }

    /// Sender for transport commands from outside the host UI.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub fn remote_commands(&self) -> PlayerResult<Sender<RemoteCommand>> {
        Ok(self.session()?.remote_tx.clone())
    }

    // Queue

    /// Inserts `tracks` before `before`, or appends them.
    ///
    /// Adding to an empty queue makes the first track active and loads it
    /// paused.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup, or the load
    /// failure of the first track.
    pub async fn add(&mut self, tracks: Vec<Track>, before: Option<usize>) -> PlayerResult<()> {
        self.session_mut()?.add(tracks, before).await
    }

    /// Removes the tracks at `indices`.
    ///
    /// Removing the active track loads its replacement, or stops playback
    /// when the queue becomes empty.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::IndexOutOfBounds` without removing anything if
    /// any index is invalid.
    pub async fn remove(&mut self, indices: &[usize]) -> PlayerResult<()> {
        self.session_mut()?.remove(indices).await
    }

    /// # Errors
    ///
    /// Returns `PlayerError::IndexOutOfBounds` if either index is invalid.
    pub fn move_track(&mut self, from: usize, to: usize) -> PlayerResult<()> {
        self.session_mut()?.move_track(from, to)
    }

    /// Copy of the queue.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub fn get_queue(&self) -> PlayerResult<Vec<Track>> {
        Ok(self.session()?.queue.tracks())
    }

    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub fn get_track(&self, index: usize) -> PlayerResult<Option<Track>> {
        Ok(self.session()?.queue.get(index).cloned())
    }

    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub fn get_active_track(&self) -> PlayerResult<Option<Track>> {
        Ok(self.session()?.queue.active_track().cloned())
    }

    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub fn get_active_track_index(&self) -> PlayerResult<Option<usize>> {
        Ok(self.session()?.queue.active_index())
    }

    /// Merges `patch` into the track at `index`.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::IndexOutOfBounds` for an invalid index.
    pub fn update_metadata_for_track(
        &mut self,
        index: usize,
        patch: TrackMetadataPatch,
    ) -> PlayerResult<()> {
        self.session_mut()?.update_metadata(index, patch)
    }

    /// Whether the duration of the track at `index` has been probed.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub fn is_metadata_loaded(&self, index: usize) -> PlayerResult<bool> {
        Ok(self.session()?.queue.is_metadata_loaded(index))
    }

    // Transport

    /// Starts or resumes playback.
    ///
    /// Builds the audio graph on the first call. With nothing active the
    /// first track loads; when stopped at the end of the queue playback
    /// restarts from the first track.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::CapabilityDisabled`, `PlayerError::NoTrackLoaded`
    /// for an empty queue, or `PlayerError::MediaPlayback` if the media
    /// element refuses to play.
    pub async fn play(&mut self) -> PlayerResult<()> {
        self.session_mut()?.play().await
    }

    /// # Errors
    ///
    /// Returns `PlayerError::CapabilityDisabled` or `PlayerError::NoTrackLoaded`.
    pub fn pause(&mut self) -> PlayerResult<()> {
        self.session_mut()?.pause()
    }

    /// Stops playback and unloads the source, keeping the active index.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::CapabilityDisabled` or `PlayerError::NoTrackLoaded`.
    pub fn stop(&mut self) -> PlayerResult<()> {
        self.session_mut()?.stop()
    }

    /// # Errors
    ///
    /// Returns `PlayerError::CapabilityDisabled` or `PlayerError::NoTrackLoaded`.
    pub fn seek_to(&mut self, position: f64) -> PlayerResult<()> {
        self.session_mut()?.seek_to(position)
    }

    /// Seeks relative to the current position, staying inside the track.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::CapabilityDisabled` or `PlayerError::NoTrackLoaded`.
    pub fn seek_by(&mut self, offset: f64) -> PlayerResult<()> {
        self.session_mut()?.seek_by(offset)
    }

    /// Reloads the active track, keeping the play intent.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::NoTrackLoaded`, or the load failure.
    pub async fn retry(&mut self) -> PlayerResult<()> {
        self.session_mut()?.retry().await
    }

    /// Makes `index` active, optionally starting at `initial_position`.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::CapabilityDisabled` or
    /// `PlayerError::IndexOutOfBounds`.
    pub async fn skip(&mut self, index: usize, initial_position: Option<f64>) -> PlayerResult<()> {
        self.session_mut()?.skip(index, initial_position).await
    }

    /// # Errors
    ///
    /// Returns `PlayerError::NoAdjacentTrack` at the end of the queue with
    /// repeat off.
    pub async fn skip_to_next(&mut self, initial_position: Option<f64>) -> PlayerResult<()> {
        self.session_mut()?
            .skip_adjacent(Direction::Next, initial_position)
            .await
    }

    /// # Errors
    ///
    /// Returns `PlayerError::NoAdjacentTrack` at the start of the queue with
    /// repeat off.
    pub async fn skip_to_previous(&mut self, initial_position: Option<f64>) -> PlayerResult<()> {
        self.session_mut()?
            .skip_adjacent(Direction::Previous, initial_position)
            .await
    }

    // Settings

    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub fn set_repeat_mode(&mut self, mode: RepeatMode) -> PlayerResult<()> {
        debug!(?mode, "Repeat mode changed");
        self.session_mut()?.transport.set_repeat_mode(mode);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub fn get_repeat_mode(&self) -> PlayerResult<RepeatMode> {
        Ok(self.session()?.transport.repeat_mode())
    }

    /// Sets the volume, clamped to `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::CapabilityDisabled` or
    /// `PlayerError::PlayerNotInitialized`.
    pub fn set_volume(&mut self, volume: f32) -> PlayerResult<()> {
        self.session_mut()?.set_volume(volume)
    }

    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup, or
    /// `PlayerError::PlayerNotInitialized` once the media sink is detached.
    pub fn get_volume(&self) -> PlayerResult<f32> {
        Ok(self.session()?.require_media()?.volume())
    }

    /// Sets the playback rate, clamped to `[0.25, 2.0]`.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::CapabilityDisabled` or
    /// `PlayerError::PlayerNotInitialized`.
    pub fn set_rate(&mut self, rate: f32) -> PlayerResult<()> {
        self.session_mut()?.set_rate(rate)
    }

    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup, or
    /// `PlayerError::PlayerNotInitialized` once the media sink is detached.
    pub fn get_rate(&self) -> PlayerResult<f32> {
        Ok(self.session()?.require_media()?.rate())
    }

    // Equalizer

    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub fn set_equalizer_enabled(&mut self, enabled: bool) -> PlayerResult<()> {
        info!(enabled, "Equalizer toggled");
        self.session_mut()?.graph.set_equalizer_enabled(enabled);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub fn is_equalizer_enabled(&self) -> PlayerResult<bool> {
        Ok(self.session()?.graph.equalizer().is_enabled())
    }

    /// Stores a gain for `band`, clamped to `[-12, 12]` dB.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::IndexOutOfBounds` for `band >= 10`.
    pub fn set_equalizer_band_gain(&mut self, band: usize, gain: f32) -> PlayerResult<()> {
        self.session_mut()?.graph.set_band_gain(band, gain)
    }

    /// # Errors
    ///
    /// Returns `PlayerError::IndexOutOfBounds` for `band >= 10`.
    pub fn get_equalizer_band_gain(&self, band: usize) -> PlayerResult<f32> {
        self.session()?.graph.equalizer().band_gain(band)
    }

    /// Replaces all ten gains at once.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Configuration` unless exactly ten bands are given.
    pub fn set_equalizer_bands(&mut self, bands: &[EqualizerBand]) -> PlayerResult<()> {
        self.session_mut()?.graph.set_bands(bands)
    }

    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub fn get_equalizer_bands(&self) -> PlayerResult<[EqualizerBand; BAND_COUNT]> {
        Ok(*self.session()?.graph.equalizer().bands())
    }

    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub fn set_equalizer_preset(&mut self, preset: EqualizerPreset) -> PlayerResult<()> {
        info!(preset = preset.name(), "Equalizer preset applied");
        self.session_mut()?.graph.apply_preset(preset);
        Ok(())
    }

    /// Flattens every band.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub fn reset_equalizer(&mut self) -> PlayerResult<()> {
        self.session_mut()?.graph.reset_equalizer();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `PlayerError::Configuration` for an FFT size that is not a
    /// power of two in `[32, 32768]` or a smoothing outside `[0, 1]`.
    pub fn configure_audio_analyser(&mut self, fft_size: usize, smoothing: f32) -> PlayerResult<()> {
        self.session_mut()?
            .graph
            .configure_analyser(AnalyserConfig {
                fft_size,
                smoothing,
            })
    }

    /// Latest analyser output; `None` until the graph is connected.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub fn get_audio_analysis_data(&mut self) -> PlayerResult<Option<AnalysisData>> {
        Ok(self.session_mut()?.graph.analysis_data())
    }

    // Introspection

    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub fn get_playback_state(&self) -> PlayerResult<PlaybackState> {
        Ok(self.session()?.transport.state())
    }

    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub fn get_play_when_ready(&self) -> PlayerResult<bool> {
        Ok(self.session()?.transport.play_when_ready())
    }

    /// Position in seconds.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub fn get_position(&self) -> PlayerResult<f64> {
        Ok(self.session()?.media.position())
    }

    /// Duration in seconds, zero while unknown.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub fn get_duration(&self) -> PlayerResult<f64> {
        Ok(self.session()?.media.duration().unwrap_or(0.0))
    }

    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub fn get_buffered_position(&self) -> PlayerResult<f64> {
        Ok(self.session()?.media.buffered())
    }

    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub fn get_progress(&self) -> PlayerResult<Progress> {
        Ok(Progress::sample(self.session()?.media.as_ref()))
    }

    // Events

    /// Registers `handler` for events of `kind`. Listeners survive `destroy`.
    pub fn add_event_listener<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&PlayerEvent) + Send + Sync + 'static,
    {
        self.bus.add_event_listener(kind, handler)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.bus.remove_event_listener(id)
    }

    /// Receives every published event through a channel.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        self.bus.subscribe()
    }

    // Event processing

    /// Handles every queued media event, preload result and remote command.
    ///
    /// # Returns
    ///
    /// The number of items handled.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub async fn process_pending_events(&mut self) -> PlayerResult<usize> {
        let mut handled = 0;
        loop {
            let session = self.session_mut()?;
            if let Ok(event) = session.media_events.try_recv() {
                session.handle_media_event(event).await;
            } else if let Ok(preloaded) = session.preload_rx.try_recv() {
                session.apply_preload(preloaded);
            } else if let Ok(command) = session.remote_commands.try_recv() {
                self.handle_remote_command(command).await;
            } else {
                break;
            }
            handled += 1;
        }
        Ok(handled)
    }

    /// Waits for the next media event, preload result or remote command and
    /// handles it.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::SetupNotCalled` before setup.
    pub async fn next_event(&mut self) -> PlayerResult<()> {
        let session = self.session()?;
        let media_events = session.media_events.clone();
        let preloads = session.preload_rx.clone();
        let commands = session.remote_commands.clone();

        select! {
            Ok(event) = media_events.recv() => {
                self.session_mut()?.handle_media_event(event).await;
            }
            Ok(preloaded) = preloads.recv() => {
                self.session_mut()?.apply_preload(preloaded);
            }
            Ok(command) = commands.recv() => {
                self.handle_remote_command(command).await;
            }
            else => {}
        }
        Ok(())
    }

    /// Routes a transport button press to the matching gated operation.
    ///
    /// Failures are logged; the button press has no caller to report to.
    pub async fn handle_remote_command(&mut self, command: RemoteCommand) {
        debug!(?command, "Remote command");
        let result = match command {
            RemoteCommand::Play => self.play().await,
            RemoteCommand::Pause => self.pause(),
            RemoteCommand::Stop => self.stop(),
            RemoteCommand::Next => self.skip_to_next(None).await,
            RemoteCommand::Previous => self.skip_to_previous(None).await,
            RemoteCommand::SeekTo(position) => self.seek_to(position),
        };
        if let Err(e) = result {
            ErrorReporter::debug(
                &AnyhowError::new(e),
                &format!("remote command {command:?}"),
            );
        }
    }
}

impl Drop for PlayerEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}
