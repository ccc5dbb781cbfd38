//! State owned between `setup_player` and `destroy`.
//!
//! A `Session` holds the queue, the transport and the audio graph together
//! with the attached collaborators. `PlayerEngine` is a thin facade over it;
//! every transport rule lives here and in `transition`.

use std::sync::Arc;

use {
    async_channel::{Receiver, Sender, unbounded},
    tokio::sync::watch::{Sender as WatchSender, channel},
    tracing::{debug, info, warn},
};

use crate::{
    audio::{
        graph::{AudioGraph, GraphManager},
        media::{MediaBackend, MediaErrorCode, MediaEvent},
        metadata::MetadataProbe,
        now_playing::{NowPlaying, RemoteCommand},
        progress::{Progress, ProgressSampler, SamplerView},
        queue::{ActiveAfterRemoval, QueueStore},
        repeat::{Direction, Resolution, Trigger, resolve},
        track::{Track, TrackMetadataPatch},
        transition::{LoadRequest, Preloaded},
    },
    config::{Capability, SetupOptions, UpdateOptions},
    error::{PlayerError, PlayerResult},
    state::{EventBus, PlaybackState, PlayerEvent, Transport},
};

/// Distance kept from the end of a track by `seek_by`, in seconds.
pub const SEEK_END_EPSILON: f64 = 0.1;

/// Lowest accepted playback rate.
pub const MIN_RATE: f32 = 0.25;

/// Highest accepted playback rate.
pub const MAX_RATE: f32 = 2.0;

/// Collaborators driven by the engine.
///
/// They outlive sessions: `destroy` hands them back so the engine can be
/// set up again.
pub struct Backends {
    pub media: Arc<dyn MediaBackend>,
    pub graph: Box<dyn AudioGraph>,
    pub probe: Arc<dyn MetadataProbe>,
    pub now_playing: Option<Box<dyn NowPlaying>>,
}

pub(crate) struct Session {
    pub(crate) options: SetupOptions,
    pub(crate) queue: QueueStore,
    pub(crate) transport: Transport,
    pub(crate) graph: GraphManager,
    pub(crate) media: Arc<dyn MediaBackend>,
    pub(crate) probe: Arc<dyn MetadataProbe>,
    pub(crate) now_playing: Option<Box<dyn NowPlaying>>,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) media_events: Receiver<MediaEvent>,
    pub(crate) remote_tx: Sender<RemoteCommand>,
    pub(crate) remote_commands: Receiver<RemoteCommand>,
    pub(crate) preload_tx: Sender<Preloaded>,
    pub(crate) preload_rx: Receiver<Preloaded>,
    sampler: ProgressSampler,
    view: WatchSender<SamplerView>,
}

impl Session {
    /// Builds a session around an already attached media element.
    pub(crate) fn open(
        backends: Backends,
        options: SetupOptions,
        bus: Arc<EventBus>,
        media_events: Receiver<MediaEvent>,
    ) -> Self {
        let Backends {
            media,
            graph,
            probe,
            mut now_playing,
        } = backends;

        let (remote_tx, remote_commands) = unbounded();
        if let Some(now_playing) = now_playing.as_mut() {
            now_playing.attach(remote_tx.clone());
        }
        let (preload_tx, preload_rx) = unbounded();

        let mut graph = GraphManager::new(graph, options.equalizer.clone(), options.analyser);
        graph.prepare();

        let (view, view_rx) = channel(SamplerView::default());
        let sampler = ProgressSampler::start(
            options.progress_interval(),
            Arc::clone(&media),
            Arc::clone(&bus),
            view_rx,
        );

        let mut session = Self {
            options,
            queue: QueueStore::new(),
            transport: Transport::default(),
            graph,
            media,
            probe,
            now_playing,
            bus,
            media_events,
            remote_tx,
            remote_commands,
            preload_tx,
            preload_rx,
            sampler,
            view,
        };
        session.set_state(PlaybackState::Ready);
        info!("Player set up");
        session
    }

    /// Tears the session down and hands the collaborators back.
    pub(crate) fn close(mut self) -> Backends {
        self.reset();
        self.sampler.stop();
        self.media.detach();
        if let Some(now_playing) = self.now_playing.as_mut() {
            now_playing.clear();
            now_playing.detach();
        }
        info!("Player destroyed");
        Backends {
            media: self.media,
            graph: self.graph.into_graph(),
            probe: self.probe,
            now_playing: self.now_playing,
        }
    }

    /// Moves the transport to `state`, announcing real changes.
    pub(crate) fn set_state(&mut self, state: PlaybackState) {
        if !self.transport.set_state(state) {
            return;
        }
        debug!(?state, "Playback state changed");
        self.sync_view();
        if self.options.media_session
            && let Some(now_playing) = self.now_playing.as_mut()
        {
            now_playing.set_playback_state(state);
        }
        self.bus.publish(PlayerEvent::PlaybackState { state });
    }

    /// Tells the progress sampler what is active and whether it plays.
    pub(crate) fn sync_view(&self) {
        self.view.send_replace(SamplerView {
            track: self.queue.active_index(),
            playing: self.transport.state() == PlaybackState::Playing,
        });
    }

    pub(crate) fn publish_error(&self, code: MediaErrorCode, message: impl Into<String>) {
        self.bus.publish(PlayerEvent::PlaybackError {
            code,
            message: message.into(),
        });
    }

    pub(crate) fn publish_progress(&self) {
        let progress = Progress::sample(self.media.as_ref());
        self.bus
            .publish(progress.into_event(self.queue.active_index()));
    }

    pub(crate) fn publish_track_change(&self, prev_track: Option<usize>, next_track: Option<usize>) {
        info!(?prev_track, ?next_track, "Active track changed");
        self.bus.publish(PlayerEvent::PlaybackTrackChanged {
            prev_track,
            next_track,
        });
    }

    /// Pushes the active track to the "now playing" integration.
    pub(crate) fn refresh_now_playing(&mut self) {
        if !self.options.media_session {
            return;
        }
        let Some(now_playing) = self.now_playing.as_mut() else {
            return;
        };
        match self.queue.active_track() {
            Some(track) => now_playing.set_metadata(track),
            None => now_playing.clear(),
        }
    }

    fn restart_sampler(&mut self) {
        self.sampler.stop();
        self.sampler = ProgressSampler::start(
            self.options.progress_interval(),
            Arc::clone(&self.media),
            Arc::clone(&self.bus),
            self.view.subscribe(),
        );
    }

    fn require_active(&self) -> PlayerResult<usize> {
        self.queue.active_index().ok_or(PlayerError::NoTrackLoaded)
    }

    /// Merges partial options into the session.
    pub(crate) fn update_options(&mut self, update: UpdateOptions) -> PlayerResult<()> {
        let interval_changed = self.options.merge(update)?;
        if interval_changed {
            debug!(
                "Progress interval changed to {}s, restarting sampler",
                self.options.progress_update_interval
            );
            self.restart_sampler();
        }
        if self.options.media_session {
            self.refresh_now_playing();
        } else if let Some(now_playing) = self.now_playing.as_mut() {
            now_playing.clear();
        }
        Ok(())
    }

    /// Clears the queue and unloads the media; the repeat mode survives.
    pub(crate) fn reset(&mut self) {
        self.media.pause();
        self.media.clear_source();
        self.queue.clear();
        self.set_state(PlaybackState::None);
        self.transport.reset();
        self.refresh_now_playing();
        self.sync_view();
        info!("Player reset");
    }

    // Queue

    pub(crate) async fn add(
        &mut self,
        tracks: Vec<Track>,
        before: Option<usize>,
    ) -> PlayerResult<()> {
        let insertion = self.queue.insert(tracks, before);
        if insertion.into_empty {
            return self
                .load_track(LoadRequest::change_to(0, None).without_play_intent())
                .await;
        }
        self.sync_view();
        Ok(())
    }

    pub(crate) async fn remove(&mut self, indices: &[usize]) -> PlayerResult<()> {
        match self.queue.remove(indices)? {
            ActiveAfterRemoval::Kept => {
                self.sync_view();
                Ok(())
            }
            ActiveAfterRemoval::Replaced { removed } => {
                let index = self.require_active()?;
                debug!("Active track {removed} removed, loading its replacement at {index}");
                self.load_track(LoadRequest::change_to(index, Some(removed)))
                    .await
            }
            ActiveAfterRemoval::Emptied { removed } => {
                self.transport.finish_transition();
                self.transport.set_play_when_ready(false);
                self.media.pause();
                self.media.clear_source();
                self.set_state(PlaybackState::Stopped);
                self.publish_track_change(Some(removed), None);
                self.refresh_now_playing();
                self.sync_view();
                Ok(())
            }
        }
    }

    pub(crate) fn move_track(&mut self, from: usize, to: usize) -> PlayerResult<()> {
        self.queue.move_track(from, to)?;
        self.sync_view();
        Ok(())
    }

    pub(crate) fn update_metadata(
        &mut self,
        index: usize,
        patch: TrackMetadataPatch,
    ) -> PlayerResult<()> {
        self.queue.update_metadata(index, patch)?;
        if self.queue.active_index() == Some(index) {
            self.refresh_now_playing();
        }
        Ok(())
    }

    // Transport

    pub(crate) async fn play(&mut self) -> PlayerResult<()> {
        self.options.capabilities.check(Capability::Play)?;
        if self.queue.is_empty() {
            return Err(PlayerError::NoTrackLoaded);
        }

        if self.graph.connect_on_first_play().await.is_err() {
            debug!("Continuing playback without audio graph");
        }
        self.transport.set_play_when_ready(true);

        let Some(active) = self.queue.active_index() else {
            return self.load_track(LoadRequest::change_to(0, None)).await;
        };
        if self.transport.is_transitioning() {
            // Readiness starts playback.
            return Ok(());
        }
        match self.transport.state() {
            PlaybackState::Stopped => self.restart_from_stop(active).await,
            // A failed element only recovers through a reload.
            PlaybackState::Error => self.reload_active(active).await,
            _ => self.start_playback().await,
        }
    }

    async fn restart_from_stop(&mut self, active: usize) -> PlayerResult<()> {
        let position = self.media.position();
        if self.at_track_end() && active + 1 == self.queue.len() {
            info!("Queue finished, restarting from the first track");
            return self
                .load_track(LoadRequest::change_to(0, Some(active)))
                .await;
        }
        let resume_at = (position > 0.0).then_some(position);
        self.load_track(LoadRequest::reload(active).starting_at(resume_at))
            .await
    }

    /// Asks the media element to play.
    ///
    /// A rejection is broadcast as `PlaybackError` and returned.
    pub(crate) async fn start_playback(&mut self) -> PlayerResult<()> {
        match self.media.play().await {
            Ok(()) => {
                self.set_state(PlaybackState::Playing);
                Ok(())
            }
            Err(e) => {
                warn!("Play request rejected: {e}");
                self.transport.set_play_when_ready(false);
                self.publish_error(e.code(), e.to_string());
                Err(e.into())
            }
        }
    }

    pub(crate) fn pause(&mut self) -> PlayerResult<()> {
        self.options.capabilities.check(Capability::Pause)?;
        self.require_active()?;

        self.transport.set_play_when_ready(false);
        self.media.pause();
        if !self.transport.is_transitioning()
            && matches!(
                self.transport.state(),
                PlaybackState::Playing | PlaybackState::Buffering | PlaybackState::Ready
            )
        {
            self.set_state(PlaybackState::Paused);
        }
        Ok(())
    }

    pub(crate) fn stop(&mut self) -> PlayerResult<()> {
        self.options.capabilities.check(Capability::Stop)?;
        self.require_active()?;

        self.transport.set_play_when_ready(false);
        self.transport.finish_transition();
        self.media.pause();
        self.media.set_position(0.0);
        self.media.clear_source();
        self.set_state(PlaybackState::Stopped);
        Ok(())
    }

    pub(crate) fn seek_to(&mut self, position: f64) -> PlayerResult<()> {
        self.options.capabilities.check(Capability::SeekTo)?;
        self.require_active()?;
        if position.is_nan() {
            return Err(PlayerError::configuration("seek position is not a number"));
        }

        self.media.set_position(position.max(0.0));
        self.publish_progress();
        Ok(())
    }

    pub(crate) fn seek_by(&mut self, offset: f64) -> PlayerResult<()> {
        self.options.capabilities.check(Capability::SeekBy)?;
        self.require_active()?;
        if offset.is_nan() {
            return Err(PlayerError::configuration("seek offset is not a number"));
        }

        let target = clamp_seek(self.media.position() + offset, self.media.duration());
        self.media.set_position(target);
        self.publish_progress();
        Ok(())
    }

    /// Reloads the active track at its current position.
    pub(crate) async fn retry(&mut self) -> PlayerResult<()> {
        let active = self.require_active()?;
        info!("Retrying track {active}");
        self.reload_active(active).await
    }

    async fn reload_active(&mut self, active: usize) -> PlayerResult<()> {
        let live = self
            .queue
            .get(active)
            .is_some_and(|track| track.is_live_stream);
        let position = self.media.position();
        let resume_at = (!live && position > 0.0).then_some(position);
        self.load_track(LoadRequest::reload(active).starting_at(resume_at))
            .await
    }

    pub(crate) async fn skip(&mut self, index: usize, start_at: Option<f64>) -> PlayerResult<()> {
        self.options.capabilities.check(Capability::Skip)?;
        if index >= self.queue.len() {
            return Err(PlayerError::IndexOutOfBounds {
                index,
                len: self.queue.len(),
            });
        }

        let previous = self.queue.active_index();
        self.load_track(LoadRequest::change_to(index, previous).starting_at(start_at))
            .await
    }

    pub(crate) async fn skip_adjacent(
        &mut self,
        direction: Direction,
        start_at: Option<f64>,
    ) -> PlayerResult<()> {
        let capability = match direction {
            Direction::Next => Capability::SkipToNext,
            Direction::Previous => Capability::SkipToPrevious,
        };
        self.options.capabilities.check(capability)?;
        let active = self.require_active()?;

        let resolution = resolve(
            self.transport.repeat_mode(),
            Trigger::Skip(direction),
            active,
            self.queue.len(),
        )?;
        match resolution {
            Resolution::Replay { index } => self.load_track(LoadRequest::reload(index)).await,
            Resolution::Advance { index, wrapped } => {
                if wrapped {
                    debug!("Wrapping around the queue from {active} to {index}");
                }
                self.load_track(LoadRequest::change_to(index, Some(active)).starting_at(start_at))
                    .await
            }
            Resolution::EndOfQueue => Err(PlayerError::NoAdjacentTrack),
        }
    }

    pub(crate) fn set_volume(&mut self, volume: f32) -> PlayerResult<()> {
        self.options.capabilities.check(Capability::SetVolume)?;
        if volume.is_nan() {
            return Err(PlayerError::configuration("volume is not a number"));
        }
        self.require_media()?;
        self.media.set_volume(volume.clamp(0.0, 1.0));
        Ok(())
    }

    pub(crate) fn set_rate(&mut self, rate: f32) -> PlayerResult<()> {
        self.options.capabilities.check(Capability::SetRate)?;
        if rate.is_nan() {
            return Err(PlayerError::configuration("rate is not a number"));
        }
        self.require_media()?;
        self.media.set_rate(rate.clamp(MIN_RATE, MAX_RATE));
        Ok(())
    }

    pub(crate) fn require_media(&self) -> PlayerResult<&dyn MediaBackend> {
        if self.media.is_attached() {
            Ok(self.media.as_ref())
        } else {
            Err(PlayerError::PlayerNotInitialized)
        }
    }

    // Media events

    pub(crate) async fn handle_media_event(&mut self, event: MediaEvent) {
        debug!(?event, "Media event");
        let transitioning = self.transport.is_transitioning();
        let state = self.transport.state();

        match event {
            MediaEvent::CanPlay | MediaEvent::CanPlayThrough => self.on_ready(event).await,
            MediaEvent::Playing
                if !transitioning
                    && matches!(
                        state,
                        PlaybackState::Paused | PlaybackState::Buffering | PlaybackState::Playing
                    ) =>
            {
                self.transport.set_play_when_ready(true);
                self.set_state(PlaybackState::Playing);
            }
            MediaEvent::Paused
                if !transitioning
                    && !self.at_track_end()
                    && matches!(state, PlaybackState::Playing | PlaybackState::Buffering) =>
            {
                self.transport.set_play_when_ready(false);
                self.set_state(PlaybackState::Paused);
            }
            MediaEvent::Waiting if !transitioning && state == PlaybackState::Playing => {
                self.set_state(PlaybackState::Buffering);
            }
            MediaEvent::Ended if !transitioning => self.on_ended().await,
            MediaEvent::Error(code) => {
                warn!("Media element reported {code}: {}", code.message());
                self.transport.finish_transition();
                self.publish_error(code, code.message());
                self.set_state(PlaybackState::Error);
            }
            _ => {}
        }
    }

    /// Whether the element sits at the end of a finite source.
    ///
    /// Some elements pause on their own right before `Ended`; that pause
    /// must not clear the play intent of the auto-advance.
    fn at_track_end(&self) -> bool {
        self.media
            .duration()
            .is_some_and(|duration| self.media.position() >= duration - SEEK_END_EPSILON)
    }

    async fn on_ready(&mut self, event: MediaEvent) {
        if event == MediaEvent::CanPlay && self.options.wait_for_buffer {
            return;
        }

        if self.transport.finish_transition() {
            if !self.transport.play_when_ready() {
                self.set_state(PlaybackState::Paused);
            } else if self.start_playback().await.is_err() {
                self.set_state(PlaybackState::Paused);
            }
        } else if self.transport.state() == PlaybackState::Buffering {
            // Recovered from a stall.
            if self.transport.play_when_ready() {
                self.set_state(PlaybackState::Playing);
            } else {
                self.set_state(PlaybackState::Paused);
            }
        }
    }

    async fn on_ended(&mut self) {
        let Some(active) = self.queue.active_index() else {
            return;
        };
        let resolution = match resolve(
            self.transport.repeat_mode(),
            Trigger::TrackEnded,
            active,
            self.queue.len(),
        ) {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!("Could not resolve the track after {active}: {e}");
                return;
            }
        };

        let result = match resolution {
            Resolution::Replay { index } => {
                debug!("Repeating track {index}");
                self.load_track(LoadRequest::reload(index)).await
            }
            Resolution::Advance { index, .. } => {
                self.load_track(LoadRequest::change_to(index, Some(active)))
                    .await
            }
            Resolution::EndOfQueue => {
                info!("Reached the end of the queue");
                self.transport.set_play_when_ready(false);
                self.set_state(PlaybackState::Stopped);
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!("Failed to continue after track {active}: {e}");
        }
    }
}

/// Clamps a seek target into `[0, duration - SEEK_END_EPSILON]`.
///
/// Only the lower bound applies while the duration is unknown.
#[must_use]
pub fn clamp_seek(target: f64, duration: Option<f64>) -> f64 {
    let upper = duration.map_or(f64::INFINITY, |duration| {
        (duration - SEEK_END_EPSILON).max(0.0)
    });
    target.clamp(0.0, upper)
}

#[cfg(test)]
mod tests {
    use crate::audio::session::{SEEK_END_EPSILON, clamp_seek};

    #[test]
    fn test_clamp_seek_bounds() {
        assert_eq!(clamp_seek(-5.0, Some(100.0)), 0.0);
        assert_eq!(clamp_seek(500.0, Some(100.0)), 100.0 - SEEK_END_EPSILON);
        assert_eq!(clamp_seek(42.0, Some(100.0)), 42.0);
        assert_eq!(clamp_seek(500.0, None), 500.0);
        assert_eq!(clamp_seek(1.0, Some(0.05)), 0.0);
    }
}
