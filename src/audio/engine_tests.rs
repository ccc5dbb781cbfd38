//! Scenario tests for the playback engine.
//!
//! These tests drive `PlayerEngine` through `SimulatedMedia` and `DspGraph`,
//! covering transport transitions, repeat handling, track transitions,
//! error reporting and the equalizer surface.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use {
        async_channel::Receiver,
        async_trait::async_trait,
        parking_lot::Mutex,
        tokio::{
            task::yield_now,
            time::{Duration, timeout},
        },
    };

    use crate::{
        audio::{
            dsp::DspGraph,
            engine::PlayerEngine,
            equalizer::EqualizerPreset,
            media::{MediaBackend, MediaErrorCode, MediaEvent, MediaSource},
            metadata::{MetadataProbe, ProbeError},
            now_playing::{NowPlaying, RemoteCommand},
            session::{Backends, SEEK_END_EPSILON},
            simulated::SimulatedMedia,
            track::{Track, TrackMetadataPatch},
        },
        config::{Capability, CapabilitySet, SetupOptions, UpdateOptions},
        error::PlayerError,
        state::{EventKind, PlaybackState, PlayerEvent, RepeatMode},
    };

    // Default timeout in milliseconds for waiting on background tasks
    const TEST_TIMEOUT_MS: u64 = 2000;

    const PROBED_DURATION: f64 = 42.0;

    struct StubProbe;

    #[async_trait]
    impl MetadataProbe for StubProbe {
        async fn probe_duration(&self, source: &MediaSource) -> Result<f64, ProbeError> {
            if source.url.contains("broken") {
                return Err(ProbeError::UnsupportedSource {
                    url: source.url.clone(),
                });
            }
            Ok(PROBED_DURATION)
        }
    }

    #[derive(Clone, Default)]
    struct RecordingNowPlaying {
        shown: Arc<Mutex<Vec<String>>>,
        cleared: Arc<Mutex<usize>>,
    }

    impl NowPlaying for RecordingNowPlaying {
        fn attach(&mut self, _commands: async_channel::Sender<RemoteCommand>) {}

        fn detach(&mut self) {}

        fn set_metadata(&mut self, track: &Track) {
            self.shown.lock().push(track.title.clone());
        }

        fn set_playback_state(&mut self, _state: PlaybackState) {}

        fn clear(&mut self) {
            *self.cleared.lock() += 1;
        }
    }

    struct Harness {
        engine: PlayerEngine,
        media: SimulatedMedia,
        graph: DspGraph,
        now_playing: RecordingNowPlaying,
        events: Receiver<PlayerEvent>,
    }

    fn unstarted() -> Harness {
        let media = SimulatedMedia::new();
        let graph = DspGraph::new(48_000.0);
        let now_playing = RecordingNowPlaying::default();
        let engine = PlayerEngine::new(Backends {
            media: Arc::new(media.clone()),
            graph: Box::new(graph.clone()),
            probe: Arc::new(StubProbe),
            now_playing: Some(Box::new(now_playing.clone())),
        });
        let events = engine.subscribe();
        Harness {
            engine,
            media,
            graph,
            now_playing,
            events,
        }
    }

    fn harness_with(options: SetupOptions) -> Harness {
        let mut harness = unstarted();
        harness.engine.setup_player(options).unwrap();
        drain(&harness.events);
        harness
    }

    fn harness() -> Harness {
        harness_with(SetupOptions::default())
    }

    fn create_test_tracks(count: usize) -> Vec<Track> {
        (0..count)
            .map(|i| Track {
                duration: Some(10.0),
                ..Track::new(format!("/music/track_{i}.flac"), format!("Track {i}"))
            })
            .collect()
    }

    /// Lets background tasks run and handles everything they queued.
    async fn settle(engine: &mut PlayerEngine) {
        for _ in 0..4 {
            yield_now().await;
            engine.process_pending_events().await.unwrap();
        }
    }

    fn drain(events: &Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
        std::iter::from_fn(|| events.try_recv().ok()).collect()
    }

    fn track_changes(events: &[PlayerEvent]) -> Vec<(Option<usize>, Option<usize>)> {
        events
            .iter()
            .filter_map(|event| match event {
                PlayerEvent::PlaybackTrackChanged {
                    prev_track,
                    next_track,
                } => Some((*prev_track, *next_track)),
                _ => None,
            })
            .collect()
    }

    fn error_codes(events: &[PlayerEvent]) -> Vec<MediaErrorCode> {
        events
            .iter()
            .filter_map(|event| match event {
                PlayerEvent::PlaybackError { code, .. } => Some(*code),
                _ => None,
            })
            .collect()
    }

    /// Harness with `count` tracks queued and loaded, paused at the first.
    async fn loaded(count: usize) -> Harness {
        let mut h = harness();
        h.engine
            .add(create_test_tracks(count), None)
            .await
            .unwrap();
        settle(&mut h.engine).await;
        drain(&h.events);
        h
    }

    /// Harness with `count` tracks queued, playing the first.
    async fn playing(count: usize) -> Harness {
        let mut h = loaded(count).await;
        h.engine.play().await.unwrap();
        settle(&mut h.engine).await;
        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Playing
        );
        drain(&h.events);
        h
    }

    #[tokio::test]
    async fn test_operations_before_setup_fail() {
        let mut h = unstarted();

        assert!(matches!(
            h.engine.play().await,
            Err(PlayerError::SetupNotCalled)
        ));
        assert!(matches!(
            h.engine.get_queue(),
            Err(PlayerError::SetupNotCalled)
        ));
        assert!(matches!(
            h.engine.get_volume(),
            Err(PlayerError::SetupNotCalled)
        ));
        assert!(matches!(
            h.engine.get_rate(),
            Err(PlayerError::SetupNotCalled)
        ));
    }

    #[tokio::test]
    async fn test_getters_need_attached_media() {
        let h = harness();
        assert_eq!(h.engine.get_volume().unwrap(), 1.0);

        h.media.detach();

        assert!(matches!(
            h.engine.get_volume(),
            Err(PlayerError::PlayerNotInitialized)
        ));
        assert!(matches!(
            h.engine.get_rate(),
            Err(PlayerError::PlayerNotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_setup_moves_to_ready() {
        let mut h = unstarted();
        h.engine.setup_player(SetupOptions::default()).unwrap();

        assert_eq!(h.engine.get_playback_state().unwrap(), PlaybackState::Ready);
        assert_eq!(
            drain(&h.events),
            vec![PlayerEvent::PlaybackState {
                state: PlaybackState::Ready
            }]
        );

        let again = h.engine.setup_player(SetupOptions::default());
        assert!(matches!(again, Err(PlayerError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_setup_rejects_invalid_options() {
        let mut h = unstarted();
        let options = SetupOptions {
            progress_update_interval: 0.0,
            ..SetupOptions::default()
        };

        assert!(matches!(
            h.engine.setup_player(options),
            Err(PlayerError::Options(_))
        ));
        assert!(!h.engine.is_set_up());
        h.engine.setup_player(SetupOptions::default()).unwrap();
    }

    #[tokio::test]
    async fn test_listeners_run_synchronously_in_order() {
        let h = unstarted();
        let mut engine = h.engine;
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        engine.add_event_listener(EventKind::PlaybackState, move |event| {
            first.lock().push(format!("first {event:?}"));
        });
        let second = Arc::clone(&seen);
        engine.add_event_listener(EventKind::PlaybackState, move |event| {
            second.lock().push(format!("second {event:?}"));
        });

        engine.setup_player(SetupOptions::default()).unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].starts_with("first"));
        assert!(seen[1].starts_with("second"));
    }

    #[tokio::test]
    async fn test_first_add_emits_single_track_change() {
        let mut h = harness();

        h.engine.add(create_test_tracks(1), None).await.unwrap();

        let events = drain(&h.events);
        assert_eq!(track_changes(&events), vec![(None, Some(0))]);
        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Buffering
        );
        assert_eq!(h.engine.get_active_track_index().unwrap(), Some(0));

        // The first track loads paused.
        settle(&mut h.engine).await;
        assert_eq!(h.engine.get_playback_state().unwrap(), PlaybackState::Paused);
        assert!(track_changes(&drain(&h.events)).is_empty());
    }

    #[tokio::test]
    async fn test_play_with_empty_queue_fails() {
        let mut h = harness();

        assert!(matches!(
            h.engine.play().await,
            Err(PlayerError::NoTrackLoaded)
        ));
        assert!(matches!(h.engine.pause(), Err(PlayerError::NoTrackLoaded)));
        assert!(matches!(h.engine.stop(), Err(PlayerError::NoTrackLoaded)));
        assert!(matches!(
            h.engine.seek_to(3.0),
            Err(PlayerError::NoTrackLoaded)
        ));
    }

    #[tokio::test]
    async fn test_play_connects_graph_once() {
        let mut h = loaded(2).await;
        assert!(!h.graph.is_connected());

        h.engine.play().await.unwrap();
        assert!(h.graph.is_connected());
        assert!(h.media.is_playing());

        h.engine.pause().unwrap();
        h.engine.play().await.unwrap();
        assert_eq!(h.graph.source_creations(), 1);
    }

    #[tokio::test]
    async fn test_pause_keeps_position() {
        let mut h = playing(1).await;
        h.media.advance(4.0);

        h.engine.pause().unwrap();
        settle(&mut h.engine).await;

        assert_eq!(h.engine.get_playback_state().unwrap(), PlaybackState::Paused);
        assert!(!h.engine.get_play_when_ready().unwrap());
        assert_eq!(h.engine.get_position().unwrap(), 4.0);
    }

    #[tokio::test]
    async fn test_queue_plays_through_then_stops() {
        let mut h = playing(2).await;

        h.media.advance(10.0);
        settle(&mut h.engine).await;
        assert_eq!(h.engine.get_active_track_index().unwrap(), Some(1));
        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Playing
        );
        assert_eq!(track_changes(&drain(&h.events)), vec![(Some(0), Some(1))]);

        h.media.advance(10.0);
        settle(&mut h.engine).await;
        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Stopped
        );
        // Finished, not "never started".
        assert_eq!(h.engine.get_active_track_index().unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_play_after_end_of_queue_restarts_from_first_track() {
        let mut h = playing(2).await;
        h.media.advance(10.0);
        settle(&mut h.engine).await;
        h.media.advance(10.0);
        settle(&mut h.engine).await;
        drain(&h.events);

        h.engine.play().await.unwrap();
        settle(&mut h.engine).await;

        assert_eq!(h.engine.get_active_track_index().unwrap(), Some(0));
        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Playing
        );
        assert_eq!(track_changes(&drain(&h.events)), vec![(Some(1), Some(0))]);
    }

    #[tokio::test]
    async fn test_play_after_seek_in_finished_track_resumes_there() {
        let mut h = playing(1).await;
        h.media.advance(10.0);
        settle(&mut h.engine).await;
        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Stopped
        );

        h.engine.seek_to(6.0).unwrap();
        h.engine.play().await.unwrap();
        settle(&mut h.engine).await;

        assert_eq!(h.engine.get_active_track_index().unwrap(), Some(0));
        assert_eq!(h.engine.get_position().unwrap(), 6.0);
        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Playing
        );
    }

    #[tokio::test]
    async fn test_stop_then_play_reloads_from_start() {
        let mut h = playing(1).await;
        h.media.advance(3.0);

        h.engine.stop().unwrap();
        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Stopped
        );
        assert_eq!(h.media.current_url(), None);
        assert_eq!(h.engine.get_active_track_index().unwrap(), Some(0));

        h.engine.play().await.unwrap();
        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Buffering
        );
        settle(&mut h.engine).await;
        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Playing
        );
        assert_eq!(h.engine.get_position().unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_repeat_track_skip_never_moves() {
        let mut h = loaded(3).await;
        h.engine.set_repeat_mode(RepeatMode::Track).unwrap();
        let loads = h.media.load_count();

        for _ in 0..3 {
            h.engine.skip_to_next(None).await.unwrap();
            settle(&mut h.engine).await;
        }

        assert_eq!(h.engine.get_active_track_index().unwrap(), Some(0));
        assert_eq!(h.media.load_count(), loads + 3);
        assert!(track_changes(&drain(&h.events)).is_empty());
    }

    #[tokio::test]
    async fn test_repeat_track_replays_on_end() {
        let mut h = playing(2).await;
        h.engine.set_repeat_mode(RepeatMode::Track).unwrap();

        h.media.advance(10.0);
        settle(&mut h.engine).await;

        assert_eq!(h.engine.get_active_track_index().unwrap(), Some(0));
        assert_eq!(h.engine.get_position().unwrap(), 0.0);
        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Playing
        );
    }

    #[tokio::test]
    async fn test_repeat_queue_single_track_restarts() {
        let mut h = playing(1).await;
        h.engine.set_repeat_mode(RepeatMode::Queue).unwrap();
        let loads = h.media.load_count();

        h.engine.skip_to_next(None).await.unwrap();
        settle(&mut h.engine).await;

        assert_eq!(h.engine.get_active_track_index().unwrap(), Some(0));
        assert_eq!(h.media.load_count(), loads + 1);
        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Playing
        );
    }

    #[tokio::test]
    async fn test_repeat_queue_wraps_both_ways() {
        let mut h = loaded(3).await;
        h.engine.set_repeat_mode(RepeatMode::Queue).unwrap();

        h.engine.skip_to_previous(None).await.unwrap();
        assert_eq!(h.engine.get_active_track_index().unwrap(), Some(2));

        h.engine.skip_to_next(None).await.unwrap();
        assert_eq!(h.engine.get_active_track_index().unwrap(), Some(0));

        assert_eq!(
            track_changes(&drain(&h.events)),
            vec![(Some(0), Some(2)), (Some(2), Some(0))]
        );
    }

    #[tokio::test]
    async fn test_repeat_off_fails_at_boundaries() {
        let mut h = loaded(2).await;

        assert!(matches!(
            h.engine.skip_to_previous(None).await,
            Err(PlayerError::NoAdjacentTrack)
        ));

        h.engine.skip_to_next(None).await.unwrap();
        settle(&mut h.engine).await;
        assert!(matches!(
            h.engine.skip_to_next(None).await,
            Err(PlayerError::NoAdjacentTrack)
        ));
        assert_eq!(h.engine.get_active_track_index().unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_skip_preserves_play_intent() {
        let mut h = playing(3).await;

        h.engine.skip(2, Some(4.0)).await.unwrap();
        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Buffering
        );
        settle(&mut h.engine).await;

        assert_eq!(h.engine.get_active_track_index().unwrap(), Some(2));
        assert_eq!(h.engine.get_position().unwrap(), 4.0);
        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Playing
        );

        assert!(matches!(
            h.engine.skip(7, None).await,
            Err(PlayerError::IndexOutOfBounds { index: 7, len: 3 })
        ));
    }

    #[tokio::test]
    async fn test_seek_by_stays_inside_track() {
        let mut h = loaded(1).await;

        h.engine.seek_to(5.0).unwrap();
        h.engine.seek_by(-100.0).unwrap();
        assert_eq!(h.engine.get_position().unwrap(), 0.0);

        h.engine.seek_by(1000.0).unwrap();
        let position = h.engine.get_position().unwrap();
        assert!(position < 10.0);
        assert!(position >= 10.0 - SEEK_END_EPSILON - f64::EPSILON);

        let progress: Vec<f64> = drain(&h.events)
            .into_iter()
            .filter_map(|event| match event {
                PlayerEvent::PlaybackProgressUpdated { position, .. } => Some(position),
                _ => None,
            })
            .collect();
        assert_eq!(progress.len(), 3);
        assert_eq!(progress[1], 0.0);
        assert_eq!(progress[2], position);
    }

    #[tokio::test]
    async fn test_disabled_capability_leaves_state_untouched() {
        let capabilities = CapabilitySet::new(
            Capability::ALL
                .into_iter()
                .filter(|capability| *capability != Capability::SeekBy),
        );
        let mut h = harness_with(SetupOptions {
            capabilities,
            ..SetupOptions::default()
        });
        h.engine.add(create_test_tracks(1), None).await.unwrap();
        settle(&mut h.engine).await;
        h.engine.seek_to(5.0).unwrap();
        drain(&h.events);

        let result = h.engine.seek_by(3.0);
        assert!(matches!(
            result,
            Err(PlayerError::CapabilityDisabled {
                capability: Capability::SeekBy
            })
        ));
        assert_eq!(h.engine.get_position().unwrap(), 5.0);
        assert!(drain(&h.events).is_empty());
    }

    #[tokio::test]
    async fn test_remove_active_track_reloads_replacement() {
        let mut h = playing(3).await;

        h.engine.remove(&[0]).await.unwrap();

        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Buffering
        );
        assert_eq!(h.engine.get_active_track_index().unwrap(), Some(0));
        assert_eq!(
            h.media.current_url().as_deref(),
            Some("/music/track_1.flac")
        );
        assert_eq!(track_changes(&drain(&h.events)), vec![(Some(0), Some(0))]);

        settle(&mut h.engine).await;
        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Playing
        );
    }

    #[tokio::test]
    async fn test_remove_active_last_entry_clamps() {
        let mut h = loaded(3).await;
        h.engine.skip(2, None).await.unwrap();
        settle(&mut h.engine).await;

        h.engine.remove(&[2]).await.unwrap();

        assert_eq!(h.engine.get_active_track_index().unwrap(), Some(1));
        assert_eq!(
            h.media.current_url().as_deref(),
            Some("/music/track_1.flac")
        );
    }

    #[tokio::test]
    async fn test_remove_only_track_stops() {
        let mut h = playing(1).await;

        h.engine.remove(&[0]).await.unwrap();

        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Stopped
        );
        assert_eq!(h.engine.get_active_track_index().unwrap(), None);
        assert_eq!(track_changes(&drain(&h.events)), vec![(Some(0), None)]);
        assert_eq!(h.media.current_url(), None);
    }

    #[tokio::test]
    async fn test_load_failure_reports_error() {
        let mut h = loaded(2).await;
        h.media.fail_loads_of("/music/track_1.flac");

        let result = h.engine.skip(1, None).await;

        assert!(matches!(
            result,
            Err(PlayerError::MediaPlayback {
                code: MediaErrorCode::SourceNotSupported,
                ..
            })
        ));
        assert_eq!(h.engine.get_playback_state().unwrap(), PlaybackState::Error);
        assert_eq!(
            error_codes(&drain(&h.events)),
            vec![MediaErrorCode::SourceNotSupported]
        );

        // A later readiness signal must not revive the failed load.
        h.media.emit(MediaEvent::CanPlayThrough);
        settle(&mut h.engine).await;
        assert_eq!(h.engine.get_playback_state().unwrap(), PlaybackState::Error);
    }

    #[tokio::test]
    async fn test_media_error_then_retry_recovers() {
        let mut h = playing(1).await;
        h.media.advance(2.0);

        h.media.emit(MediaEvent::Error(MediaErrorCode::Network));
        settle(&mut h.engine).await;
        assert_eq!(h.engine.get_playback_state().unwrap(), PlaybackState::Error);
        assert_eq!(
            error_codes(&drain(&h.events)),
            vec![MediaErrorCode::Network]
        );

        h.engine.retry().await.unwrap();
        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Buffering
        );
        settle(&mut h.engine).await;

        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Playing
        );
        assert_eq!(h.engine.get_position().unwrap(), 2.0);
        assert!(track_changes(&drain(&h.events)).is_empty());
    }

    #[tokio::test]
    async fn test_play_rejection_is_reported_twice() {
        let mut h = loaded(1).await;
        h.media.set_reject_play(Some(MediaErrorCode::Aborted));

        let result = h.engine.play().await;

        assert!(matches!(
            result,
            Err(PlayerError::MediaPlayback {
                code: MediaErrorCode::Aborted,
                ..
            })
        ));
        assert_eq!(
            error_codes(&drain(&h.events)),
            vec![MediaErrorCode::Aborted]
        );
        assert_eq!(h.engine.get_playback_state().unwrap(), PlaybackState::Paused);
    }

    #[tokio::test]
    async fn test_element_callbacks_suppressed_while_transitioning() {
        let mut h = harness();
        h.media.set_auto_ready(false);
        h.engine.add(create_test_tracks(1), None).await.unwrap();

        h.media.emit(MediaEvent::Playing);
        h.media.emit(MediaEvent::Waiting);
        h.media.emit(MediaEvent::Paused);
        settle(&mut h.engine).await;
        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Buffering
        );

        h.media.emit(MediaEvent::CanPlayThrough);
        settle(&mut h.engine).await;
        assert_eq!(h.engine.get_playback_state().unwrap(), PlaybackState::Paused);
    }

    #[tokio::test]
    async fn test_wait_for_buffer_selects_readiness_signal() {
        let mut waiting = harness();
        waiting.media.set_auto_ready(false);
        waiting.engine.add(create_test_tracks(1), None).await.unwrap();
        waiting.media.emit(MediaEvent::CanPlay);
        settle(&mut waiting.engine).await;
        assert_eq!(
            waiting.engine.get_playback_state().unwrap(),
            PlaybackState::Buffering
        );

        let mut eager = harness_with(SetupOptions {
            wait_for_buffer: false,
            ..SetupOptions::default()
        });
        eager.media.set_auto_ready(false);
        eager.engine.add(create_test_tracks(1), None).await.unwrap();
        eager.media.emit(MediaEvent::CanPlay);
        settle(&mut eager.engine).await;
        assert_eq!(
            eager.engine.get_playback_state().unwrap(),
            PlaybackState::Paused
        );
    }

    #[tokio::test]
    async fn test_stall_and_recovery() {
        let mut h = playing(1).await;

        h.media.emit(MediaEvent::Waiting);
        settle(&mut h.engine).await;
        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Buffering
        );

        h.media.emit(MediaEvent::CanPlayThrough);
        settle(&mut h.engine).await;
        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Playing
        );
    }

    #[tokio::test]
    async fn test_state_changes_are_not_duplicated() {
        let mut h = playing(1).await;

        h.media.emit(MediaEvent::Playing);
        settle(&mut h.engine).await;

        assert!(drain(&h.events).iter().all(|event| event.kind() != EventKind::PlaybackState));
    }

    #[tokio::test]
    async fn test_live_stream_starts_at_live_edge() {
        let mut h = harness();
        let live = Track {
            is_live_stream: true,
            ..Track::new("http://radio.example/live", "Radio")
        };

        h.engine.add(vec![live], None).await.unwrap();

        let edge = h.media.live_edge().unwrap();
        assert!(edge > 0.0);
        assert_eq!(h.engine.get_position().unwrap(), edge);
        assert_eq!(h.engine.get_duration().unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_volume_and_rate_are_clamped() {
        let mut h = harness();

        h.engine.set_volume(2.0).unwrap();
        assert_eq!(h.engine.get_volume().unwrap(), 1.0);
        h.engine.set_volume(-1.0).unwrap();
        assert_eq!(h.engine.get_volume().unwrap(), 0.0);

        h.engine.set_rate(5.0).unwrap();
        assert_eq!(h.engine.get_rate().unwrap(), 2.0);
        h.engine.set_rate(0.1).unwrap();
        assert_eq!(h.engine.get_rate().unwrap(), 0.25);
    }

    #[tokio::test]
    async fn test_bass_preset_sets_first_band_exactly() {
        let mut h = harness();
        let preset: EqualizerPreset = "bass".parse().unwrap();

        h.engine.set_equalizer_preset(preset).unwrap();

        assert_eq!(
            h.engine.get_equalizer_band_gain(0).unwrap(),
            EqualizerPreset::Bass.gains()[0]
        );
    }

    #[tokio::test]
    async fn test_equalizer_toggle_restores_gains() {
        let mut h = harness();
        h.engine.set_equalizer_enabled(true).unwrap();
        h.engine.set_equalizer_preset(EqualizerPreset::Rock).unwrap();
        h.engine.set_equalizer_band_gain(4, 30.0).unwrap();
        let before = h.engine.get_equalizer_bands().unwrap();
        assert_eq!(before[4].gain, 12.0);
        assert_eq!(h.graph.filter_gains()[0], 5.0);

        h.engine.set_equalizer_enabled(false).unwrap();
        assert!(!h.engine.is_equalizer_enabled().unwrap());
        assert!(h.graph.filter_gains().iter().all(|gain| *gain == 0.0));

        h.engine.set_equalizer_enabled(true).unwrap();
        let after = h.engine.get_equalizer_bands().unwrap();
        assert_eq!(before, after);
        let live: Vec<f32> = after.iter().map(|band| band.gain).collect();
        assert_eq!(h.graph.filter_gains(), live);
    }

    #[tokio::test]
    async fn test_equalizer_bulk_update_needs_ten_bands() {
        let mut h = harness();
        let bands = h.engine.get_equalizer_bands().unwrap();

        let result = h.engine.set_equalizer_bands(&bands[..9]);
        assert!(matches!(result, Err(PlayerError::Configuration { .. })));

        assert!(matches!(
            h.engine.set_equalizer_band_gain(10, 1.0),
            Err(PlayerError::IndexOutOfBounds { index: 10, len: 10 })
        ));

        h.engine.set_equalizer_preset(EqualizerPreset::Treble).unwrap();
        h.engine.reset_equalizer().unwrap();
        assert!(
            h.engine
                .get_equalizer_bands()
                .unwrap()
                .iter()
                .all(|band| band.gain == 0.0)
        );
    }

    #[tokio::test]
    async fn test_analysis_data_after_first_play() {
        let mut h = loaded(1).await;
        assert!(h.engine.get_audio_analysis_data().unwrap().is_none());

        h.engine.configure_audio_analyser(512, 0.5).unwrap();
        assert!(matches!(
            h.engine.configure_audio_analyser(1000, 0.5),
            Err(PlayerError::Configuration { .. })
        ));

        h.engine.play().await.unwrap();
        let data = h.engine.get_audio_analysis_data().unwrap().unwrap();
        assert_eq!(data.frequency_db.len(), 256);
        assert_eq!(data.time_domain.len(), 512);
    }

    #[tokio::test]
    async fn test_preload_probes_next_track() {
        let mut h = harness();
        let tracks = (0..3)
            .map(|i| Track::new(format!("/music/untimed_{i}.flac"), format!("Untimed {i}")))
            .collect();

        h.engine.add(tracks, None).await.unwrap();
        settle(&mut h.engine).await;

        assert!(h.engine.is_metadata_loaded(1).unwrap());
        assert!(!h.engine.is_metadata_loaded(2).unwrap());
        assert_eq!(
            h.engine.get_track(1).unwrap().unwrap().duration,
            Some(PROBED_DURATION)
        );
    }

    #[tokio::test]
    async fn test_preload_skips_live_and_swallows_failures() {
        let mut h = harness();
        let tracks = vec![
            Track::new("/music/first.flac", "First"),
            Track::new("/music/broken.flac", "Broken"),
            Track {
                is_live_stream: true,
                ..Track::new("http://radio.example/live", "Radio")
            },
        ];

        h.engine.add(tracks, None).await.unwrap();
        settle(&mut h.engine).await;
        assert!(!h.engine.is_metadata_loaded(1).unwrap());
        assert!(error_codes(&drain(&h.events)).is_empty());

        h.engine.skip(1, None).await.unwrap();
        settle(&mut h.engine).await;
        assert!(!h.engine.is_metadata_loaded(2).unwrap());
    }

    #[tokio::test]
    async fn test_remote_commands_are_routed() {
        let mut h = playing(2).await;
        let remote = h.engine.remote_commands().unwrap();

        remote.try_send(RemoteCommand::Pause).unwrap();
        remote.try_send(RemoteCommand::SeekTo(4.0)).unwrap();
        settle(&mut h.engine).await;
        assert_eq!(h.engine.get_playback_state().unwrap(), PlaybackState::Paused);
        assert_eq!(h.engine.get_position().unwrap(), 4.0);

        remote.try_send(RemoteCommand::Next).unwrap();
        settle(&mut h.engine).await;
        assert_eq!(h.engine.get_active_track_index().unwrap(), Some(1));

        // Failures have no caller and are dropped.
        remote.try_send(RemoteCommand::Next).unwrap();
        settle(&mut h.engine).await;
        assert_eq!(h.engine.get_active_track_index().unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_next_event_handles_one_item() {
        let mut h = harness();
        h.engine.add(create_test_tracks(1), None).await.unwrap();

        // CanPlay is ignored while waiting for the buffer; CanPlayThrough finishes.
        h.engine.next_event().await.unwrap();
        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Buffering
        );
        h.engine.next_event().await.unwrap();
        assert_eq!(h.engine.get_playback_state().unwrap(), PlaybackState::Paused);
    }

    #[tokio::test]
    async fn test_now_playing_follows_active_track() {
        let mut h = harness();
        h.engine.add(create_test_tracks(2), None).await.unwrap();
        assert_eq!(h.now_playing.shown.lock().last().cloned(), Some("Track 0".to_string()));

        h.engine
            .update_metadata_for_track(
                0,
                TrackMetadataPatch {
                    title: Some("Renamed".to_string()),
                    ..TrackMetadataPatch::default()
                },
            )
            .unwrap();
        assert_eq!(h.now_playing.shown.lock().last().cloned(), Some("Renamed".to_string()));

        // Updating an inactive track does not touch the display.
        let shown = h.now_playing.shown.lock().len();
        h.engine
            .update_metadata_for_track(1, TrackMetadataPatch::default())
            .unwrap();
        assert_eq!(h.now_playing.shown.lock().len(), shown);

        assert!(matches!(
            h.engine
                .update_metadata_for_track(5, TrackMetadataPatch::default()),
            Err(PlayerError::IndexOutOfBounds { index: 5, len: 2 })
        ));
    }

    #[tokio::test]
    async fn test_update_options() {
        let mut h = harness();

        let invalid = h.engine.update_options(UpdateOptions {
            progress_update_interval: Some(0.0),
            ..UpdateOptions::default()
        });
        assert!(matches!(invalid, Err(PlayerError::Options(_))));

        let cleared = *h.now_playing.cleared.lock();
        h.engine
            .update_options(UpdateOptions {
                media_session: Some(false),
                progress_update_interval: Some(0.5),
                ..UpdateOptions::default()
            })
            .unwrap();
        assert_eq!(*h.now_playing.cleared.lock(), cleared + 1);

        // Display is no longer refreshed.
        h.engine.add(create_test_tracks(1), None).await.unwrap();
        assert!(h.now_playing.shown.lock().is_empty());
    }

    #[tokio::test]
    async fn test_progress_sampler_publishes_while_playing() {
        let mut h = harness_with(SetupOptions {
            progress_update_interval: 0.01,
            ..SetupOptions::default()
        });
        h.engine.add(create_test_tracks(1), None).await.unwrap();
        settle(&mut h.engine).await;
        h.engine.play().await.unwrap();

        let events = h.events.clone();
        let track = timeout(Duration::from_millis(TEST_TIMEOUT_MS), async move {
            loop {
                match events.recv().await {
                    Ok(PlayerEvent::PlaybackProgressUpdated { track, .. }) => return track,
                    Ok(_) => {}
                    Err(_) => return None,
                }
            }
        })
        .await
        .expect("no progress event while playing");

        assert_eq!(track, Some(0));
    }

    #[tokio::test]
    async fn test_reset_keeps_repeat_mode() {
        let mut h = playing(2).await;
        h.engine.set_repeat_mode(RepeatMode::Queue).unwrap();

        h.engine.reset().unwrap();

        assert_eq!(h.engine.get_playback_state().unwrap(), PlaybackState::None);
        assert!(h.engine.get_queue().unwrap().is_empty());
        assert_eq!(h.engine.get_active_track_index().unwrap(), None);
        assert_eq!(h.engine.get_repeat_mode().unwrap(), RepeatMode::Queue);
        assert_eq!(h.media.current_url(), None);

        // The player stays usable.
        h.engine.add(create_test_tracks(1), None).await.unwrap();
        assert_eq!(h.engine.get_active_track_index().unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_destroy_returns_to_not_set_up() {
        let mut h = playing(1).await;

        h.engine.destroy();

        assert!(!h.engine.is_set_up());
        assert!(!h.media.is_attached());
        assert!(!h.graph.is_connected());
        assert!(matches!(
            h.engine.play().await,
            Err(PlayerError::SetupNotCalled)
        ));

        h.engine.setup_player(SetupOptions::default()).unwrap();
        assert_eq!(h.engine.get_playback_state().unwrap(), PlaybackState::Ready);
        assert!(h.media.is_attached());
    }

    #[tokio::test]
    async fn test_get_progress_reads_media() {
        let mut h = playing(1).await;
        h.media.advance(3.0);

        let progress = h.engine.get_progress().unwrap();
        assert_eq!(progress.position, 3.0);
        assert_eq!(progress.duration, 10.0);
        assert_eq!(progress.buffered, h.engine.get_buffered_position().unwrap());
        assert_eq!(h.engine.get_duration().unwrap(), 10.0);
    }

    #[tokio::test]
    async fn test_element_callbacks_after_stop_keep_it_stopped() {
        let mut h = loaded(2).await;

        h.engine.play().await.unwrap();
        h.engine.stop().unwrap();
        assert_eq!(h.engine.get_playback_state().unwrap(), PlaybackState::Stopped);

        settle(&mut h.engine).await;
        assert_eq!(h.engine.get_playback_state().unwrap(), PlaybackState::Stopped);
        assert!(!h.engine.get_play_when_ready().unwrap());

        h.engine.play().await.unwrap();
        settle(&mut h.engine).await;
        assert_eq!(h.engine.get_playback_state().unwrap(), PlaybackState::Playing);
        assert_eq!(h.media.current_url().as_deref(), Some("/music/track_0.flac"));
    }

    #[tokio::test]
    async fn test_error_state_is_left_through_a_reload() {
        let mut h = playing(2).await;

        h.media.emit(MediaEvent::Error(MediaErrorCode::Decode));
        settle(&mut h.engine).await;
        assert_eq!(h.engine.get_playback_state().unwrap(), PlaybackState::Error);

        // The element recovering on its own does not count.
        h.media.emit(MediaEvent::Playing);
        settle(&mut h.engine).await;
        assert_eq!(h.engine.get_playback_state().unwrap(), PlaybackState::Error);

        let loads = h.media.load_count();
        h.engine.play().await.unwrap();
        assert_eq!(h.media.load_count(), loads + 1);
        assert_eq!(
            h.engine.get_playback_state().unwrap(),
            PlaybackState::Buffering
        );

        settle(&mut h.engine).await;
        assert_eq!(h.engine.get_playback_state().unwrap(), PlaybackState::Playing);
        assert_eq!(h.engine.get_active_track_index().unwrap(), Some(0));
        assert!(track_changes(&drain(&h.events)).is_empty());
    }

    #[tokio::test]
    async fn test_seek_by_on_track_shorter_than_end_margin() {
        let mut h = harness();
        let short = Track {
            duration: Some(SEEK_END_EPSILON / 2.0),
            ..Track::new("/music/click.wav", "Click")
        };
        h.engine.add(vec![short], None).await.unwrap();
        settle(&mut h.engine).await;

        h.engine.seek_by(1.0).unwrap();
        assert_eq!(h.engine.get_position().unwrap(), 0.0);

        h.engine.seek_by(-1.0).unwrap();
        assert_eq!(h.engine.get_position().unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_pause_reported_at_track_end_keeps_advancing() {
        let mut h = playing(2).await;

        h.media.set_position(10.0);
        h.media.emit(MediaEvent::Paused);
        h.media.emit(MediaEvent::Ended);
        settle(&mut h.engine).await;

        assert_eq!(h.engine.get_active_track_index().unwrap(), Some(1));
        assert!(h.engine.get_play_when_ready().unwrap());
        assert_eq!(h.engine.get_playback_state().unwrap(), PlaybackState::Playing);
        assert_eq!(track_changes(&drain(&h.events)), vec![(Some(0), Some(1))]);
    }
}
