//! Tonearm - headless playback demo
//!
//! Queues the audio files given on the command line (or two synthetic tones
//! when none are given) and plays them through a simulated media element on
//! an accelerated clock, logging every player event.

use std::{env::args, f32::consts::TAU, sync::Arc, time::Duration};

use {
    anyhow::Result,
    tokio::time::sleep,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt},
};

use tonearm::{
    Backends, DspGraph, EqualizerPreset, LoftyProbe, PlaybackState, PlayerEngine, SetupOptions,
    SimulatedMedia, Track, TracingNowPlaying,
    config::default_options_path,
    error::{ErrorReporter, ResultExt},
};

const SAMPLE_RATE: f32 = 44_100.0;

/// Wall-clock time between simulation steps.
const TICK: Duration = Duration::from_millis(50);

/// Media seconds advanced per step.
const MEDIA_STEP: f64 = 1.0;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tonearm=info"));
    fmt().with_env_filter(filter).init();
}

fn load_options() -> SetupOptions {
    let path = default_options_path();
    if !path.exists() {
        return SetupOptions::default();
    }
    match SetupOptions::load_from_path(&path).add_contextf(format!("Reading {}", path.display())) {
        Ok(options) => options,
        Err(error) => {
            ErrorReporter::warn(&error, "load_options");
            SetupOptions::default()
        }
    }
}

fn collect_tracks() -> Vec<Track> {
    let tracks: Vec<Track> = args()
        .skip(1)
        .filter_map(|path| match LoftyProbe::read_track(&path) {
            Ok(track) => Some(track),
            Err(error) => {
                warn!(path = %path, error = %error, "Skipping unreadable file");
                None
            }
        })
        .collect();

    if !tracks.is_empty() {
        return tracks;
    }

    [("A4", 5.0), ("E5", 4.0)]
        .into_iter()
        .map(|(note, seconds)| {
            let mut track = Track::new(format!("tone://{note}"), format!("Tone {note}"));
            track.duration = Some(seconds);
            track
        })
        .collect()
}

/// Fills one tick's worth of a sine tone, standing in for decoded audio.
fn tone_block(phase: &mut f32) -> Vec<f32> {
    let step = TAU * 440.0 / SAMPLE_RATE;
    (0..2048)
        .map(|_| {
            *phase = (*phase + step) % TAU;
            0.25 * phase.sin()
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let media = SimulatedMedia::new();
    let graph = DspGraph::new(SAMPLE_RATE);
    let mut engine = PlayerEngine::new(Backends {
        media: Arc::new(media.clone()),
        graph: Box::new(graph.clone()),
        probe: Arc::new(LoftyProbe),
        now_playing: Some(Box::new(TracingNowPlaying::default())),
    });

    let events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => info!(event = %json, "Player event"),
                Err(error) => warn!(error = %error, "Unserializable event"),
            }
        }
    });

    engine
        .setup_player(load_options())
        .add_context("Setting up the player")?;
    engine
        .set_equalizer_preset(EqualizerPreset::Rock)
        .add_context("Applying equalizer preset")?;
    engine.set_equalizer_enabled(true)?;

    let tracks = collect_tracks();
    info!(count = tracks.len(), "Queueing tracks");
    engine.add(tracks, None).await?;
    engine.play().await.add_context("Starting playback")?;

    let mut phase = 0.0;
    loop {
        sleep(TICK).await;
        media.advance(MEDIA_STEP);

        let mut block = tone_block(&mut phase);
        graph.process(&mut block);

        engine.process_pending_events().await?;
        match engine.get_playback_state()? {
            PlaybackState::Stopped | PlaybackState::Error => break,
            _ => {}
        }
    }

    if let Some(analysis) = engine.get_audio_analysis_data()? {
        let peak = analysis
            .frequency_db
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        info!(bins = analysis.frequency_db.len(), peak_db = peak, "Final spectrum");
    }

    engine.destroy();
    Ok(())
}
