//! Software audio graph.
//!
//! `DspGraph` implements the graph primitive in-process: peaking `biquad`
//! filters in series, a `rustfft` analyser and a master gain. Hosts that
//! render audio themselves push blocks through `process`.

use std::sync::Arc;

use {
    async_trait::async_trait,
    biquad::{Biquad, Coefficients, DirectForm1, ToHertz, Type},
    parking_lot::Mutex,
    rustfft::{Fft, FftPlanner, num_complex::Complex},
    tracing::{debug, warn},
};

use crate::audio::{
    equalizer::EqualizerBand,
    graph::{AnalyserConfig, AnalysisData, AudioGraph, ContextState, GraphError},
};

/// Floor for reported magnitudes, in dB.
const MIN_DECIBELS: f32 = -100.0;

struct BandFilter {
    frequency: f32,
    q: f32,
    gain: f32,
    filter: DirectForm1<f32>,
}

fn peaking(
    sample_rate: f32,
    frequency: f32,
    q: f32,
    gain: f32,
) -> Result<Coefficients<f32>, GraphError> {
    Coefficients::<f32>::from_params(Type::PeakingEQ(gain), sample_rate.hz(), frequency.hz(), q)
        .map_err(|e| GraphError::NodeCreation {
            node: "filter",
            reason: format!("{e:?} at {frequency} Hz"),
        })
}

struct Analyser {
    config: AnalyserConfig,
    history: Vec<f32>,
    write_pos: usize,
    smoothed: Vec<f32>,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl Analyser {
    fn new(config: AnalyserConfig) -> Self {
        let size = config.fft_size;
        let fft = FftPlanner::new().plan_fft_forward(size);
        let window = (0..size)
            .map(|i| {
                0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos()
            })
            .collect();
        Self {
            config,
            history: vec![0.0; size],
            write_pos: 0,
            smoothed: vec![0.0; size / 2],
            window,
            fft,
        }
    }

    fn push(&mut self, sample: f32) {
        self.history[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.history.len();
    }

    fn time_domain(&self) -> Vec<f32> {
        let (newest, oldest) = self.history.split_at(self.write_pos);
        oldest.iter().chain(newest).copied().collect()
    }

    fn snapshot(&mut self) -> AnalysisData {
        let time_domain = self.time_domain();
        let size = self.config.fft_size;

        let mut buffer: Vec<Complex<f32>> = time_domain
            .iter()
            .zip(&self.window)
            .map(|(sample, w)| Complex::new(sample * w, 0.0))
            .collect();
        self.fft.process(&mut buffer);

        let tau = self.config.smoothing;
        let frequency_db = self
            .smoothed
            .iter_mut()
            .zip(&buffer)
            .map(|(smoothed, bin)| {
                let magnitude = bin.norm() / size as f32;
                *smoothed = tau * *smoothed + (1.0 - tau) * magnitude;
                if *smoothed > 0.0 {
                    (20.0 * smoothed.log10()).max(MIN_DECIBELS)
                } else {
                    MIN_DECIBELS
                }
            })
            .collect();

        AnalysisData {
            frequency_db,
            time_domain,
        }
    }
}

struct DspState {
    sample_rate: f32,
    initial_context: ContextState,
    context: Option<ContextState>,
    resume_fails: bool,
    filters: Vec<BandFilter>,
    analyser: Option<Analyser>,
    source_creations: usize,
    connected: bool,
    gain: f32,
}

/// In-process audio graph.
///
/// Clones share the same graph, so a host can keep a handle for `process`
/// after giving one to the engine.
#[derive(Clone)]
pub struct DspGraph {
    state: Arc<Mutex<DspState>>,
}

impl DspGraph {
    /// Creates a graph whose context starts running.
    #[must_use]
    pub fn new(sample_rate: f32) -> Self {
        Self {
            state: Arc::new(Mutex::new(DspState {
                sample_rate,
                initial_context: ContextState::Running,
                context: None,
                resume_fails: false,
                filters: Vec::new(),
                analyser: None,
                source_creations: 0,
                connected: false,
                gain: 1.0,
            })),
        }
    }

    /// Sets the state a freshly created context starts in.
    #[must_use]
    pub fn with_initial_context(self, state: ContextState) -> Self {
        self.state.lock().initial_context = state;
        self
    }

    /// Makes `resume` fail, as a context blocked by autoplay policy would.
    pub fn set_resume_fails(&self, fails: bool) {
        self.state.lock().resume_fails = fails;
    }

    /// Gains currently written to the live filters.
    #[must_use]
    pub fn filter_gains(&self) -> Vec<f32> {
        self.state.lock().filters.iter().map(|f| f.gain).collect()
    }

    /// How many times a source node was created.
    #[must_use]
    pub fn source_creations(&self) -> usize {
        self.state.lock().source_creations
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Runs a mono block through the chain in place.
    ///
    /// Blocks pass through untouched until the graph is connected and running.
    pub fn process(&self, block: &mut [f32]) {
        let mut state = self.state.lock();
        if !state.connected || state.context != Some(ContextState::Running) {
            return;
        }
        let DspState {
            filters,
            analyser,
            gain,
            ..
        } = &mut *state;
        for sample in block.iter_mut() {
            let mut value = *sample;
            for band in filters.iter_mut() {
                value = band.filter.run(value);
            }
            if let Some(analyser) = analyser.as_mut() {
                analyser.push(value);
            }
            *sample = value * *gain;
        }
    }
}

#[async_trait]
impl AudioGraph for DspGraph {
    fn create_context(&mut self) -> Result<ContextState, GraphError> {
        let mut state = self.state.lock();
        if state.sample_rate <= 0.0 {
            return Err(GraphError::Context {
                reason: format!("invalid sample rate {}", state.sample_rate),
            });
        }
        let context = state.initial_context;
        state.context = Some(context);
        debug!("DspGraph: Context created ({context:?})");
        Ok(context)
    }

    fn context_state(&self) -> ContextState {
        self.state.lock().context.unwrap_or(ContextState::Closed)
    }

    async fn resume(&mut self) -> Result<(), GraphError> {
        let mut state = self.state.lock();
        if state.resume_fails {
            return Err(GraphError::Context {
                reason: "context resume was not allowed".to_string(),
            });
        }
        match state.context {
            Some(ContextState::Suspended) | Some(ContextState::Running) => {
                state.context = Some(ContextState::Running);
                Ok(())
            }
            _ => Err(GraphError::Context {
                reason: "no open context to resume".to_string(),
            }),
        }
    }

    fn create_nodes(
        &mut self,
        bands: &[EqualizerBand],
        analyser: &AnalyserConfig,
    ) -> Result<(), GraphError> {
        let mut state = self.state.lock();
        let sample_rate = state.sample_rate;
        let filters = bands
            .iter()
            .map(|band| {
                let coefficients = peaking(sample_rate, band.frequency, band.q, band.gain)?;
                Ok(BandFilter {
                    frequency: band.frequency,
                    q: band.q,
                    gain: band.gain,
                    filter: DirectForm1::<f32>::new(coefficients),
                })
            })
            .collect::<Result<Vec<_>, GraphError>>()?;

        state.filters = filters;
        state.analyser = Some(Analyser::new(*analyser));
        Ok(())
    }

    fn has_source(&self) -> bool {
        self.state.lock().source_creations > 0
    }

    fn create_source(&mut self) -> Result<(), GraphError> {
        self.state.lock().source_creations += 1;
        Ok(())
    }

    fn connect(&mut self) -> Result<(), GraphError> {
        let mut state = self.state.lock();
        if state.source_creations == 0 {
            return Err(GraphError::Connection {
                reason: "no source node".to_string(),
            });
        }
        if state.analyser.is_none() {
            return Err(GraphError::Connection {
                reason: "filters and analyser were not created".to_string(),
            });
        }
        state.connected = true;
        Ok(())
    }

    fn set_filter_gain(&mut self, band: usize, gain: f32) {
        let mut state = self.state.lock();
        let sample_rate = state.sample_rate;
        let Some(filter) = state.filters.get_mut(band) else {
            return;
        };
        match peaking(sample_rate, filter.frequency, filter.q, gain) {
            Ok(coefficients) => {
                filter.filter.update_coefficients(coefficients);
                filter.gain = gain;
            }
            Err(e) => warn!("DspGraph: Failed to update band {band}: {e}"),
        }
    }

    fn configure_analyser(&mut self, config: &AnalyserConfig) {
        let mut state = self.state.lock();
        if state.analyser.is_some() {
            state.analyser = Some(Analyser::new(*config));
        }
    }

    fn analysis_data(&mut self) -> Option<AnalysisData> {
        self.state.lock().analyser.as_mut().map(Analyser::snapshot)
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.context = Some(ContextState::Closed);
        state.filters.clear();
        state.analyser = None;
        state.source_creations = 0;
        state.connected = false;
    }
}
