//! Audio graph lifecycle around the media element.
//!
//! The chain is `source -> band filters (in series) -> analyser -> gain ->
//! destination`. The context is created at setup; if it starts suspended,
//! node creation waits for the first play. Source creation and connection
//! happen once, on the first play, and are never retried after a failure.

use {
    anyhow::Error as AnyhowError,
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    thiserror::Error,
    tracing::{debug, info, warn},
};

use crate::{
    audio::equalizer::{Equalizer, EqualizerBand, EqualizerOptions, EqualizerPreset},
    error::{ErrorReporter, PlayerError, PlayerResult},
};

/// Smallest analyser FFT size.
pub const MIN_FFT_SIZE: usize = 32;

/// Largest analyser FFT size.
pub const MAX_FFT_SIZE: usize = 32768;

/// Error type for audio graph operations.
#[derive(Error, Debug)]
pub enum GraphError {
    /// The processing context could not be created or resumed.
    #[error("Audio context error: {reason}")]
    Context { reason: String },
    /// A processing node could not be created.
    #[error("Failed to create {node} node: {reason}")]
    NodeCreation { node: &'static str, reason: String },
    /// Nodes could not be connected.
    #[error("Failed to connect audio graph: {reason}")]
    Connection { reason: String },
}

/// Whether the processing context is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Running,
    /// Created but held back until a user gesture.
    Suspended,
    Closed,
}

/// Analyser node settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyserConfig {
    /// FFT size, a power of two in `[32, 32768]`.
    pub fft_size: usize,
    /// Time smoothing constant in `[0, 1]`.
    pub smoothing: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing: 0.8,
        }
    }
}

impl AnalyserConfig {
    /// Checks the FFT size and smoothing constant.
    ///
    /// # Errors
    ///
    /// Returns the reason the configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.fft_size.is_power_of_two()
            || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&self.fft_size)
        {
            return Err(format!(
                "fft size must be a power of two between {MIN_FFT_SIZE} and {MAX_FFT_SIZE}, got {}",
                self.fft_size
            ));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(format!(
                "smoothing must be between 0 and 1, got {}",
                self.smoothing
            ));
        }
        Ok(())
    }
}

/// Snapshot of the analyser output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisData {
    /// Smoothed magnitude per bin in dB, `fft_size / 2` entries.
    pub frequency_db: Vec<f32>,
    /// Most recent `fft_size` samples.
    pub time_domain: Vec<f32>,
}

/// An audio-processing graph primitive.
#[async_trait]
pub trait AudioGraph: Send {
    /// Creates the processing context.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Context` if no context can be created.
    fn create_context(&mut self) -> Result<ContextState, GraphError>;

    fn context_state(&self) -> ContextState;

    /// Resumes a suspended context.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Context` if the context refuses to resume.
    async fn resume(&mut self) -> Result<(), GraphError>;

    /// Creates the band filters and the analyser.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::NodeCreation` if a node cannot be created.
    fn create_nodes(
        &mut self,
        bands: &[EqualizerBand],
        analyser: &AnalyserConfig,
    ) -> Result<(), GraphError>;

    /// Whether a source node wraps the media element.
    fn has_source(&self) -> bool;

    /// Wraps the media element in a source node.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::NodeCreation` if the source cannot be created.
    fn create_source(&mut self) -> Result<(), GraphError>;

    /// Connects source, filters, analyser, gain and destination.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Connection` if the chain cannot be built.
    fn connect(&mut self) -> Result<(), GraphError>;

    /// Writes a gain to a live band filter.
    fn set_filter_gain(&mut self, band: usize, gain: f32);

    fn configure_analyser(&mut self, config: &AnalyserConfig);

    /// Current analyser output, if the analyser exists.
    fn analysis_data(&mut self) -> Option<AnalysisData>;

    /// Releases every node and the context.
    fn close(&mut self);
}

/// Construction progress of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphPhase {
    Uninitialized,
    ContextCreated,
    FiltersCreated,
    Connected,
    /// Construction on first play failed; it is not attempted again.
    Abandoned,
}

/// Owns the graph primitive, the equalizer model and the analyser settings.
pub struct GraphManager {
    graph: Box<dyn AudioGraph>,
    phase: GraphPhase,
    equalizer: Equalizer,
    analyser: AnalyserConfig,
}

impl GraphManager {
    #[must_use]
    pub fn new(
        graph: Box<dyn AudioGraph>,
        equalizer: Option<EqualizerOptions>,
        analyser: AnalyserConfig,
    ) -> Self {
        Self {
            graph,
            phase: GraphPhase::Uninitialized,
            equalizer: Equalizer::new(equalizer.unwrap_or_default()),
            analyser,
        }
    }

    #[must_use]
    pub fn phase(&self) -> GraphPhase {
        self.phase
    }

    /// Whether first-play construction has already run, successfully or not.
    #[must_use]
    pub fn init_attempted(&self) -> bool {
        matches!(self.phase, GraphPhase::Connected | GraphPhase::Abandoned)
    }

    /// Creates the context, and the nodes too unless the context is suspended.
    ///
    /// Failures are logged; construction is then retried on the first play.
    pub fn prepare(&mut self) {
        if self.phase != GraphPhase::Uninitialized {
            return;
        }
        match self.graph.create_context() {
            Ok(ContextState::Suspended) => {
                debug!("Audio context suspended, deferring node creation to first play");
                self.phase = GraphPhase::ContextCreated;
            }
            Ok(_) => {
                self.phase = GraphPhase::ContextCreated;
                if let Err(e) = self.create_nodes() {
                    ErrorReporter::warn(
                        &AnyhowError::from(e),
                        "creating equalizer nodes at setup",
                    );
                }
            }
            Err(e) => ErrorReporter::warn(&AnyhowError::from(e), "creating audio context at setup"),
        }
    }

    /// Runs first-play construction once.
    ///
    /// Does nothing if construction already ran. A failure moves the graph
    /// to `Abandoned`; playback continues without processing.
    ///
    /// # Errors
    ///
    /// Returns the `GraphError` of the failed step.
    pub async fn connect_on_first_play(&mut self) -> Result<(), GraphError> {
        if self.init_attempted() {
            return Ok(());
        }
        match self.build().await {
            Ok(()) => {
                info!("Audio graph connected");
                self.phase = GraphPhase::Connected;
                Ok(())
            }
            Err(e) => {
                warn!("Audio graph construction failed, continuing without it: {e}");
                self.phase = GraphPhase::Abandoned;
                Err(e)
            }
        }
    }

    async fn build(&mut self) -> Result<(), GraphError> {
        if self.phase == GraphPhase::Uninitialized {
            self.graph.create_context()?;
            self.phase = GraphPhase::ContextCreated;
        }
        if self.graph.context_state() == ContextState::Suspended {
            self.graph.resume().await?;
        }
        if self.phase == GraphPhase::ContextCreated {
            self.create_nodes()?;
        }
        if !self.graph.has_source() {
            self.graph.create_source()?;
        }
        self.graph.connect()
    }

    fn create_nodes(&mut self) -> Result<(), GraphError> {
        let gains = self.equalizer.effective_gains();
        let bands: Vec<EqualizerBand> = self
            .equalizer
            .bands()
            .iter()
            .zip(gains)
            .map(|(band, gain)| EqualizerBand { gain, ..*band })
            .collect();
        self.graph.create_nodes(&bands, &self.analyser)?;
        self.phase = GraphPhase::FiltersCreated;
        Ok(())
    }

    fn has_live_filters(&self) -> bool {
        matches!(self.phase, GraphPhase::FiltersCreated | GraphPhase::Connected)
    }

    fn sync_filters(&mut self) {
        if !self.has_live_filters() {
            return;
        }
        for (band, gain) in self.equalizer.effective_gains().into_iter().enumerate() {
            self.graph.set_filter_gain(band, gain);
        }
    }

    #[must_use]
    pub fn equalizer(&self) -> &Equalizer {
        &self.equalizer
    }

    pub fn set_equalizer_enabled(&mut self, enabled: bool) {
        self.equalizer.set_enabled(enabled);
        self.sync_filters();
    }

    /// # Errors
    ///
    /// Returns `PlayerError::IndexOutOfBounds` for an invalid band.
    pub fn set_band_gain(&mut self, band: usize, gain: f32) -> PlayerResult<()> {
        self.equalizer.set_band_gain(band, gain)?;
        if self.has_live_filters() {
            let effective = self.equalizer.effective_gain(band);
            self.graph.set_filter_gain(band, effective);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `PlayerError::Configuration` unless exactly ten bands are given.
    pub fn set_bands(&mut self, bands: &[EqualizerBand]) -> PlayerResult<()> {
        self.equalizer.set_bands(bands)?;
        self.sync_filters();
        Ok(())
    }

    pub fn apply_preset(&mut self, preset: EqualizerPreset) {
        self.equalizer.apply_preset(preset);
        self.sync_filters();
    }

    pub fn reset_equalizer(&mut self) {
        self.equalizer.reset();
        self.sync_filters();
    }

    /// # Errors
    ///
    /// Returns `PlayerError::Configuration` for an invalid FFT size or smoothing.
    pub fn configure_analyser(&mut self, config: AnalyserConfig) -> PlayerResult<()> {
        config.validate().map_err(PlayerError::configuration)?;
        self.analyser = config;
        if self.has_live_filters() {
            self.graph.configure_analyser(&config);
        }
        Ok(())
    }

    #[must_use]
    pub fn analyser_config(&self) -> AnalyserConfig {
        self.analyser
    }

    /// Analyser output, available once the graph is connected.
    pub fn analysis_data(&mut self) -> Option<AnalysisData> {
        if self.phase == GraphPhase::Connected {
            self.graph.analysis_data()
        } else {
            None
        }
    }

    /// Tears the graph down; the stored equalizer survives.
    pub fn close(&mut self) {
        self.graph.close();
        self.phase = GraphPhase::Uninitialized;
    }

    /// Closes the graph and hands the primitive back.
    #[must_use]
    pub fn into_graph(mut self) -> Box<dyn AudioGraph> {
        self.close();
        self.graph
    }
}
