//! Ten-band equalizer model with named presets.
//!
//! Band frequencies are fixed per slot; only gains change after
//! construction. Disabling the equalizer zeroes the effective gains without
//! touching the stored ones.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PlayerError, PlayerResult};

/// Number of equalizer bands.
pub const BAND_COUNT: usize = 10;

/// Center frequency of each band in Hz.
pub const BAND_FREQUENCIES: [f32; BAND_COUNT] = [
    32.0, 64.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];

/// Lowest accepted band gain in dB.
pub const MIN_GAIN_DB: f32 = -12.0;

/// Highest accepted band gain in dB.
pub const MAX_GAIN_DB: f32 = 12.0;

/// Quality factor applied to every band.
pub const DEFAULT_Q: f32 = 1.0;

/// One equalizer slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqualizerBand {
    /// Center frequency in Hz.
    pub frequency: f32,
    /// Gain in dB, within `[-12, 12]`.
    pub gain: f32,
    /// Quality factor.
    pub q: f32,
}

/// Equalizer configuration: enabled flag plus ten bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqualizerOptions {
    pub enabled: bool,
    pub bands: [EqualizerBand; BAND_COUNT],
}

impl Default for EqualizerOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            bands: BAND_FREQUENCIES.map(|frequency| EqualizerBand {
                frequency,
                gain: 0.0,
                q: DEFAULT_Q,
            }),
        }
    }
}

/// Built-in gain curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EqualizerPreset {
    Flat,
    Rock,
    Pop,
    Jazz,
    Classical,
    Electronic,
    Vocal,
    Bass,
    Treble,
}

impl EqualizerPreset {
    pub const ALL: [EqualizerPreset; 9] = [
        EqualizerPreset::Flat,
        EqualizerPreset::Rock,
        EqualizerPreset::Pop,
        EqualizerPreset::Jazz,
        EqualizerPreset::Classical,
        EqualizerPreset::Electronic,
        EqualizerPreset::Vocal,
        EqualizerPreset::Bass,
        EqualizerPreset::Treble,
    ];

    /// Gain per band in dB, lowest frequency first.
    #[must_use]
    pub fn gains(self) -> [f32; BAND_COUNT] {
        match self {
            EqualizerPreset::Flat => [0.0; BAND_COUNT],
            EqualizerPreset::Rock => [5.0, 4.0, 3.0, 1.0, -1.0, -1.0, 1.0, 3.0, 4.0, 5.0],
            EqualizerPreset::Pop => [-1.0, 1.0, 3.0, 4.0, 4.0, 2.0, 0.0, -1.0, -1.0, -1.0],
            EqualizerPreset::Jazz => [3.0, 2.0, 1.0, 2.0, -1.0, -1.0, 0.0, 1.0, 2.0, 3.0],
            EqualizerPreset::Classical => [4.0, 3.0, 2.0, 1.0, -1.0, -1.0, 0.0, 2.0, 3.0, 4.0],
            EqualizerPreset::Electronic => [6.0, 5.0, 2.0, 0.0, -2.0, 1.0, 0.0, 2.0, 5.0, 6.0],
            EqualizerPreset::Vocal => [-2.0, -2.0, -1.0, 1.0, 4.0, 5.0, 4.0, 2.0, 0.0, -1.0],
            EqualizerPreset::Bass => [8.0, 7.0, 5.0, 3.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            EqualizerPreset::Treble => [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 3.0, 5.0, 7.0, 8.0],
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            EqualizerPreset::Flat => "flat",
            EqualizerPreset::Rock => "rock",
            EqualizerPreset::Pop => "pop",
            EqualizerPreset::Jazz => "jazz",
            EqualizerPreset::Classical => "classical",
            EqualizerPreset::Electronic => "electronic",
            EqualizerPreset::Vocal => "vocal",
            EqualizerPreset::Bass => "bass",
            EqualizerPreset::Treble => "treble",
        }
    }
}

impl FromStr for EqualizerPreset {
    type Err = PlayerError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| PlayerError::configuration(format!("unknown equalizer preset: {name}")))
    }
}

/// Stored equalizer state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Equalizer {
    options: EqualizerOptions,
}

impl Equalizer {
    /// Builds an equalizer from options, clamping gains and restoring the
    /// fixed frequency of each slot.
    #[must_use]
    pub fn new(mut options: EqualizerOptions) -> Self {
        for (band, frequency) in options.bands.iter_mut().zip(BAND_FREQUENCIES) {
            band.frequency = frequency;
            band.gain = clamp_gain(band.gain);
        }
        Self { options }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.options.enabled = enabled;
    }

    /// Stored bands, regardless of the enabled flag.
    #[must_use]
    pub fn bands(&self) -> &[EqualizerBand; BAND_COUNT] {
        &self.options.bands
    }

    /// Stored gain of `band`.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::IndexOutOfBounds` for `band >= 10`.
    pub fn band_gain(&self, band: usize) -> PlayerResult<f32> {
        self.options
            .bands
            .get(band)
            .map(|b| b.gain)
            .ok_or(PlayerError::IndexOutOfBounds {
                index: band,
                len: BAND_COUNT,
            })
    }

    /// Stores a clamped gain for `band`.
    ///
    /// # Returns
    ///
    /// The gain actually stored.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::IndexOutOfBounds` for `band >= 10`.
    pub fn set_band_gain(&mut self, band: usize, gain: f32) -> PlayerResult<f32> {
        let slot = self
            .options
            .bands
            .get_mut(band)
            .ok_or(PlayerError::IndexOutOfBounds {
                index: band,
                len: BAND_COUNT,
            })?;
        slot.gain = clamp_gain(gain);
        Ok(slot.gain)
    }

    /// Stores the gains of all ten bands at once.
    ///
    /// Frequencies and quality factors in `bands` are ignored.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Configuration` unless exactly ten bands are given.
    pub fn set_bands(&mut self, bands: &[EqualizerBand]) -> PlayerResult<()> {
        if bands.len() != BAND_COUNT {
            return Err(PlayerError::configuration(format!(
                "expected {BAND_COUNT} equalizer bands, got {}",
                bands.len()
            )));
        }
        for (slot, band) in self.options.bands.iter_mut().zip(bands) {
            slot.gain = clamp_gain(band.gain);
        }
        Ok(())
    }

    /// Replaces every gain with the preset's curve.
    pub fn apply_preset(&mut self, preset: EqualizerPreset) {
        for (slot, gain) in self.options.bands.iter_mut().zip(preset.gains()) {
            slot.gain = gain;
        }
    }

    /// Sets every gain to zero, keeping the enabled flag.
    pub fn reset(&mut self) {
        self.apply_preset(EqualizerPreset::Flat);
    }

    /// Gain a live filter should use: the stored gain when enabled, else zero.
    #[must_use]
    pub fn effective_gain(&self, band: usize) -> f32 {
        match self.options.bands.get(band) {
            Some(b) if self.options.enabled => b.gain,
            _ => 0.0,
        }
    }

    /// Effective gains for every band.
    #[must_use]
    pub fn effective_gains(&self) -> [f32; BAND_COUNT] {
        std::array::from_fn(|band| self.effective_gain(band))
    }
}

fn clamp_gain(gain: f32) -> f32 {
    if gain.is_nan() {
        return 0.0;
    }
    gain.clamp(MIN_GAIN_DB, MAX_GAIN_DB)
}
