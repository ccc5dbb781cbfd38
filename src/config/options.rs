//! Player setup options with XDG-aware file loading.
//!
//! `SetupOptions` is fixed once merged; hosts change it only through
//! `UpdateOptions`, which carries the fields they want to replace.

use std::{
    env::var,
    fs::read_to_string,
    io::Error as StdError,
    path::{Path, PathBuf},
    time::Duration,
};

use {
    serde::{Deserialize, Serialize},
    serde_json::{Error as SerdeJsonError, from_str},
    thiserror::Error,
    tracing::debug,
};

use crate::{
    audio::{equalizer::EqualizerOptions, graph::AnalyserConfig},
    config::capabilities::CapabilitySet,
};

/// Error type for options operations.
#[derive(Error, Debug)]
pub enum OptionsError {
    /// Failed to read the options file.
    #[error("IO error: {0}")]
    IoError(#[from] StdError),
    /// Failed to deserialize the options file.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] SerdeJsonError),
    /// Invalid options value.
    #[error("Invalid options value: {reason}")]
    InvalidValue { reason: String },
}

/// Sampling interval used when none is configured.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration applied by `setup_player`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SetupOptions {
    /// Wait for `CanPlayThrough` rather than `CanPlay` before a load counts as ready.
    pub wait_for_buffer: bool,
    /// Progress sampling interval in seconds.
    pub progress_update_interval: f64,
    /// Whether to drive the system "now playing" integration.
    pub media_session: bool,
    /// Enabled transport capabilities.
    pub capabilities: CapabilitySet,
    /// Initial equalizer configuration.
    pub equalizer: Option<EqualizerOptions>,
    /// Analyser node configuration.
    pub analyser: AnalyserConfig,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            wait_for_buffer: true,
            progress_update_interval: DEFAULT_PROGRESS_INTERVAL.as_secs_f64(),
            media_session: true,
            capabilities: CapabilitySet::all(),
            equalizer: None,
            analyser: AnalyserConfig::default(),
        }
    }
}

/// Partial options for `update_options`. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateOptions {
    pub wait_for_buffer: Option<bool>,
    pub progress_update_interval: Option<f64>,
    pub media_session: Option<bool>,
    pub capabilities: Option<CapabilitySet>,
}

impl SetupOptions {
    /// Loads options from a JSON file.
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns `OptionsError` if the file cannot be read, parsed, or validated.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, OptionsError> {
        let path = path.as_ref();
        debug!("Loading player options from {:?}", path);
        let contents = read_to_string(path)?;
        let options: SetupOptions = from_str(&contents)?;
        options.validate()?;
        Ok(options)
    }

    /// Checks value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `OptionsError::InvalidValue` for a progress interval that is
    /// not a positive, representable `Duration`, or for an invalid analyser
    /// configuration.
    pub fn validate(&self) -> Result<(), OptionsError> {
        validate_interval(self.progress_update_interval)?;
        self.analyser
            .validate()
            .map_err(|reason| OptionsError::InvalidValue { reason })
    }

    /// Sampling interval as a `Duration`.
    ///
    /// Falls back to one second for an interval that `validate` rejects.
    #[must_use]
    pub fn progress_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.progress_update_interval)
            .ok()
            .filter(|interval| !interval.is_zero())
            .unwrap_or(DEFAULT_PROGRESS_INTERVAL)
    }

    /// Merges `update` into these options.
    ///
    /// # Returns
    ///
    /// `true` when the progress interval changed.
    ///
    /// # Errors
    ///
    /// Returns `OptionsError::InvalidValue` without applying anything if the
    /// update carries an invalid interval.
    pub fn merge(&mut self, update: UpdateOptions) -> Result<bool, OptionsError> {
        if let Some(interval) = update.progress_update_interval {
            validate_interval(interval)?;
        }

        let mut interval_changed = false;
        if let Some(wait) = update.wait_for_buffer {
            self.wait_for_buffer = wait;
        }
        if let Some(interval) = update.progress_update_interval {
            interval_changed = (interval - self.progress_update_interval).abs() > f64::EPSILON;
            self.progress_update_interval = interval;
        }
        if let Some(media_session) = update.media_session {
            self.media_session = media_session;
        }
        if let Some(capabilities) = update.capabilities {
            self.capabilities = capabilities;
        }
        Ok(interval_changed)
    }
}

fn validate_interval(interval: f64) -> Result<(), OptionsError> {
    match Duration::try_from_secs_f64(interval) {
        Ok(duration) if !duration.is_zero() => Ok(()),
        _ => Err(OptionsError::InvalidValue {
            reason: format!(
                "progress update interval must be a positive number of seconds, got {interval}"
            ),
        }),
    }
}

/// Default location of the options file.
///
/// Uses `XDG_CONFIG_HOME` if set, otherwise `$HOME/.config`.
#[must_use]
pub fn default_options_path() -> PathBuf {
    let mut path = get_xdg_config_home();
    path.push("tonearm");
    path.push("options.json");
    path
}

fn get_xdg_config_home() -> PathBuf {
    if let Ok(config_home) = var("XDG_CONFIG_HOME")
        && !config_home.is_empty()
    {
        return PathBuf::from(config_home);
    }

    if let Ok(home) = var("HOME") {
        let mut path = PathBuf::from(home);
        path.push(".config");
        return path;
    }

    PathBuf::from(".")
}
