//! Operational error context propagation with `anyhow`.
//!
//! Collaborator failures that never reach a caller are given context here
//! and logged through `ErrorReporter`.

use std::{error::Error as StdError, fmt::Display};

use {
    anyhow::{Context, Error, Result as AnyhowResult},
    tracing::{debug, warn},
};

/// Extension trait for enhanced error context.
pub trait ResultExt<T, E> {
    /// Adds context to an error with a static string.
    fn add_context(self, context: &'static str) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static;

    /// Adds context to an error with a formatted string.
    fn add_contextf(self, format: impl Display) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn add_context(self, context: &'static str) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.context(context)
    }

    fn add_contextf(self, format: impl Display) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.context(format.to_string())
    }
}

/// Logging for failures the engine deliberately does not propagate.
///
/// Used by the metadata preloader, the audio graph and remote command
/// routing, where there is no caller left to hand the error to.
pub struct ErrorReporter;

impl ErrorReporter {
    /// Logs an expected failure, such as an unreadable preload target.
    pub fn debug(error: &Error, context: &str) {
        debug!(context = context, error = %Self::to_user_message(error), "Swallowed error");
    }

    /// Logs a failure that degrades playback without stopping it.
    pub fn warn(error: &Error, context: &str) {
        warn!(context = context, error = %Self::to_user_message(error), "Recoverable error");
    }

    /// Converts an error chain to a single-line message.
    ///
    /// Context layers are joined outermost first, separated by `": "`.
    pub fn to_user_message(error: &Error) -> String {
        error
            .chain()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(": ")
    }
}
