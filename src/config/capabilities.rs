//! Transport capabilities and the gate that enforces them.

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
};

use serde::{Deserialize, Serialize};

use crate::error::{PlayerError, PlayerResult};

/// A transport operation that can be enabled or disabled by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    Play,
    Pause,
    Stop,
    Skip,
    SkipToNext,
    SkipToPrevious,
    SeekTo,
    SeekBy,
    SetVolume,
    SetRate,
}

impl Capability {
    /// Every capability, in declaration order.
    pub const ALL: [Capability; 10] = [
        Capability::Play,
        Capability::Pause,
        Capability::Stop,
        Capability::Skip,
        Capability::SkipToNext,
        Capability::SkipToPrevious,
        Capability::SeekTo,
        Capability::SeekBy,
        Capability::SetVolume,
        Capability::SetRate,
    ];

    /// Name used in error messages and option files.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Play => "play",
            Capability::Pause => "pause",
            Capability::Stop => "stop",
            Capability::Skip => "skip",
            Capability::SkipToNext => "skipToNext",
            Capability::SkipToPrevious => "skipToPrevious",
            Capability::SeekTo => "seekTo",
            Capability::SeekBy => "seekBy",
            Capability::SetVolume => "setVolume",
            Capability::SetRate => "setRate",
        }
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// The set of capabilities a host has enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    /// Creates a set containing exactly the given capabilities.
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self(capabilities.into_iter().collect())
    }

    /// Creates a set with every capability enabled.
    #[must_use]
    pub fn all() -> Self {
        Self::new(Capability::ALL)
    }

    /// Returns whether `capability` is enabled.
    #[must_use]
    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// Fails with `CapabilityDisabled` when `capability` is absent.
    ///
    /// Callers must run this before touching any engine state.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::CapabilityDisabled` naming the capability.
    pub fn check(&self, capability: Capability) -> PlayerResult<()> {
        if self.contains(capability) {
            Ok(())
        } else {
            Err(PlayerError::CapabilityDisabled { capability })
        }
    }
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self::all()
    }
}
