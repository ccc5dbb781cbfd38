//! Player configuration: setup options and the capability gate.

pub mod capabilities;
pub mod options;

pub use {
    capabilities::{Capability, CapabilitySet},
    options::{OptionsError, SetupOptions, UpdateOptions, default_options_path},
};
