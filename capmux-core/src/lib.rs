//! Ambient, cross-crate concerns: configuration, error conventions, and the
//! logging bootstrap used by `capmuxd` and the test harness.

mod config;
mod error;
mod logging;

pub use config::{HostConfig, PluginSpec};
pub use error::{Error, Result};
pub use logging::init_tracing;
