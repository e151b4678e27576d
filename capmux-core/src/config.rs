//! `HostConfig`: the TOML configuration for the `capmuxd` host binary.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

fn default_listen_addr() -> String {
    "127.0.0.1:7420".to_string()
}

fn default_max_frame() -> u64 {
    1 << 20 // 1 MiB
}

fn default_max_chunk() -> u64 {
    1 << 16 // 64 KiB
}

/// One plugin the host knows about before it has ever been spawned: the command
/// used to launch it, its arguments, and the capability URNs it is expected to
/// advertise once running. The process launcher itself stays an external
/// collaborator behind a trait (see `capmux-host::launch`).
#[derive(Debug, Clone, Deserialize)]
pub struct PluginSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cap_urns: Vec<String>,
}

/// Configuration for a `capmuxd` host process.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// The address the host listens on for the upstream "engine" connection.
    pub listen_addr: String,
    /// Proposed `max_frame` this process offers in its own `HELLO`.
    pub max_frame: u64,
    /// Proposed `max_chunk` this process offers in its own `HELLO`.
    pub max_chunk: u64,
    /// Plugins registered (but not yet spawned) at startup.
    pub plugins: Vec<PluginSpec>,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            listen_addr: default_listen_addr(),
            max_frame: default_max_frame(),
            max_chunk: default_max_chunk(),
            plugins: Vec::new(),
        }
    }
}

impl HostConfig {
    /// Loads and parses a TOML configuration file, falling back to per-field
    /// defaults for anything the file omits.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: HostConfig = toml::from_str(&text)
            .map_err(|e| Error::config(format!("{}: {e}", path.as_ref().display())))?;
        Ok(config)
    }
}
