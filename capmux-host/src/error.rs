//! Host-side error type.

/// Errors the host can encounter outside the ordinary per-request error path
/// (which surfaces as an `ERR` frame to the engine rather than this type).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Wire(#[from] capmux_wire::Error),

    #[error("malformed capability urn: {0}")]
    Urn(#[from] capmux_urn::ParseError),

    #[error("plugin {plugin_idx} has no launcher configured for spawn-on-demand")]
    NoLauncher { plugin_idx: usize },

    #[error("failed to spawn plugin {plugin_idx}: {reason}")]
    SpawnFailed { plugin_idx: usize, reason: String },

    #[error("unknown plugin index {0}")]
    UnknownPlugin(usize),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
