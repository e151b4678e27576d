//! Relay-side error type.

/// Errors the relay halves can encounter outside ordinary frame forwarding
/// (which surfaces a peer's read/write failure as EOF for that peer, per §4.7).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Wire(#[from] capmux_wire::Error),

    #[error("connection closed before the first RELAY_NOTIFY arrived")]
    NoNotifyBeforeClose,
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
