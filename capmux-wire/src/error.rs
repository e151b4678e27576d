/// Errors raised while encoding, decoding, or framing wire messages.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The underlying byte stream failed to read or write.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame's CBOR body could not be decoded.
    #[error("cbor decode error: {0}")]
    Decode(#[from] ciborium::de::Error<std::io::Error>),

    /// A frame could not be encoded to CBOR.
    #[error("cbor encode error: {0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),

    /// A protocol invariant was violated: an oversized frame, a chunk sequence gap,
    /// an unexpected frame during handshake, and so on.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Crate-local result alias.
pub type Result<T, E = Error> = core::result::Result<T, E>;

impl Error {
    /// Builds a [`Error::Protocol`] from any displayable message.
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol(message.into())
    }
}
