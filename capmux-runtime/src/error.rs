/// Errors raised by the plugin-side runtime.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The underlying wire protocol failed (I/O, codec, or protocol violation).
    #[error(transparent)]
    Wire(#[from] capmux_wire::Error),

    /// A required argument was absent from the request.
    #[error("missing argument: {0}")]
    MissingArgument(String),

    /// The request's argument payload referenced a media URN this `Cap` never
    /// declared.
    #[error("unknown argument: {0}")]
    UnknownArgument(String),

    /// `REQ.cap` named a capability with no registered handler.
    #[error("no handler registered for {0}")]
    NotFound(String),

    /// A handler returned an application-level failure.
    #[error("handler error [{code}]: {message}")]
    Handler { code: String, message: String },
}

/// Crate-local result alias.
pub type Result<T, E = Error> = core::result::Result<T, E>;

impl Error {
    /// The short ASCII error code this error should be reported to the peer under
    /// (§6.3). Unknown handler-chosen codes are returned verbatim.
    pub fn code(&self) -> &str {
        match self {
            Error::Wire(_) => "PROTOCOL",
            Error::MissingArgument(_) => "MISSING_ARGUMENT",
            Error::UnknownArgument(_) => "UNKNOWN_ARGUMENT",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Handler { code, .. } => code,
        }
    }
}
