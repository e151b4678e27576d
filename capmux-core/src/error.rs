/// Errors shared by the ambient crates (config loading, logging bootstrap).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The configuration file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file was not valid TOML, or a required field was missing.
    #[error("config error: {0}")]
    Config(String),
}

/// Crate-local result alias.
pub type Result<T, E = Error> = core::result::Result<T, E>;

impl Error {
    /// Builds a [`Error::Config`] from any displayable message.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
