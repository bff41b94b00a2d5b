use thiserror::Error;

/// Errors raised while configuring the engine runtime.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid runtime configuration (buffer sizes, inconsistent flags).
    #[error("Invalid runtime configuration: {0}")]
    Config(String),

    /// A host bridge the engine cannot run without was not injected.
    #[error("Missing host bridge {capability}: {message}")]
    CapabilityMissing { capability: String, message: String },

    /// The tracing subscriber could not be installed.
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, Error>;
