//! Error types shared by the ember crates.

use thiserror::Error;

/// Top-level error for everything above the Vulkan layer.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan failures that were already turned into text by a lower layer
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window or surface glue failures
    #[error("Window error: {0}")]
    Window(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or inconsistent configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type alias using the shared [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
