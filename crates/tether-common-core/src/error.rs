//! Error types shared by the Tether crates.

use thiserror::Error;

/// The main error type for Tether utility operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Generic error with custom message.
    #[error("{0}")]
    Generic(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system error with the offending path.
    #[error("{message}")]
    FileSystem {
        message: String,
        path: Option<String>,
        #[source]
        source: Option<std::io::Error>,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a new generic error.
    pub fn new(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a file system error for `path`.
    pub fn fs(
        message: impl Into<String>,
        path: impl AsRef<std::path::Path>,
        source: std::io::Error,
    ) -> Self {
        Self::FileSystem {
            message: message.into(),
            path: Some(path.as_ref().to_string_lossy().to_string()),
            source: Some(source),
        }
    }

    /// The path attached to a file system error, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::FileSystem { path, .. } => path.as_deref(),
            _ => None,
        }
    }
}

/// Result type alias using Tether's Error.
pub type Result<T> = std::result::Result<T, Error>;
