//! Configuration error types.

use thiserror::Error;

/// Errors that can occur while loading or addressing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file on disk could not be parsed as JSON.
    #[error("failed to parse config at {path}: {source}")]
    ParseError {
        /// The file that failed to parse.
        path: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A config file could not be read.
    #[error("failed to read config at {path}: {source}")]
    Io {
        /// The file that failed to read.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A dot-path did not resolve to an addressable location (e.g. it
    /// walks through a non-object value).
    #[error("invalid config path: {0}")]
    InvalidPath(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
