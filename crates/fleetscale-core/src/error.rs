//! Error types shared across fleetscale crates.

use thiserror::Error;

/// Result type alias for platform API calls.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Errors returned by a fleet platform backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("failed to build platform client: {0}")]
    Client(String),

    #[error("platform API error: {0}")]
    Api(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed {kind} {name}: {reason}")]
    Decode {
        kind: &'static str,
        name: String,
        reason: String,
    },
}

/// Errors raised while loading `fleetscale.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
