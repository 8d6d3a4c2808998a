//! Configuration error types.

use thiserror::Error;

/// Errors raised while loading or validating coordinator configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid size: {0}")]
    InvalidSize(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
