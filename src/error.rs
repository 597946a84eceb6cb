//! Error types for the Gatekeeper service.

use thiserror::Error;

/// Main error type for Gatekeeper operations.
#[derive(Error, Debug)]
pub enum GatekeeperError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A policy with a zero window, limit or block duration
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// Caller passed an identifier the limiter cannot key on
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for GatekeeperError {
    fn from(e: config::ConfigError) -> Self {
        GatekeeperError::Config(e.to_string())
    }
}

impl From<serde_yaml::Error> for GatekeeperError {
    fn from(e: serde_yaml::Error) -> Self {
        GatekeeperError::Config(e.to_string())
    }
}

/// Result type alias for Gatekeeper operations.
pub type Result<T> = std::result::Result<T, GatekeeperError>;
