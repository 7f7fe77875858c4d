//! Error types for the logging subsystem

use thiserror::Error;

/// Errors raised while installing the global subscriber
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoggingError {
    /// A global subscriber is already installed, or the registry refused ours
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// Unknown level name or malformed filter directive
    #[error("Invalid logging configuration: {0}")]
    InvalidConfiguration(String),
}
