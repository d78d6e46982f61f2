//! # Error Types
//!
//! Custom error types for the telemetry gateway using `thiserror`.

use thiserror::Error;

/// Main error type for the telemetry gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A channel has not produced any reading yet
    #[error("no data available: {0}")]
    NotFound(String),

    /// Local file open/write/rename failures
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bridge round-trip failures (connect, timeout, bad status, bad payload)
    #[error("bridge transport error: {0}")]
    Transport(String),

    /// Object storage upload failures
    #[error("upload error: {0}")]
    Upload(String),

    /// Malformed input (inverse table construction, channel limits, requests)
    #[error("validation error: {0}")]
    Validation(String),

    /// JSON encoding/decoding errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

impl GatewayError {
    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::NotFound(_) => "not_found",
            GatewayError::Io(_) => "io",
            GatewayError::Transport(_) => "transport",
            GatewayError::Upload(_) => "upload",
            GatewayError::Validation(_) => "validation",
            GatewayError::Serialization(_) => "serialization",
            GatewayError::Config(_) => "config",
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Transport(format!("request timed out: {}", err))
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// Result type alias for the telemetry gateway
pub type Result<T> = std::result::Result<T, GatewayError>;
