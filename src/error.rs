//! Error types for Heartwatch
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in Heartwatch
#[derive(Debug, Error)]
pub enum HeartwatchError {
    /// Invalid configuration value
    #[error("Config error: {0}")]
    Config(String),

    /// Could not obtain the session credential
    #[error("Token acquisition failed: {0}")]
    TokenAcquisition(String),

    /// Heartbeat request never produced a response
    #[error("Heartbeat transport error: {0}")]
    HeartbeatTransport(String),

    /// Heartbeat endpoint answered outside the success range
    #[error("Heartbeat rejected with status {status} {status_text}")]
    HeartbeatStatus { status: u16, status_text: String },

    /// Every attempt of the retry policy failed
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        last: Box<HeartwatchError>,
    },

    /// Document save or dirty check failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl HeartwatchError {
    /// Heartbeat failures are retried locally by the scheduler
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HeartwatchError::HeartbeatTransport(_) | HeartwatchError::HeartbeatStatus { .. }
        )
    }

    /// Errors that end the keep-alive loop
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HeartwatchError::Config(_)
                | HeartwatchError::TokenAcquisition(_)
                | HeartwatchError::RetryExhausted { .. }
        )
    }
}

/// Result type alias for Heartwatch operations
pub type Result<T> = std::result::Result<T, HeartwatchError>;
