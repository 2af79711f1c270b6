// Error handling module
// Transport failures seen by a single call, and errors that stop the harness itself

use thiserror::Error;

/// A call that never produced an HTTP response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Request or connect timeout elapsed
    #[error("request timed out: {0}")]
    Timeout(String),

    /// TCP/TLS connection could not be established
    #[error("connection failed: {0}")]
    Connect(String),

    /// Request could not be built or sent
    #[error("request error: {0}")]
    Request(String),

    /// Response body could not be read
    #[error("body error: {0}")]
    Body(String),

    /// Anything reqwest does not categorize
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Short label used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Timeout(_) => "timeout",
            TransportError::Connect(_) => "connection_failed",
            TransportError::Request(_) => "request_error",
            TransportError::Body(_) => "body_error",
            TransportError::Other(_) => "unknown",
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let message = e.to_string();
        if e.is_timeout() {
            TransportError::Timeout(message)
        } else if e.is_connect() {
            TransportError::Connect(message)
        } else if e.is_request() {
            TransportError::Request(message)
        } else if e.is_body() || e.is_decode() {
            TransportError::Body(message)
        } else {
            TransportError::Other(message)
        }
    }
}

/// Errors that prevent a run from starting or completing
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Threshold expression could not be parsed
    #[error("Invalid threshold '{expression}': {reason}")]
    InvalidThreshold { expression: String, reason: String },

    /// HTTP client could not be constructed
    #[error("Client error: {0}")]
    Client(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;
