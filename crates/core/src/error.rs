//! Error types for docstream.
//!
//! This module defines a unified error enum covering configuration, corpus
//! loading, request validation, and the failure modes of the streaming
//! query protocol.

use thiserror::Error;

/// Unified error type for docstream.
///
/// All fallible functions in the workspace return `Result<T, AppError>`.
/// Nothing in the request path panics; errors are represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The document corpus could not be loaded
    #[error("Corpus error: {0}")]
    Corpus(String),

    /// Invalid client input, e.g. a missing or empty query
    #[error("Invalid input: {0}")]
    Input(String),

    /// Network or channel failure while a query is in flight
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Frames arrived out of order or could not be parsed
    #[error("Protocol fault: {0}")]
    Protocol(String),

    /// A query is already outstanding for this session
    #[error("A query is already in progress")]
    Busy,

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether this error means the answer stream broke mid-flight.
    ///
    /// Protocol faults are reported to users exactly like channel failures.
    pub fn is_upstream(&self) -> bool {
        matches!(self, AppError::Upstream(_) | AppError::Protocol(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_fault_counts_as_upstream() {
        assert!(AppError::Protocol("token after done".to_string()).is_upstream());
        assert!(AppError::Upstream("connection reset".to_string()).is_upstream());
        assert!(!AppError::Input("Query is required".to_string()).is_upstream());
        assert!(!AppError::Busy.is_upstream());
    }

    #[test]
    fn test_json_error_conversion() {
        let err: AppError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, AppError::Serialization(_)));
    }
}
