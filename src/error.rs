//! Error types for the explorer client core
//!
//! Three recoverable categories, none fatal to the session:
//! transport (no response), protocol (response signals failure, surfaced as a
//! `QueryFailure` or a dataset error string, never as an `Err`), and local
//! validation (short-circuits before any request).

use thiserror::Error;

/// Main error type for the explorer
#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The request could not complete, so there is no response to inspect
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("could not reach {url}: {message}")]
    Unreachable { url: String, message: String },

    #[error("request to {url} failed while reading the response: {message}")]
    Interrupted { url: String, message: String },

    #[error("could not build request: {0}")]
    InvalidRequest(String),

    /// Canned transports ran out of scripted responses
    #[error("no response scripted for {0}")]
    NotScripted(String),
}

impl TransportError {
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else if err.is_body() || err.is_decode() {
            TransportError::Interrupted {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            TransportError::Unreachable {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Local, pre-network rejections
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("choose a file to upload first")]
    NoFileSelected,

    #[error("there is no retryable failure to retry")]
    RetryUnavailable,

    #[error("a query is already running")]
    QueryInFlight,

    #[error("a dataset operation is already running")]
    DatasetBusy,
}

/// Environment or flag values that cannot be used
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid API base URL '{value}': {reason}")]
    InvalidBaseUrl { value: String, reason: String },

    #[error("invalid viewport '{0}', expected WIDTHxHEIGHT")]
    InvalidViewport(String),

    #[error("invalid window margin '{0}'")]
    InvalidMargin(String),
}

pub type Result<T> = std::result::Result<T, ExplorerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_converts_into_explorer_error() {
        let err: ExplorerError = ValidationError::NoFileSelected.into();
        assert_eq!(
            err.to_string(),
            "Validation error: choose a file to upload first"
        );
    }

    #[test]
    fn test_transport_message_names_url() {
        let err = TransportError::Unreachable {
            url: "http://127.0.0.1:8000/query".into(),
            message: "connection refused".into(),
        };
        assert!(err.to_string().contains("http://127.0.0.1:8000/query"));
    }
}
