//! # Error Module
//!
//! The error taxonomy shared by every stage of the crawl pipeline.
//!
//! Per-unit failures (`Transport`, `Decode`, `Structural`) are absorbed by the
//! coordinator: the unit is resolved, the failure is reported on the diagnostic
//! channel and the crawl continues. Only `Configuration` and `Internal` errors
//! stop the whole run.

use thiserror::Error;

/// A failed network fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}", describe_transport(.timeout, .status, .message))]
pub struct TransportError {
    /// True when the request exceeded its deadline.
    pub timeout: bool,
    /// HTTP status of a non-success response, when one was received.
    pub status: Option<u16>,
    pub message: String,
}

impl TransportError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            timeout: true,
            status: None,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            timeout: false,
            status: None,
            message: message.into(),
        }
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            timeout: false,
            status: Some(status),
            message: message.into(),
        }
    }
}

fn describe_transport(timeout: &bool, status: &Option<u16>, message: &str) -> String {
    match (timeout, status) {
        (true, _) => format!("request timed out: {message}"),
        (false, Some(code)) => format!("HTTP {code}: {message}"),
        (false, None) => format!("connection error: {message}"),
    }
}

/// Errors produced while configuring or running a crawl.
#[derive(Debug, Clone, Error)]
pub enum CrawlError {
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// Malformed document or unexpected top-level shape.
    #[error("decode failure: {0}")]
    Decode(String),

    /// A recognized node kind is missing a required field.
    #[error("structural failure: {0}")]
    Structural(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CrawlError {
    /// Returns true for errors that must stop the whole crawl.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CrawlError::Configuration(_) | CrawlError::Internal(_))
    }
}

impl From<serde_json::Error> for CrawlError {
    fn from(err: serde_json::Error) -> Self {
        CrawlError::Decode(err.to_string())
    }
}

impl From<url::ParseError> for CrawlError {
    fn from(err: url::ParseError) -> Self {
        CrawlError::Structural(format!("invalid URI: {err}"))
    }
}
