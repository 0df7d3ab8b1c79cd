//! Error types shared by the ZenRows middlewares.
//!
//! Errors are `Clone` so that a middleware can hand the same error back to the
//! framework (or to the next middleware) after inspecting it.

use thiserror::Error;

use crate::adapter::redact_api_key;

/// Details of a transport-level failure, captured from the HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportErrorDetails {
    pub message: String,
    pub is_connect: bool,
    pub is_timeout: bool,
}

impl TransportErrorDetails {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_connect: false,
            is_timeout: false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ZenRowsError {
    /// The request never produced a response (connection refused, timeout, reset...).
    #[error("transport error: {}", .0.message)]
    Transport(TransportErrorDetails),
    /// A component was asked to start without the settings it needs.
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    #[error("{0}")]
    General(String),
}

impl ZenRowsError {
    /// Whether the failure happened on the wire, as opposed to inside this crate.
    pub fn is_transport(&self) -> bool {
        matches!(self, ZenRowsError::Transport(_))
    }
}

impl From<reqwest::Error> for ZenRowsError {
    fn from(err: reqwest::Error) -> Self {
        let is_builder = err.is_builder();
        let is_connect = err.is_connect();
        let is_timeout = err.is_timeout();
        // reqwest embeds the full request URL, which carries the API key.
        let message = match err.url().map(redact_api_key) {
            Some(url) => format!("{} for url ({})", err.without_url(), url),
            None => err.to_string(),
        };
        if is_builder {
            return ZenRowsError::General(message);
        }
        ZenRowsError::Transport(TransportErrorDetails {
            message,
            is_connect,
            is_timeout,
        })
    }
}

impl From<url::ParseError> for ZenRowsError {
    fn from(err: url::ParseError) -> Self {
        ZenRowsError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for ZenRowsError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        ZenRowsError::InvalidHeader(err.to_string())
    }
}
