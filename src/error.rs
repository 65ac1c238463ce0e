//! Error types for every stage of the poll → compute → publish pipeline.
//!
//! Only [`ConfigError`] and a [`ConnectionError`] raised during the initial
//! connect are fatal. Everything else is logged by the update cycle and
//! degrades to "nothing published for that stop this cycle".

use reqwest::StatusCode;
use thiserror::Error;

/// Startup configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more required variables are unset or empty
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),

    /// A variable is present but its value is unusable
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    /// The stop registry file is malformed or inconsistent
    #[error("stop registry: {0}")]
    Registry(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A single stop's fetch failed. The stop is skipped for this cycle.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API returned error status: {0}")]
    Status(StatusCode),

    #[error("unparsable response: {0}")]
    Parse(#[from] ParseError),

    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

/// A response document or one of its records could not be interpreted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("timestamp {value:?} does not match format {format:?}")]
    Timestamp { value: String, format: &'static str },

    #[error("expected <{expected}> document, found <{found}>")]
    UnexpectedRoot {
        expected: &'static str,
        found: String,
    },
}

/// A value could not be handed to the broker. The value is dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("not connected to broker")]
    NotConnected,

    #[error("broker client rejected publish: {0}")]
    Rejected(String),
}

/// Establishing or keeping the broker session failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("broker refused connection: {0}")]
    Refused(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("no CONNACK within {secs} seconds")]
    Timeout { secs: u64 },

    #[error("publisher event loop already started")]
    AlreadyStarted,
}
