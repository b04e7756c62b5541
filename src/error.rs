//! Error types shared across the notifier.
//!
//! Configuration errors are the only fatal ones; upstream and dispatch
//! errors are logged where they happen and never leave the request.

use thiserror::Error;

/// Errors raised while loading or validating configuration at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more required values were not provided
    #[error("Missing required configuration values: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    /// A value was present but unusable
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// The configuration file passed on the command line does not exist
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// The underlying config sources could not be read or deserialized
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// Failure talking to the search service or the Send API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The request never produced a response
    #[error("Request to {service} failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with something other than 200 OK
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The body of a 200 response was not what we expected
    #[error("Could not decode {service} response: {reason}")]
    Decode {
        service: &'static str,
        reason: String,
    },
}

impl UpstreamError {
    /// Wrap a reqwest error, dropping the URL so query credentials never reach the logs.
    pub fn transport(service: &'static str, source: reqwest::Error) -> Self {
        UpstreamError::Transport {
            service,
            source: source.without_url(),
        }
    }
}

/// A delivery item that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Malformed entry list: expected an array, got {kind}")]
    MalformedEntryList { kind: &'static str },

    #[error("Malformed entry #{index}: {reason}")]
    MalformedEntry { index: usize, reason: String },

    #[error("Malformed messaging event #{event_index} in entry #{entry_index}: {reason}")]
    MalformedEvent {
        entry_index: usize,
        event_index: usize,
        reason: String,
    },
}
