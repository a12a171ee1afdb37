use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Revision not found: {0}")]
    RevisionNotFound(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Endpoint unavailable: {0}")]
    EndpointUnavailable(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unexpected endpoint response: {0}")]
    EndpointProtocol(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Connection failures and timeouts are worth another attempt; anything
    /// the endpoint actually answered with is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::EndpointUnavailable(_) | Error::Timeout(_) => true,
            Error::Network(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) | Error::RevisionNotFound(_) => 2,
            Error::Repository(_) | Error::Git(_) => 3,
            Error::Cancelled => 130,
            _ => 1,
        }
    }

    /// Maps a transport-level reqwest failure onto the retry taxonomy.
    pub fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Error::Timeout(timeout)
        } else if err.is_connect() || err.is_request() {
            Error::EndpointUnavailable(err.to_string())
        } else if err.is_decode() || err.is_body() {
            Error::EndpointProtocol(err.to_string())
        } else {
            Error::Network(err)
        }
    }
}
