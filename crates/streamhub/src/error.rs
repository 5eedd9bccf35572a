//! Connection construction errors.
//!
//! These never escape [`crate::StreamHub::connect`]: construction failure is
//! logged and surfaced as a `None` handle, so callers treat it as "not
//! connected" without crashing.

use thiserror::Error;

/// Errors raised while constructing the push connection.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The stream endpoint is not a usable URL.
    #[error("invalid stream url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),

    /// No async runtime is available to host the transport task.
    #[error("no async runtime available: {0}")]
    Runtime(String),
}

pub type StreamResult<T> = Result<T, StreamError>;
