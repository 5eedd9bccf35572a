//! Hub configuration.

use serde::{Deserialize, Serialize};

/// Default stream endpoint when none is configured.
pub const DEFAULT_STREAM_URL: &str = "http://127.0.0.1:8080/api/realtime/stream";

/// Configuration for a [`crate::StreamHub`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Server-push endpoint delivering channel-tagged frames.
    pub stream_url: String,

    /// Bearer token sent with the stream request, if the endpoint requires one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Seconds without traffic before the request is considered dead. The
    /// request timeout is twice this, leaving room for server keepalives.
    pub keepalive_timeout_secs: u64,

    /// Reconnection tuning for the transport task.
    pub backoff: BackoffConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            stream_url: DEFAULT_STREAM_URL.to_string(),
            auth_token: None,
            keepalive_timeout_secs: 60,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Exponential backoff settings for transport reconnects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Base delay in milliseconds.
    pub base_ms: u64,

    /// Cap on the delay in milliseconds.
    pub max_ms: u64,

    /// Consecutive failed attempts before the transport gives up.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 500,
            max_ms: 30_000,
            max_attempts: 50,
        }
    }
}
