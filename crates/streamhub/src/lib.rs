//! Event stream hub.
//!
//! Owns one live server-push connection, decodes channel-tagged frames, and
//! fans decoded payloads out to listeners keyed by logical event type. Every
//! dispatch is additionally mirrored to passive "any event" observers.

pub mod config;
pub mod error;
pub mod hub;
mod stream;

pub use config::{BackoffConfig, HubConfig, DEFAULT_STREAM_URL};
pub use error::{StreamError, StreamResult};
pub use hub::{ConnectionHandle, HandlerId, StreamHub, Subscription};
