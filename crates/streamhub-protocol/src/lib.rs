//! Wire types for the streamhub event stream.
//!
//! The server pushes UTF-8 text frames tagged with a channel name. This crate
//! owns the pure, transport-independent half of the client: the closed channel
//! set, envelope decoding, logical-event-type resolution, and the known-schema
//! event union the surrounding application renders.

pub mod envelope;
pub mod events;

pub use envelope::{Channel, GENERIC_EVENT, decode_body, resolve_event_type};
pub use events::StreamEvent;
