//! Wire shape of stepflow progress events: type + payload + envelope.
//!
//! This crate does not depend on stepflow. Stepflow bridges its `ProgressEvent` into
//! [`ProtocolEvent`] and calls [`to_json`] to get one NDJSON-ready object per event.

pub mod envelope;
pub mod event;

pub use envelope::{to_json, Envelope, EnvelopeState};
pub use event::ProtocolEvent;
