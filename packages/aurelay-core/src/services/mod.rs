//! Controller-facing glue.
//!
//! Thin by design: translate controller commands into SOAP actions, start
//! and retire stream servers, relay renderer state upward.
//!
//! - `coordinator` - per-renderer stream server ownership
//! - `playback` - AVTransport command helpers
//! - `volume` - volume relay and group-volume mean
//! - `gena_events` - NOTIFY dispatch into device state and the event bus

pub mod coordinator;
pub mod gena_events;
pub mod playback;
pub mod volume;

pub use coordinator::StreamCoordinator;
pub use gena_events::handle_notify;
