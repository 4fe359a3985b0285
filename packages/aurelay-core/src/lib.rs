//! Aurelay Core - library for the Aurelay audio bridge.
//!
//! Aurelay bridges a push-based music-controller protocol (decoded audio
//! delivered into a ring buffer, transport commands, volume) to UPnP/AV
//! network renderers. Each discovered renderer becomes a virtual player;
//! each active track is served to its renderer by a dedicated single-client
//! HTTP server with dialect-specific restart handling.
//!
//! # Architecture
//!
//! - [`renderer`]: device registry, SOAP/GENA protocol support, capability
//!   negotiation, topology resolution
//! - [`stream`]: per-track HTTP audio servers and the decode-side seam
//! - [`services`]: controller-facing glue (commands, volume, event relay)
//! - [`context`]: advertise-IP detection and stream URL construction
//! - [`events`]: typed event bus towards the controller side
//! - [`state`]: configuration
//! - [`error`]: centralized error types

#![warn(clippy::all)]

pub mod context;
pub mod error;
pub mod events;
pub mod protocol_constants;
pub mod renderer;
pub mod services;
pub mod state;
pub mod stream;

// Re-export commonly used types at the crate root
pub use context::{IpDetector, LocalIpDetector, NetworkContext, NetworkError, UrlBuilder};
pub use error::{BridgeError, BridgeResult, SoapResult};
pub use events::{BridgeEvent, EventBus};
pub use state::{BridgeConfig, PlaybackState};

// Re-export renderer types
pub use renderer::events::TransportState;
pub use renderer::gena::GenaClient;
pub use renderer::{
    DeviceRegistry, DeviceSlot, ReqwestTransport, ServiceKind, SoapTransport,
};

// Re-export stream types
pub use stream::{
    DecodeState, StreamHandle, StreamMetadata, StreamPipeline, TrackProfile,
};

// Re-export service types
pub use services::{handle_notify, StreamCoordinator};
