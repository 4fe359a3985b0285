//! Renderer-side protocol support: discovery intake, SOAP control, GENA
//! eventing, capability negotiation, and the device registry.
//!
//! # Module Structure
//!
//! - `services` - UPnP service kinds and per-device service tables
//! - `soap` - low-level SOAP transport and request builder
//! - `gena` - GENA subscription HTTP operations
//! - `description` - device-description walking and SCPD action probing
//! - `capabilities` - sink ProtocolInfo parsing and codec negotiation
//! - `topology` - zone group parsing and master resolution
//! - `events` - LastChange attribute extraction
//! - `registry` - device ownership, lookups, and lifecycle
//! - `xml` - shared quick-xml helpers

pub mod capabilities;
pub mod description;
pub mod events;
pub mod gena;
pub mod registry;
pub mod services;
pub mod soap;
pub mod topology;
pub mod xml;

#[cfg(test)]
pub(crate) mod test_fixtures;

// Re-export the types most callers need
pub use registry::{DeviceRegistry, DeviceSlot, DeviceState};
pub use services::{ServiceKind, ServiceRecord, ServiceTable};
pub use soap::{ReqwestTransport, SoapTransport};
