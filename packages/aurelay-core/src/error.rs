//! Centralized error types for the Aurelay core library.
//!
//! Each protocol module defines its own `thiserror` enum close to the code
//! that produces it; this module provides the crate-wide [`BridgeError`]
//! umbrella plus `From` conversions so callers can use one `Result` alias
//! across subsystem boundaries.

use thiserror::Error;

use crate::renderer::description::DescriptionError;
use crate::renderer::gena::GenaError;
use crate::renderer::soap::SoapError;
use crate::stream::server::StreamError;

/// Application-wide error type for the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// SOAP request to a renderer failed.
    #[error("SOAP request failed: {0}")]
    Soap(String),

    /// GENA subscription operation failed.
    #[error("GENA operation failed: {0}")]
    Gena(String),

    /// Device description could not be parsed into a usable service table.
    #[error("device description error: {0}")]
    Description(String),

    /// Stream server failed to start or aborted.
    #[error("stream error: {0}")]
    Stream(String),

    /// The renderer registry is at capacity.
    #[error("renderer registry is full")]
    RegistryFull,

    /// Renderer not found or no longer running.
    #[error("renderer not found: {0}")]
    RendererNotFound(String),

    /// The renderer lacks a service required for the requested operation.
    #[error("renderer {0} has no {1} service")]
    MissingService(String, &'static str),

    /// Network-related error (IP detection, URL construction).
    #[error("network error: {0}")]
    Network(String),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl BridgeError {
    /// Returns a machine-readable error code, used in structured logs.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Soap(_) => "soap_error",
            Self::Gena(_) => "gena_error",
            Self::Description(_) => "description_error",
            Self::Stream(_) => "stream_error",
            Self::RegistryFull => "registry_full",
            Self::RendererNotFound(_) => "renderer_not_found",
            Self::MissingService(_, _) => "missing_service",
            Self::Network(_) => "network_error",
            Self::Configuration(_) => "configuration_error",
        }
    }
}

impl From<SoapError> for BridgeError {
    fn from(err: SoapError) -> Self {
        Self::Soap(err.to_string())
    }
}

impl From<GenaError> for BridgeError {
    fn from(err: GenaError) -> Self {
        Self::Gena(err.to_string())
    }
}

impl From<DescriptionError> for BridgeError {
    fn from(err: DescriptionError) -> Self {
        Self::Description(err.to_string())
    }
}

impl From<StreamError> for BridgeError {
    fn from(err: StreamError) -> Self {
        Self::Stream(err.to_string())
    }
}

// Re-export Result type aliases from their defining modules
pub use crate::renderer::soap::SoapResult;

/// Convenient Result alias for application-wide operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soap_error_converts_with_code() {
        let err: BridgeError = SoapError::Parse.into();
        assert_eq!(err.code(), "soap_error");
    }

    #[test]
    fn registry_full_has_stable_code() {
        assert_eq!(BridgeError::RegistryFull.code(), "registry_full");
    }
}
