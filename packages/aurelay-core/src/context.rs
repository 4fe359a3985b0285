//! Network configuration context for the bridge.
//!
//! Renderers pull their audio from per-track HTTP servers, so every
//! `SetAVTransportURI` needs a URL the renderer can actually reach. This
//! module bundles the advertise IP (explicit or auto-detected) and builds
//! those URLs.

use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::protocol_constants::STREAM_PATH_PREFIX;

/// Network configuration shared across services.
///
/// # Modes
///
/// - **Explicit**: the advertise IP is specified in configuration.
/// - **Auto-detect**: the local IP is detected via [`IpDetector`] and may be
///   refreshed when the network changes.
#[derive(Clone)]
pub struct NetworkContext {
    /// IP address that renderers can reach us at.
    local_ip: Arc<RwLock<String>>,
    /// IP detector for checking network changes (auto-detect mode only).
    ip_detector: Option<Arc<dyn IpDetector>>,
}

impl NetworkContext {
    /// Creates a `NetworkContext` with an explicit advertise IP.
    #[must_use]
    pub fn explicit(advertise_ip: IpAddr) -> Self {
        Self {
            local_ip: Arc::new(RwLock::new(advertise_ip.to_string())),
            ip_detector: None,
        }
    }

    /// Creates a `NetworkContext` with auto-detection.
    ///
    /// # Errors
    /// Returns an error if the initial IP detection fails.
    pub fn auto_detect(ip_detector: Arc<dyn IpDetector>) -> Result<Self, NetworkError> {
        let local_ip = ip_detector.detect()?;
        Ok(Self {
            local_ip: Arc::new(RwLock::new(local_ip)),
            ip_detector: Some(ip_detector),
        })
    }

    /// Re-detects the local IP and updates the stored value.
    ///
    /// Only available if created with [`NetworkContext::auto_detect`].
    pub fn refresh_ip(&self) -> Result<String, NetworkError> {
        match &self.ip_detector {
            Some(detector) => {
                let ip = detector.detect()?;
                *self.local_ip.write() = ip.clone();
                Ok(ip)
            }
            None => Err(NetworkError::NoDetector),
        }
    }

    /// Returns the current advertise IP.
    #[must_use]
    pub fn local_ip(&self) -> String {
        self.local_ip.read().clone()
    }

    /// Returns a `UrlBuilder` bound to a specific stream-server port.
    ///
    /// Ports are per-stream (each track gets its own listener), which is why
    /// the context itself does not carry one.
    #[must_use]
    pub fn url_builder(&self, port: u16) -> UrlBuilder {
        UrlBuilder::new(self.local_ip(), port)
    }
}

/// Trait for detecting the local IP address.
///
/// Different environments may need different detection strategies.
pub trait IpDetector: Send + Sync {
    /// Detects the local IP address.
    fn detect(&self) -> Result<String, NetworkError>;
}

/// Default IP detector using the system's network interfaces.
#[derive(Debug, Clone, Default)]
pub struct LocalIpDetector;

impl LocalIpDetector {
    /// Creates a new `LocalIpDetector` wrapped in an Arc.
    #[must_use]
    pub fn arc() -> Arc<dyn IpDetector> {
        Arc::new(Self)
    }
}

impl IpDetector for LocalIpDetector {
    fn detect(&self) -> Result<String, NetworkError> {
        local_ip_address::local_ip()
            .map(|ip| ip.to_string())
            .map_err(|e| NetworkError::Detection(e.to_string()))
    }
}

/// Errors that can occur during network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Could not detect local IP address.
    #[error("failed to detect local IP: {0}")]
    Detection(String),

    /// No IP detector configured (explicit mode).
    #[error("no IP detector configured (using explicit mode)")]
    NoDetector,
}

/// Builder for stream URLs handed to renderers.
pub struct UrlBuilder {
    ip: String,
    port: u16,
}

impl UrlBuilder {
    /// Creates a new `UrlBuilder` for the given server address.
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// Returns the base URL for the server (e.g., `http://192.168.1.100:8700`).
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }

    /// Returns the stream URL for a given track index.
    #[must_use]
    pub fn stream_url(&self, index: u16) -> String {
        format!("{}{}{}", self.base_url(), STREAM_PATH_PREFIX, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    struct MockIpDetector {
        ip: String,
    }

    impl IpDetector for MockIpDetector {
        fn detect(&self) -> Result<String, NetworkError> {
            Ok(self.ip.clone())
        }
    }

    #[test]
    fn explicit_context_uses_provided_ip() {
        let ctx = NetworkContext::explicit(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100)));
        assert_eq!(ctx.local_ip(), "192.168.1.100");
    }

    #[test]
    fn auto_detect_context_uses_detector() {
        let detector = Arc::new(MockIpDetector {
            ip: "10.0.0.5".to_string(),
        });
        let ctx = NetworkContext::auto_detect(detector).unwrap();
        assert_eq!(ctx.local_ip(), "10.0.0.5");
    }

    #[test]
    fn explicit_context_refresh_returns_error() {
        let ctx = NetworkContext::explicit(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100)));
        assert!(matches!(ctx.refresh_ip(), Err(NetworkError::NoDetector)));
    }

    #[test]
    fn url_builder_generates_stream_urls() {
        let builder = UrlBuilder::new("192.168.1.100", 8701);
        assert_eq!(builder.base_url(), "http://192.168.1.100:8701");
        assert_eq!(builder.stream_url(17), "http://192.168.1.100:8701/stream/17");
    }
}
