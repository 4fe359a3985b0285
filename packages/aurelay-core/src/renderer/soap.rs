//! Low-level SOAP protocol implementation for UPnP renderer communication.
//!
//! This module handles the raw SOAP envelope building, HTTP transport,
//! and fault parsing. Higher-level command helpers live in `services/`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use super::xml::{escape_xml, first_element_text};
use crate::protocol_constants::SOAP_TIMEOUT_SECS;

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur during SOAP operations with renderers.
#[derive(Debug, Error)]
pub enum SoapError {
    /// HTTP request to the renderer failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Renderer returned a non-success HTTP status without a SOAP fault.
    #[error("HTTP error {0}: {1}")]
    HttpStatus(u16, String),

    /// Renderer returned a SOAP fault response.
    #[error("SOAP fault: {0}")]
    Fault(String),

    /// Failed to parse SOAP response XML.
    #[error("failed to parse SOAP response")]
    Parse,
}

/// Convenient Result alias for SOAP operations.
pub type SoapResult<T> = Result<T, SoapError>;

impl SoapError {
    /// Returns true if this error is transient and the operation should be
    /// retried.
    ///
    /// Transient UPnP AVTransport fault codes:
    /// - 701: Transition not available (device changing states)
    /// - 714: Illegal seek target (previous source still loading)
    /// - 716: Resource not found (device busy initializing)
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            SoapError::Fault(msg) => {
                msg.contains("701")
                    || msg.contains("714")
                    || msg.contains("716")
                    || msg.to_lowercase().contains("transition")
            }
            // Network timeouts can also be transient
            SoapError::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SOAP Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Transport seam for SOAP invocations.
///
/// Group-volume computation, topology fetches and transport commands depend
/// on this trait rather than on `reqwest` directly so tests can substitute
/// canned responses.
#[async_trait]
pub trait SoapTransport: Send + Sync {
    /// Invokes `action` on the service behind `control_url`.
    async fn invoke(
        &self,
        control_url: &str,
        service_type: &str,
        action: &str,
        args: &[(&str, &str)],
    ) -> SoapResult<String>;
}

/// Production transport backed by a shared `reqwest` client.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport around an existing HTTP client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SoapTransport for ReqwestTransport {
    async fn invoke(
        &self,
        control_url: &str,
        service_type: &str,
        action: &str,
        args: &[(&str, &str)],
    ) -> SoapResult<String> {
        send_soap_request(&self.client, control_url, service_type, action, args).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SOAP Request/Response
// ─────────────────────────────────────────────────────────────────────────────

/// Sends a SOAP request to a renderer control endpoint.
///
/// This is the core transport function for all UPnP SOAP operations. It
/// builds the SOAP envelope, sends the HTTP request, and handles SOAP faults
/// in the response.
///
/// # Arguments
/// * `client` - The HTTP client to use for the request
/// * `control_url` - Resolved control URL from the device's service table
/// * `service_type` - The full service URN including version
/// * `action` - The SOAP action name (e.g., "Play", "Stop", "GetVolume")
/// * `args` - Key-value pairs for action arguments (order is preserved)
pub async fn send_soap_request(
    client: &Client,
    control_url: &str,
    service_type: &str,
    action: &str,
    args: &[(&str, &str)],
) -> SoapResult<String> {
    // Build SOAP envelope - must be a single line with no leading whitespace.
    // Some renderer SOAP parsers reject XML with whitespace before the root
    // element.
    let mut body = format!(
        r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:{} xmlns:u="{}">"#,
        action, service_type
    );

    for (k, v) in args {
        body.push_str(&format!("<{k}>{}</{k}>", escape_xml(v)));
    }

    body.push_str(&format!(r#"</u:{}></s:Body></s:Envelope>"#, action));

    log::info!("[SOAP] {} -> {} (body: {} bytes)", action, control_url, body.len());
    log::debug!("[SOAP] request body: {}", body);

    let start = std::time::Instant::now();
    let res = client
        .post(control_url)
        .header("Content-Type", "text/xml; charset=\"utf-8\"")
        .header("SOAPAction", format!("\"{}#{}\"", service_type, action))
        .body(body)
        .timeout(Duration::from_secs(SOAP_TIMEOUT_SECS))
        .send()
        .await;

    log::info!(
        "[SOAP] {} completed in {:?}: {:?}",
        action,
        start.elapsed(),
        res.as_ref().map(reqwest::Response::status)
    );

    let res = res?;

    let status = res.status();
    let response_text = res.text().await?;

    // Check for SOAP fault in response (can occur even on 500 status)
    if response_text.contains("<s:Fault>") || response_text.contains("<soap:Fault>") {
        let fault_msg = first_element_text(&response_text, "faultstring")
            .or_else(|| first_element_text(&response_text, "errorCode"))
            .unwrap_or_else(|| "unknown SOAP fault".to_string());
        return Err(SoapError::Fault(fault_msg));
    }

    // Check HTTP status after SOAP fault check (faults may come with 500)
    if !status.is_success() {
        return Err(SoapError::HttpStatus(status.as_u16(), response_text));
    }

    Ok(response_text)
}

// ─────────────────────────────────────────────────────────────────────────────
// SOAP Request Builder
// ─────────────────────────────────────────────────────────────────────────────

use super::services::ServiceRecord;

/// Builder for constructing and sending SOAP requests to a resolved service.
///
/// # Example
/// ```ignore
/// let response = SoapRequestBuilder::new(&transport, avt_record)
///     .action("Play")
///     .instance_id()
///     .arg("Speed", "1")
///     .send()
///     .await?;
/// ```
pub struct SoapRequestBuilder<'a> {
    transport: &'a dyn SoapTransport,
    control_url: &'a str,
    service_type: &'a str,
    action: Option<&'a str>,
    args: Vec<(&'a str, String)>,
}

impl<'a> SoapRequestBuilder<'a> {
    /// Creates a new SOAP request builder against a service record.
    #[must_use]
    pub fn new(transport: &'a dyn SoapTransport, service: &'a ServiceRecord) -> Self {
        Self {
            transport,
            control_url: &service.control_url,
            service_type: &service.service_type,
            action: None,
            args: Vec::new(),
        }
    }

    /// Sets the SOAP action name.
    #[must_use]
    pub fn action(mut self, action: &'a str) -> Self {
        self.action = Some(action);
        self
    }

    /// Adds an argument to the SOAP request.
    ///
    /// Arguments are included in the SOAP body in the order they are added.
    #[must_use]
    pub fn arg(mut self, key: &'a str, value: impl Into<String>) -> Self {
        self.args.push((key, value.into()));
        self
    }

    /// Adds the standard InstanceID="0" argument used by most AV actions.
    #[must_use]
    pub fn instance_id(self) -> Self {
        self.arg("InstanceID", "0")
    }

    /// Sends the SOAP request and returns the response body.
    ///
    /// # Errors
    /// Returns `SoapError` if the action is not set or the request fails.
    pub async fn send(self) -> SoapResult<String> {
        let action = self
            .action
            .ok_or_else(|| SoapError::Fault("SoapRequestBuilder: action not set".into()))?;

        let args: Vec<(&str, &str)> = self.args.iter().map(|(k, v)| (*k, v.as_str())).collect();

        self.transport
            .invoke(self.control_url, self.service_type, action, &args)
            .await
    }

    /// Returns the request parts without sending (for testing).
    #[cfg(test)]
    pub fn into_parts(self) -> Option<(String, &'a str, Vec<(&'a str, String)>)> {
        let action = self.action?;
        Some((self.service_type.to_string(), action, self.args))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Retry
// ─────────────────────────────────────────────────────────────────────────────

/// Retry delays for transient SOAP errors (exponential backoff).
const RETRY_DELAYS_MS: [u64; 3] = [200, 500, 1000];

/// Executes a SOAP request with retry logic for transient errors.
///
/// Retries on transient SOAP faults (701, 714, 716) and timeouts with
/// exponential backoff (200ms, 500ms, 1000ms).
pub(crate) async fn with_retry<F, Fut>(action: &str, mut operation: F) -> SoapResult<String>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = SoapResult<String>>,
{
    let mut last_error = None;
    for (attempt, &delay_ms) in std::iter::once(&0)
        .chain(RETRY_DELAYS_MS.iter())
        .enumerate()
    {
        if attempt > 0 {
            log::info!(
                "[SOAP] retrying {} (attempt {}/{}) after {}ms",
                action,
                attempt + 1,
                RETRY_DELAYS_MS.len() + 1,
                delay_ms
            );
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        match operation().await {
            Ok(r) => return Ok(r),
            Err(e) if e.is_transient() => {
                log::warn!("[SOAP] {} transient error: {}", action, e);
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or(SoapError::Parse))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn avt_record() -> ServiceRecord {
        ServiceRecord {
            service_type: "urn:schemas-upnp-org:service:AVTransport:1".to_string(),
            control_url: "http://192.168.1.100:1400/AVTransport/control".to_string(),
            ..Default::default()
        }
    }

    fn null_transport() -> ReqwestTransport {
        ReqwestTransport::new(Client::new())
    }

    #[test]
    fn builder_captures_action_and_service() {
        let transport = null_transport();
        let record = avt_record();
        let parts = SoapRequestBuilder::new(&transport, &record)
            .action("Play")
            .into_parts();

        let (service, action, args) = parts.expect("should have parts");
        assert_eq!(service, "urn:schemas-upnp-org:service:AVTransport:1");
        assert_eq!(action, "Play");
        assert!(args.is_empty());
    }

    #[test]
    fn builder_captures_args_in_order() {
        let transport = null_transport();
        let record = avt_record();
        let parts = SoapRequestBuilder::new(&transport, &record)
            .action("Seek")
            .instance_id()
            .arg("Unit", "REL_TIME")
            .arg("Target", "0:02:30")
            .into_parts();

        let (_, _, args) = parts.expect("should have parts");
        assert_eq!(args.len(), 3);
        assert_eq!(args[0], ("InstanceID", "0".to_string()));
        assert_eq!(args[1], ("Unit", "REL_TIME".to_string()));
        assert_eq!(args[2], ("Target", "0:02:30".to_string()));
    }

    #[test]
    fn into_parts_returns_none_without_action() {
        let transport = null_transport();
        let record = avt_record();
        let parts = SoapRequestBuilder::new(&transport, &record).into_parts();
        assert!(parts.is_none());
    }

    #[test]
    fn fault_701_is_transient() {
        assert!(SoapError::Fault("UPnPError 701".to_string()).is_transient());
        assert!(!SoapError::Fault("UPnPError 402".to_string()).is_transient());
        assert!(!SoapError::Parse.is_transient());
    }
}
