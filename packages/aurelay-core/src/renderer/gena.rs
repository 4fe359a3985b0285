//! GENA HTTP client for subscription operations.
//!
//! Handles the HTTP protocol aspects of GENA subscriptions against the event
//! URLs resolved from each device description. Subscription *state* (SIDs,
//! timeouts) lives in the device's service table; this module only talks
//! HTTP.

use reqwest::{Client, Method};
use thiserror::Error;

use crate::protocol_constants::GENA_SUBSCRIPTION_TIMEOUT_SECS;

/// Errors that can occur during GENA operations.
#[derive(Debug, Error)]
pub enum GenaError {
    /// HTTP request to the renderer failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Renderer rejected the subscription request.
    #[error("subscription failed with status {0}")]
    SubscriptionFailed(u16),

    /// Renderer rejected the renewal request.
    #[error("renewal failed with status {0}")]
    RenewalFailed(u16),

    /// Renderer accepted the subscription but returned no SID.
    #[error("subscription response missing SID header")]
    MissingSid,
}

/// Convenient Result alias for GENA operations.
pub type GenaResult<T> = Result<T, GenaError>;

/// Response from a successful GENA subscription.
pub struct SubscribeResponse {
    /// The subscription ID returned by the renderer.
    pub sid: String,
    /// The timeout value in seconds granted for this subscription.
    pub timeout_secs: u64,
}

/// HTTP client for GENA (UPnP eventing) operations.
pub struct GenaClient {
    client: Client,
}

impl GenaClient {
    /// Creates a new GENA client around an existing HTTP client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn subscribe_method() -> Method {
        Method::from_bytes(b"SUBSCRIBE").expect("SUBSCRIBE is a valid method")
    }

    fn unsubscribe_method() -> Method {
        Method::from_bytes(b"UNSUBSCRIBE").expect("UNSUBSCRIBE is a valid method")
    }

    /// Extracts the timeout in seconds from a GENA response.
    ///
    /// Parses the "TIMEOUT" header, format "Second-N". Returns the default
    /// timeout if the header is missing or malformed.
    fn extract_timeout_secs(response: &reqwest::Response) -> u64 {
        response
            .headers()
            .get("TIMEOUT")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Second-"))
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(GENA_SUBSCRIPTION_TIMEOUT_SECS)
    }

    /// Sends a SUBSCRIBE request to create a new subscription.
    ///
    /// # Arguments
    /// * `event_url` - Resolved event URL from the device's service table
    /// * `callback_url` - URL where NOTIFY events should be sent
    pub async fn subscribe(
        &self,
        event_url: &str,
        callback_url: &str,
    ) -> GenaResult<SubscribeResponse> {
        let timeout_header = format!("Second-{}", GENA_SUBSCRIPTION_TIMEOUT_SECS);

        let response = self
            .client
            .request(Self::subscribe_method(), event_url)
            .header("CALLBACK", format!("<{}>", callback_url))
            .header("NT", "upnp:event")
            .header("TIMEOUT", &timeout_header)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GenaError::SubscriptionFailed(response.status().as_u16()));
        }

        let sid = response
            .headers()
            .get("SID")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
            .ok_or(GenaError::MissingSid)?;

        let timeout_secs = Self::extract_timeout_secs(&response);

        log::info!("[GENA] subscribed {} (sid {}, {}s)", event_url, sid, timeout_secs);

        Ok(SubscribeResponse { sid, timeout_secs })
    }

    /// Sends a SUBSCRIBE request to renew an existing subscription.
    ///
    /// Returns the new timeout value granted by the renderer.
    pub async fn renew(&self, event_url: &str, sid: &str) -> GenaResult<u64> {
        let timeout_header = format!("Second-{}", GENA_SUBSCRIPTION_TIMEOUT_SECS);

        let response = self
            .client
            .request(Self::subscribe_method(), event_url)
            .header("SID", sid)
            .header("TIMEOUT", &timeout_header)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GenaError::RenewalFailed(response.status().as_u16()));
        }

        Ok(Self::extract_timeout_secs(&response))
    }

    /// Sends an UNSUBSCRIBE request to cancel a subscription.
    ///
    /// Best-effort: returns `true` on success, `false` on any failure. Gone
    /// renderers never answer, and the caller removes the local subscription
    /// state either way.
    pub async fn unsubscribe(&self, event_url: &str, sid: &str) -> bool {
        match self
            .client
            .request(Self::unsubscribe_method(), event_url)
            .header("SID", sid)
            .send()
            .await
        {
            Ok(response) => {
                let ok = response.status().is_success();
                if !ok {
                    log::debug!(
                        "[GENA] unsubscribe {} rejected: {}",
                        event_url,
                        response.status()
                    );
                }
                ok
            }
            Err(e) => {
                log::debug!("[GENA] unsubscribe {} failed: {}", event_url, e);
                false
            }
        }
    }
}
