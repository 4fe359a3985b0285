//! Transport command helpers.
//!
//! Translates controller commands into AVTransport SOAP actions against a
//! renderer's resolved service table, with retry on the transient fault
//! codes renderers return while switching sources.

use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};
use crate::renderer::capabilities::protocol_info_resource;
use crate::renderer::registry::DeviceSlot;
use crate::renderer::services::ServiceKind;
use crate::renderer::soap::{with_retry, SoapRequestBuilder, SoapTransport};
use crate::renderer::xml::escape_xml;
use crate::state::PlaybackState;

fn avt_service(
    device: &Arc<DeviceSlot>,
) -> BridgeResult<(crate::renderer::services::ServiceRecord, String)> {
    device
        .with_running(|state| {
            (
                state.services.get(ServiceKind::AVTransport).cloned(),
                state.udn.clone(),
            )
        })
        .ok_or_else(|| BridgeError::RendererNotFound("device torn down".to_string()))
        .and_then(|(record, udn)| {
            record
                .map(|r| (r, udn.clone()))
                .ok_or(BridgeError::MissingService(udn, "AVTransport"))
        })
}

/// Minimal DIDL-Lite wrapper for the transport URI metadata.
///
/// The resource's `protocolInfo` carries the negotiated MIME and DLNA
/// feature string so the renderer knows what it is about to pull.
fn didl_lite(url: &str, mime: &str, duration_ms: u32, title: &str) -> String {
    format!(
        r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/"><item id="aurelay-track" parentID="0" restricted="1"><dc:title>{}</dc:title><upnp:class>object.item.audioItem.musicTrack</upnp:class><res protocolInfo="{}">{}</res></item></DIDL-Lite>"#,
        escape_xml(title),
        protocol_info_resource(mime, duration_ms),
        escape_xml(url),
    )
}

/// Hands the renderer the stream URL for the upcoming track.
pub async fn set_transport_uri(
    soap: &dyn SoapTransport,
    device: &Arc<DeviceSlot>,
    url: &str,
    mime: &str,
    duration_ms: u32,
) -> BridgeResult<()> {
    let (avt, _) = avt_service(device)?;
    let title = device
        .with_running(|state| state.metadata.title.clone())
        .flatten()
        .unwrap_or_else(|| "aurelay stream".to_string());
    let metadata = didl_lite(url, mime, duration_ms, &title);

    log::info!("[Playback] SetAVTransportURI {} -> {}", url, avt.control_url);

    with_retry("SetAVTransportURI", || {
        SoapRequestBuilder::new(soap, &avt)
            .action("SetAVTransportURI")
            .instance_id()
            .arg("CurrentURI", url)
            .arg("CurrentURIMetaData", metadata.as_str())
            .send()
    })
    .await?;

    Ok(())
}

/// Starts (or resumes) playback.
pub async fn play(soap: &dyn SoapTransport, device: &Arc<DeviceSlot>) -> BridgeResult<()> {
    let (avt, _) = avt_service(device)?;

    with_retry("Play", || {
        SoapRequestBuilder::new(soap, &avt)
            .action("Play")
            .instance_id()
            .arg("Speed", "1")
            .send()
    })
    .await?;

    device.with_running(|state| state.playback = PlaybackState::Playing);
    Ok(())
}

/// Pauses playback.
pub async fn pause(soap: &dyn SoapTransport, device: &Arc<DeviceSlot>) -> BridgeResult<()> {
    let (avt, _) = avt_service(device)?;

    SoapRequestBuilder::new(soap, &avt)
        .action("Pause")
        .instance_id()
        .send()
        .await?;

    device.with_running(|state| state.playback = PlaybackState::Paused);
    Ok(())
}

/// Stops playback.
///
/// Deliberately not retried: stop is best-effort cleanup, and retrying
/// would delay teardown for unresponsive renderers. A fault means the
/// renderer is already stopped.
pub async fn stop(soap: &dyn SoapTransport, device: &Arc<DeviceSlot>) -> BridgeResult<()> {
    let (avt, _) = avt_service(device)?;

    if let Err(e) = SoapRequestBuilder::new(soap, &avt)
        .action("Stop")
        .instance_id()
        .send()
        .await
    {
        log::debug!("[Playback] Stop fault ignored: {}", e);
    }

    device.with_running(|state| state.playback = PlaybackState::Stopped);
    Ok(())
}

/// Seeks to an absolute position within the current track.
///
/// Silently skipped for renderers whose AVTransport SCPD does not advertise
/// Seek.
pub async fn seek(
    soap: &dyn SoapTransport,
    device: &Arc<DeviceSlot>,
    position_ms: u32,
) -> BridgeResult<()> {
    let can_seek = device
        .with_running(|state| state.can_seek)
        .unwrap_or(false);
    if !can_seek {
        log::info!("[Playback] renderer does not advertise Seek, skipping");
        return Ok(());
    }

    let (avt, _) = avt_service(device)?;

    with_retry("Seek", || {
        SoapRequestBuilder::new(soap, &avt)
            .action("Seek")
            .instance_id()
            .arg("Unit", "REL_TIME")
            .arg("Target", format_rel_time(position_ms))
            .send()
    })
    .await?;

    Ok(())
}

/// Formats milliseconds as the `H:MM:SS` REL_TIME target.
fn format_rel_time(position_ms: u32) -> String {
    let total_secs = position_ms / 1000;
    format!(
        "{}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs / 60) % 60,
        total_secs % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::services::ServiceRecord;
    use crate::renderer::soap::ReqwestTransport;

    #[test]
    fn rel_time_formats_hours_minutes_seconds() {
        assert_eq!(format_rel_time(0), "0:00:00");
        assert_eq!(format_rel_time(150_000), "0:02:30");
        assert_eq!(format_rel_time(3_725_000), "1:02:05");
    }

    #[test]
    fn didl_lite_escapes_and_embeds_protocol_info() {
        let didl = didl_lite("http://10.0.0.5:8700/stream/3", "audio/flac", 0, "A & B");
        assert!(didl.contains("A &amp; B"));
        assert!(didl.contains("http-get:*:audio/flac:"));
        assert!(didl.contains("http://10.0.0.5:8700/stream/3"));
    }

    #[test]
    fn seek_builds_rel_time_request() {
        // Replicate the builder calls from seek()
        let transport = ReqwestTransport::new(reqwest::Client::new());
        let record = ServiceRecord {
            service_type: "urn:schemas-upnp-org:service:AVTransport:1".to_string(),
            control_url: "http://10.0.0.5:1400/avt/ctl".to_string(),
            ..Default::default()
        };
        let parts = SoapRequestBuilder::new(&transport, &record)
            .action("Seek")
            .instance_id()
            .arg("Unit", "REL_TIME")
            .arg("Target", format_rel_time(90_000))
            .into_parts();

        let (_, action, args) = parts.expect("should build request");
        assert_eq!(action, "Seek");
        assert_eq!(args[1], ("Unit", "REL_TIME".to_string()));
        assert_eq!(args[2], ("Target", "0:01:30".to_string()));
    }
}
