//! Device-description walking and SCPD action probing.
//!
//! Renderers describe their services in an XML device description: every
//! `serviceList` in document order, every `service` within it. This module
//! extracts the entries the bridge cares about into a [`ServiceTable`],
//! resolving relative control/event URLs against `URLBase` (or, absent that,
//! the description's own location). A single malformed service leaves its
//! slot unpopulated but never aborts the walk.

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use thiserror::Error;

use super::services::{ServiceKind, ServiceRecord, ServiceTable};
use super::xml::first_element_text;

/// Errors from device-description parsing.
#[derive(Debug, Error)]
pub enum DescriptionError {
    /// Description carries no UDN; the device cannot be identified.
    #[error("device description has no UDN")]
    MissingUdn,
}

/// A device description reduced to what registration needs.
#[derive(Debug, Clone)]
pub struct ParsedDevice {
    /// Stable unique device name, `uuid:` prefix included.
    pub udn: String,
    /// Human-readable name; falls back to the UDN when absent.
    pub friendly_name: String,
    /// Base URL all relative service URLs were resolved against.
    pub base_url: String,
    /// Resolved service table.
    pub services: ServiceTable,
}

/// Parses a device description fetched from `location`.
///
/// # Errors
/// Only a missing UDN is fatal; anything else degrades to unpopulated
/// service slots.
pub fn parse_device_description(
    xml: &str,
    location: &str,
) -> Result<ParsedDevice, DescriptionError> {
    let udn = first_element_text(xml, "UDN").ok_or(DescriptionError::MissingUdn)?;
    let friendly_name =
        first_element_text(xml, "friendlyName").unwrap_or_else(|| udn.clone());
    let base_url = first_element_text(xml, "URLBase")
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| location.to_string());

    let mut services = ServiceTable::new();
    let mut reader = Reader::from_str(xml);
    let mut in_service_list = false;

    // Fields of the service element currently being collected.
    let mut current: Option<RawService> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"serviceList" => in_service_list = true,
                b"service" if in_service_list => current = Some(RawService::default()),
                tag => {
                    if let Some(ref mut svc) = current {
                        let text = reader
                            .read_text(e.name())
                            .map(|t| t.trim().to_string())
                            .unwrap_or_default();
                        match tag {
                            b"serviceType" => svc.service_type = text,
                            b"serviceId" => svc.service_id = text,
                            b"SCPDURL" => svc.scpd_url = text,
                            b"controlURL" => svc.control_url = text,
                            b"eventSubURL" => svc.event_url = text,
                            _ => {}
                        }
                    }
                }
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"serviceList" => in_service_list = false,
                b"service" => {
                    if let Some(svc) = current.take() {
                        install_service(&mut services, svc, &base_url);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("[Description] XML parse error: {}", e);
                break;
            }
            _ => {}
        }
    }

    Ok(ParsedDevice {
        udn,
        friendly_name,
        base_url,
        services,
    })
}

#[derive(Default)]
struct RawService {
    service_type: String,
    service_id: String,
    scpd_url: String,
    control_url: String,
    event_url: String,
}

/// Matches a collected service against the known kinds and stores it.
///
/// First match in document order wins; later duplicates are ignored.
fn install_service(table: &mut ServiceTable, svc: RawService, base: &str) {
    // Strip the trailing ":<version>" before comparing types.
    let Some((base_type, _version)) = svc.service_type.rsplit_once(':') else {
        return;
    };
    let Some(kind) = ServiceKind::from_base_type(base_type) else {
        return;
    };
    if table.is_populated(kind) {
        return;
    }
    if svc.control_url.is_empty() {
        log::warn!(
            "[Description] {} has no controlURL, leaving slot unpopulated",
            kind.name()
        );
        return;
    }

    table.set(
        kind,
        ServiceRecord {
            service_type: svc.service_type,
            service_id: svc.service_id,
            scpd_url: resolve_url(base, &svc.scpd_url),
            control_url: resolve_url(base, &svc.control_url),
            event_url: resolve_url(base, &svc.event_url),
            sid: String::new(),
            timeout_secs: 0,
        },
    );
}

/// Resolves a possibly-relative URL against a base URL.
pub(crate) fn resolve_url(base: &str, rel: &str) -> String {
    if rel.starts_with("http://") || rel.starts_with("https://") {
        return rel.to_string();
    }

    let scheme_end = base.find("://").map_or(0, |i| i + 3);
    let authority_end = base[scheme_end..]
        .find('/')
        .map_or(base.len(), |i| scheme_end + i);

    if rel.starts_with('/') {
        return format!("{}{}", &base[..authority_end], rel);
    }

    match base[authority_end..].rfind('/') {
        Some(i) => format!("{}{}", &base[..authority_end + i + 1], rel),
        None => format!("{}/{}", &base[..authority_end], rel),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SCPD action probe
// ─────────────────────────────────────────────────────────────────────────────

/// Fetches a service's SCPD and reports whether it advertises `action`.
///
/// Best-effort probe: fetch or parse failures report the action as absent,
/// never as an error.
pub async fn service_has_action(
    client: &reqwest::Client,
    scpd_url: &str,
    action: &str,
) -> bool {
    let xml = match client.get(scpd_url).send().await {
        Ok(res) => match res.text().await {
            Ok(text) => text,
            Err(e) => {
                log::debug!("[Description] SCPD body read failed for {}: {}", scpd_url, e);
                return false;
            }
        },
        Err(e) => {
            log::debug!("[Description] SCPD fetch failed for {}: {}", scpd_url, e);
            return false;
        }
    };

    scpd_has_action(&xml, action)
}

/// Reports whether a parsed SCPD advertises `action` (case-insensitive).
///
/// An SCPD without an `actionList` means "action absent", not an error: a
/// `<name>` only counts when it sits directly under
/// `actionList > action`, so argument names never shadow action names.
pub fn scpd_has_action(xml: &str, action: &str) -> bool {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Vec<u8>> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                if name == b"name"
                    && stack.len() >= 2
                    && stack[stack.len() - 1] == b"action"
                    && stack[stack.len() - 2] == b"actionList"
                {
                    if let Ok(text) = reader.read_text(e.name()) {
                        if text.trim().eq_ignore_ascii_case(action) {
                            return true;
                        }
                    }
                    // read_text consumed the end tag, nothing pushed
                } else {
                    stack.push(name);
                }
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Eof) => return false,
            Err(e) => {
                log::debug!("[Description] SCPD parse error: {}", e);
                return false;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::test_fixtures::{DEVICE_DESCRIPTION, DEVICE_DESCRIPTION_NO_URLBASE};

    const LOCATION: &str = "http://192.168.1.66:49152/desc/root.xml";

    #[test]
    fn parses_identity_and_services() {
        let device = parse_device_description(DEVICE_DESCRIPTION, LOCATION).unwrap();

        assert_eq!(device.udn, "uuid:RINCON_B8E9375831C001400");
        assert_eq!(device.friendly_name, "Kitchen");
        assert_eq!(device.base_url, "http://192.168.1.66:1400/");

        let avt = device.services.get(ServiceKind::AVTransport).unwrap();
        assert_eq!(
            avt.service_type,
            "urn:schemas-upnp-org:service:AVTransport:1"
        );
        assert_eq!(
            avt.control_url,
            "http://192.168.1.66:1400/MediaRenderer/AVTransport/Control"
        );
        assert_eq!(
            avt.event_url,
            "http://192.168.1.66:1400/MediaRenderer/AVTransport/Event"
        );
        assert_eq!(avt.timeout_secs, 0);
        assert!(avt.sid.is_empty());

        assert!(device.services.is_populated(ServiceKind::RenderingControl));
        assert!(device.services.is_populated(ServiceKind::ConnectionManager));
        assert!(device.services.is_populated(ServiceKind::Topology));
        // Not present in the fixture
        assert!(!device
            .services
            .is_populated(ServiceKind::GroupRenderingControl));
    }

    #[test]
    fn falls_back_to_location_without_urlbase() {
        let device =
            parse_device_description(DEVICE_DESCRIPTION_NO_URLBASE, LOCATION).unwrap();
        let avt = device.services.get(ServiceKind::AVTransport).unwrap();
        // Relative to the description directory, not the host root
        assert_eq!(
            avt.control_url,
            "http://192.168.1.66:49152/desc/avt/control"
        );
    }

    #[test]
    fn missing_udn_is_fatal() {
        assert!(matches!(
            parse_device_description("<root><friendlyName>X</friendlyName></root>", LOCATION),
            Err(DescriptionError::MissingUdn)
        ));
    }

    #[test]
    fn broken_service_does_not_abort_walk() {
        // First service lacks a controlURL; second is fine and must land.
        let xml = r#"<root>
            <UDN>uuid:dev-1</UDN>
            <serviceList>
              <service>
                <serviceType>urn:schemas-upnp-org:service:RenderingControl:1</serviceType>
                <serviceId>urn:upnp-org:serviceId:RenderingControl</serviceId>
                <SCPDURL>/rc.xml</SCPDURL>
              </service>
              <service>
                <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
                <serviceId>urn:upnp-org:serviceId:AVTransport</serviceId>
                <SCPDURL>/avt.xml</SCPDURL>
                <controlURL>/avt/control</controlURL>
                <eventSubURL>/avt/event</eventSubURL>
              </service>
            </serviceList>
          </root>"#;
        let device = parse_device_description(xml, "http://10.0.0.4:8080/root.xml").unwrap();
        assert!(!device.services.is_populated(ServiceKind::RenderingControl));
        let avt = device.services.get(ServiceKind::AVTransport).unwrap();
        assert_eq!(avt.control_url, "http://10.0.0.4:8080/avt/control");
    }

    #[test]
    fn resolve_url_handles_all_shapes() {
        assert_eq!(
            resolve_url("http://h:1400/xml/desc.xml", "http://other/x"),
            "http://other/x"
        );
        assert_eq!(
            resolve_url("http://h:1400/xml/desc.xml", "/ctl"),
            "http://h:1400/ctl"
        );
        assert_eq!(
            resolve_url("http://h:1400/xml/desc.xml", "ctl"),
            "http://h:1400/xml/ctl"
        );
        assert_eq!(resolve_url("http://h:1400/", "ctl"), "http://h:1400/ctl");
        assert_eq!(resolve_url("http://h:1400", "ctl"), "http://h:1400/ctl");
        assert_eq!(resolve_url("http://h:1400", "/ctl"), "http://h:1400/ctl");
    }

    const SCPD: &str = r#"<?xml version="1.0"?>
      <scpd xmlns="urn:schemas-upnp-org:service-1-0">
        <actionList>
          <action>
            <name>Play</name>
            <argumentList>
              <argument><name>InstanceID</name></argument>
              <argument><name>Speed</name></argument>
            </argumentList>
          </action>
          <action>
            <name>Seek</name>
            <argumentList>
              <argument><name>Unit</name></argument>
            </argumentList>
          </action>
        </actionList>
      </scpd>"#;

    #[test]
    fn scpd_probe_finds_actions_case_insensitively() {
        assert!(scpd_has_action(SCPD, "Play"));
        assert!(scpd_has_action(SCPD, "seek"));
        assert!(!scpd_has_action(SCPD, "Pause"));
    }

    #[test]
    fn scpd_probe_ignores_argument_names() {
        // "Speed" exists only as an argument name, not as an action
        assert!(!scpd_has_action(SCPD, "Speed"));
    }

    #[test]
    fn scpd_without_action_list_reports_absent() {
        let xml = "<scpd><serviceStateTable/></scpd>";
        assert!(!scpd_has_action(xml, "Play"));
    }

    #[test]
    fn malformed_scpd_reports_absent() {
        assert!(!scpd_has_action("<scpd><actionList>", "Play"));
    }
}
