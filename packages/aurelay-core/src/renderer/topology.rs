//! Zone group topology parsing and master resolution.
//!
//! Grouped renderers elect a coordinator that owns playback for the whole
//! zone; the bridge must drive the coordinator and treat the other members
//! as mirrors. `GetZoneGroupState` returns the topology as an embedded XML
//! document; this module parses it and resolves which registry slot (if any)
//! is the master of a given device.

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use super::services::ServiceRecord;
use super::soap::{SoapRequestBuilder, SoapResult, SoapTransport};
use super::xml::{decode_entities, first_element_text, get_attr};

/// One zone group from a ZoneGroupState document.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneGroup {
    /// UUID of the group's coordinator (bare, no `uuid:` prefix).
    pub coordinator_uuid: String,
    /// Members in document order.
    pub members: Vec<ZoneGroupMember>,
}

/// One member of a zone group.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneGroupMember {
    /// Bare member UUID.
    pub uuid: String,
    /// User-configured room name.
    pub zone_name: String,
}

/// Parses ZoneGroupState XML into structured groups.
///
/// Members without a UUID are skipped; groups without a coordinator
/// attribute are kept (master resolution simply never matches them).
#[must_use]
pub fn parse_zone_groups(xml: &str) -> Vec<ZoneGroup> {
    let mut groups = Vec::new();
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut current: Option<ZoneGroup> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                match e.local_name().as_ref() {
                    b"ZoneGroup" => {
                        current = Some(ZoneGroup {
                            coordinator_uuid: get_attr(e, "Coordinator").unwrap_or_default(),
                            members: Vec::new(),
                        });
                    }
                    b"ZoneGroupMember" => {
                        if let Some(ref mut group) = current {
                            let Some(uuid) = get_attr(e, "UUID") else {
                                continue;
                            };
                            group.members.push(ZoneGroupMember {
                                uuid,
                                zone_name: get_attr(e, "ZoneName").unwrap_or_default(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"ZoneGroup" => {
                if let Some(group) = current.take() {
                    groups.push(group);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("[Topology] XML parse error in zone groups: {}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    groups
}

/// Outcome of a master-resolution pass.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterResolution {
    /// Registry slot of the master, or `None` when the device is its own
    /// master (coordinator, or coordinator not discovered yet).
    pub master_slot: Option<usize>,
    /// Zone name found for this device, used as its display name.
    pub zone_name: Option<String>,
}

/// Resolves the master of `device_udn` from parsed zone groups.
///
/// `running` is a `(slot, udn)` snapshot of the running registry entries.
/// First match in document order wins. The function is pure; the caller
/// applies the result under the device lock.
#[must_use]
pub fn resolve_master(
    device_udn: &str,
    groups: &[ZoneGroup],
    running: &[(usize, String)],
) -> MasterResolution {
    let my_uuid = device_udn.strip_prefix("uuid:").unwrap_or(device_udn);

    let mut zone_name = None;
    let mut master_slot = None;

    'walk: for group in groups {
        for member in &group.members {
            if member.uuid.eq_ignore_ascii_case(my_uuid) {
                zone_name = Some(member.zone_name.clone());
                if group.coordinator_uuid.eq_ignore_ascii_case(my_uuid) {
                    // We coordinate our own group.
                    break 'walk;
                }
            }

            // Same pass: look for an already-registered coordinator.
            if !group.coordinator_uuid.is_empty() {
                if let Some((slot, _)) = running
                    .iter()
                    .find(|(_, udn)| udn.contains(&group.coordinator_uuid))
                {
                    master_slot = Some(*slot);
                    break 'walk;
                }
            }
        }
    }

    MasterResolution {
        master_slot,
        zone_name,
    }
}

/// Fetches and parses the current zone group state from a renderer's
/// topology service.
pub async fn fetch_zone_groups(
    soap: &dyn SoapTransport,
    topology: &ServiceRecord,
) -> SoapResult<Vec<ZoneGroup>> {
    let response = SoapRequestBuilder::new(soap, topology)
        .action("GetZoneGroupState")
        .send()
        .await?;

    let Some(state) = first_element_text(&response, "ZoneGroupState") else {
        return Ok(vec![]);
    };

    Ok(parse_zone_groups(&decode_entities(&state)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member_xml(uuid: &str, zone_name: &str) -> String {
        format!(
            r#"<ZoneGroupMember UUID="{uuid}" Location="http://10.0.0.{n}:1400/xml/device_description.xml" ZoneName="{zone_name}"/>"#,
            n = 10,
        )
    }

    fn group_xml(coordinator: &str, members: &[String]) -> String {
        format!(
            r#"<ZoneGroup Coordinator="{coordinator}" ID="{coordinator}:12">{}</ZoneGroup>"#,
            members.join("")
        )
    }

    fn zone_groups_xml(groups: &[String]) -> String {
        format!("<ZoneGroups>{}</ZoneGroups>", groups.join(""))
    }

    #[test]
    fn parses_groups_and_members_in_order() {
        let xml = zone_groups_xml(&[
            group_xml(
                "RINCON_AAA",
                &[member_xml("RINCON_AAA", "Kitchen"), member_xml("RINCON_BBB", "Kitchen")],
            ),
            group_xml("RINCON_CCC", &[member_xml("RINCON_CCC", "Office")]),
        ]);

        let groups = parse_zone_groups(&xml);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].coordinator_uuid, "RINCON_AAA");
        assert_eq!(groups[0].members.len(), 2);
        assert_eq!(groups[1].members[0].zone_name, "Office");
    }

    #[test]
    fn member_without_uuid_is_skipped() {
        let xml = r#"<ZoneGroups><ZoneGroup Coordinator="A"><ZoneGroupMember ZoneName="X"/><ZoneGroupMember UUID="B" ZoneName="Y"/></ZoneGroup></ZoneGroups>"#;
        let groups = parse_zone_groups(xml);
        assert_eq!(groups[0].members.len(), 1);
        assert_eq!(groups[0].members[0].uuid, "B");
    }

    #[test]
    fn coordinator_of_own_group_is_its_own_master() {
        let xml = zone_groups_xml(&[group_xml(
            "RINCON_AAA",
            &[member_xml("RINCON_AAA", "Kitchen"), member_xml("RINCON_BBB", "Kitchen")],
        )]);
        let groups = parse_zone_groups(&xml);

        let res = resolve_master("uuid:RINCON_AAA", &groups, &[]);
        assert_eq!(res.master_slot, None);
        assert_eq!(res.zone_name.as_deref(), Some("Kitchen"));
    }

    #[test]
    fn slave_finds_registered_coordinator() {
        let xml = zone_groups_xml(&[group_xml(
            "RINCON_AAA",
            &[member_xml("RINCON_AAA", "Kitchen"), member_xml("RINCON_BBB", "Kitchen")],
        )]);
        let groups = parse_zone_groups(&xml);
        let running = vec![(3usize, "uuid:RINCON_AAA".to_string())];

        let res = resolve_master("uuid:RINCON_BBB", &groups, &running);
        assert_eq!(res.master_slot, Some(3));
    }

    #[test]
    fn undiscovered_coordinator_defaults_to_self() {
        let xml = zone_groups_xml(&[group_xml(
            "RINCON_AAA",
            &[member_xml("RINCON_AAA", "Kitchen"), member_xml("RINCON_BBB", "Kitchen")],
        )]);
        let groups = parse_zone_groups(&xml);

        let res = resolve_master("uuid:RINCON_BBB", &groups, &[]);
        assert_eq!(res.master_slot, None);
        assert_eq!(res.zone_name.as_deref(), Some("Kitchen"));
    }

    #[test]
    fn first_document_order_match_wins() {
        let xml = zone_groups_xml(&[
            group_xml("RINCON_AAA", &[member_xml("RINCON_AAA", "Kitchen")]),
            group_xml("RINCON_CCC", &[member_xml("RINCON_CCC", "Office")]),
        ]);
        let groups = parse_zone_groups(&xml);
        // Both coordinators are registered; the first group's wins.
        let running = vec![
            (7usize, "uuid:RINCON_CCC".to_string()),
            (2usize, "uuid:RINCON_AAA".to_string()),
        ];
        let res = resolve_master("uuid:RINCON_BBB", &groups, &running);
        assert_eq!(res.master_slot, Some(2));
    }
}
