//! LastChange event extraction.
//!
//! AVTransport and RenderingControl deliver state through GENA NOTIFY bodies
//! whose `LastChange` element carries a whole escaped XML document. This
//! module digs the requested attribute values out of that embedded document
//! and offers typed wrappers for the handful of values the bridge mirrors.

use std::str::FromStr;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::Serialize;

use super::xml::{decode_entities, first_element_text, get_attr_ci};

/// Transport states reported by renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportState {
    Playing,
    PausedPlayback,
    Stopped,
    Transitioning,
    NoMediaPresent,
}

impl FromStr for TransportState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PLAYING" => Ok(Self::Playing),
            "PAUSED_PLAYBACK" => Ok(Self::PausedPlayback),
            "STOPPED" => Ok(Self::Stopped),
            "TRANSITIONING" => Ok(Self::Transitioning),
            "NO_MEDIA_PRESENT" => Ok(Self::NoMediaPresent),
            _ => Err(()),
        }
    }
}

/// Extracts an attribute from the embedded LastChange document.
///
/// Finds the first element named `tag` whose `search_attr` attribute equals
/// `search_val` (both attribute name and value compared case-insensitively)
/// and returns that element's `ret_attr` attribute. Attribute order within
/// the element does not matter.
#[must_use]
pub fn last_change_item(
    body: &str,
    tag: &str,
    search_attr: &str,
    search_val: &str,
    ret_attr: &str,
) -> Option<String> {
    let embedded = decode_entities(&first_element_text(body, "LastChange")?);
    let mut reader = Reader::from_str(&embedded);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == tag.as_bytes() =>
            {
                let matched = get_attr_ci(e, search_attr)
                    .map_or(false, |v| v.eq_ignore_ascii_case(search_val));
                if matched {
                    return get_attr_ci(e, ret_attr);
                }
            }
            Ok(Event::Eof) => return None,
            Err(e) => {
                log::warn!("[Events] LastChange parse error: {}", e);
                return None;
            }
            _ => {}
        }
        buf.clear();
    }
}

/// Returns the `val` attribute of the first `tag` element in LastChange.
///
/// Used for per-instance variables that carry no discriminating attribute,
/// like `TransportState`.
#[must_use]
pub fn last_change_value(body: &str, tag: &str) -> Option<String> {
    let embedded = decode_entities(&first_element_text(body, "LastChange")?);
    let mut reader = Reader::from_str(&embedded);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == tag.as_bytes() =>
            {
                return get_attr_ci(e, "val");
            }
            Ok(Event::Eof) => return None,
            Err(e) => {
                log::warn!("[Events] LastChange parse error: {}", e);
                return None;
            }
            _ => {}
        }
        buf.clear();
    }
}

/// Extracts the transport state from an AVTransport event body.
#[must_use]
pub fn transport_state(body: &str) -> Option<TransportState> {
    last_change_value(body, "TransportState")?.parse().ok()
}

/// Extracts the Master-channel volume from a RenderingControl event body.
#[must_use]
pub fn master_volume(body: &str) -> Option<u8> {
    last_change_item(body, "Volume", "channel", "Master", "val")?
        .parse::<u8>()
        .ok()
        .map(|v| v.min(100))
}

/// Extracts the Master-channel mute flag from a RenderingControl event body.
#[must_use]
pub fn master_mute(body: &str) -> Option<bool> {
    last_change_item(body, "Mute", "channel", "Master", "val").map(|v| v == "1")
}
