//! Shared quick-xml helpers for renderer-side documents.
//!
//! Device descriptions, SCPDs, SOAP responses and GENA notification bodies
//! all get walked with the same few primitives. Matching is on local names so
//! namespace prefixes (`e:propertyset`, `s:Envelope`) never matter.

use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

/// Returns the text content of the first element with the given local name.
///
/// The content is trimmed but not entity-decoded; callers dealing with
/// embedded documents (LastChange, ZoneGroupState) decode explicitly.
pub fn first_element_text(xml: &str, tag: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == tag.as_bytes() => {
                return reader
                    .read_text(e.name())
                    .ok()
                    .map(|t| t.trim().to_string());
            }
            Ok(Event::Eof) => return None,
            Err(e) => {
                log::warn!("[XML] parse error looking for <{}>: {}", tag, e);
                return None;
            }
            _ => {}
        }
    }
}

/// Returns an attribute value by exact name.
pub fn get_attr(e: &BytesStart, name: &str) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

/// Returns an attribute value by case-insensitive name.
///
/// GENA LastChange payloads are not consistent about attribute casing across
/// renderer firmwares, so event extraction always goes through this.
pub fn get_attr_ci(e: &BytesStart, name: &str) -> Option<String> {
    for attr in e.attributes().with_checks(false).flatten() {
        if attr
            .key
            .local_name()
            .as_ref()
            .eq_ignore_ascii_case(name.as_bytes())
        {
            return attr.unescape_value().ok().map(|v| v.into_owned());
        }
    }
    None
}

/// Escapes XML special characters (& < > " ') for element content.
#[must_use]
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Decodes HTML/XML entities out of an embedded document.
#[must_use]
pub fn decode_entities(s: &str) -> String {
    html_escape::decode_html_entities(s).into_owned()
}
