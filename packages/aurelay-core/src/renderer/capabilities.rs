//! Sink capability negotiation.
//!
//! A renderer advertises what it can play as a comma-separated `ProtocolInfo`
//! sink string (`protocol:network:mime:extras` entries). This module parses
//! that string into a [`SinkCapabilities`] set, intersects it with the
//! controller's codec tokens through a static rule table, and produces the
//! per-stream MIME and DLNA `contentFeatures` descriptor the HTTP server
//! answers with.

/// One parsed `http-get` sink entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolInfoEntry {
    /// MIME type (third field), e.g. `audio/mpeg`.
    pub mime: String,
    /// Fourth field verbatim; carries `codecs=...` constraints when present.
    pub extras: String,
}

/// Parsed sink capabilities of one renderer.
#[derive(Debug, Clone, Default)]
pub struct SinkCapabilities {
    /// Audio entries in advertisement order, forced MIME types appended.
    pub entries: Vec<ProtocolInfoEntry>,
    /// Sink advertised `http-get:*:*:` or `http-get:::` - accept everything.
    pub match_all: bool,
}

impl SinkCapabilities {
    /// Parses a sink `ProtocolInfo` string, appending forced MIME types.
    ///
    /// Only `http-get` entries with a MIME starting `audio/` contribute;
    /// leading spaces per entry are trimmed. The input is borrowed and split,
    /// never mutated. Forced entries are accepted unconditionally.
    #[must_use]
    pub fn parse(info: &str, forced: &[String]) -> Self {
        let lower = info.to_lowercase();
        let match_all = lower.contains("http-get:*:*:") || lower.contains("http-get:::");

        let mut entries = Vec::new();
        for raw in info.split(',') {
            let entry = raw.trim_start_matches(' ');
            let mut fields = entry.splitn(4, ':');
            let protocol = fields.next().unwrap_or_default();
            let _network = fields.next().unwrap_or_default();
            let mime = fields.next().unwrap_or_default();
            let extras = fields.next().unwrap_or_default();

            if protocol.eq_ignore_ascii_case("http-get") && mime.starts_with("audio/") {
                entries.push(ProtocolInfoEntry {
                    mime: mime.to_string(),
                    extras: extras.to_string(),
                });
            }
        }

        for mime in forced {
            entries.push(ProtocolInfoEntry {
                mime: mime.clone(),
                extras: String::new(),
            });
        }

        Self { entries, match_all }
    }

    /// True if any entry matches the accept pattern (and its details
    /// constraint, when the rule carries one).
    fn accepts(&self, accept: &str, details: Option<&str>) -> bool {
        self.entries.iter().any(|entry| {
            let mime_match = if accept.contains('/') {
                // Spelled-out accepts like "audio/L" match as raw substrings
                // (covers audio/L16;rate=44100 style advertisements).
                entry.mime.contains(accept)
            } else {
                entry.mime.contains(&format!("audio/{accept}"))
                    || entry.mime.contains(&format!("audio/x-{accept}"))
            };
            mime_match
                && details.map_or(true, |d| entry.extras.contains(d) || entry.mime.contains(d))
        })
    }
}

/// One row of the codec-token table.
struct CodecRule {
    /// Controller-side token.
    token: &'static str,
    /// Accepted MIME fragments; bare names expand to `audio/X` / `audio/x-X`.
    accepts: &'static [&'static str],
    /// Extra substring the matching entry must carry.
    details: Option<&'static str>,
    /// MIME served when the sink is match-all.
    canonical: &'static str,
}

static CODEC_RULES: &[CodecRule] = &[
    CodecRule { token: "mp3", accepts: &["mp3", "mpeg"], details: None, canonical: "audio/mpeg" },
    CodecRule { token: "flc", accepts: &["flac"], details: None, canonical: "audio/flac" },
    CodecRule { token: "wma", accepts: &["wma"], details: None, canonical: "audio/x-wma" },
    CodecRule { token: "ogg", accepts: &["ogg"], details: None, canonical: "audio/ogg" },
    CodecRule { token: "ops", accepts: &["ogg"], details: Some("codecs=opus"), canonical: "audio/ogg" },
    CodecRule { token: "ogf", accepts: &["ogg"], details: Some("codecs=flac"), canonical: "audio/ogg" },
    CodecRule { token: "aac", accepts: &["aac", "m4a", "mp4"], details: None, canonical: "audio/aac" },
    CodecRule { token: "alc", accepts: &["m4a", "mp4"], details: None, canonical: "audio/mp4" },
    CodecRule { token: "pcm", accepts: &["wav", "audio/L"], details: None, canonical: "audio/wav" },
    CodecRule { token: "wav", accepts: &["wav", "audio/L"], details: None, canonical: "audio/wav" },
    CodecRule { token: "aif", accepts: &["aif", "wav", "audio/L"], details: None, canonical: "audio/aiff" },
    CodecRule { token: "dsf", accepts: &["dsf", "dsd"], details: None, canonical: "audio/dsf" },
    CodecRule { token: "dff", accepts: &["dff", "dsd"], details: None, canonical: "audio/dff" },
];

fn rule_for(token: &str) -> Option<&'static CodecRule> {
    CODEC_RULES.iter().find(|r| r.token == token)
}

/// Intersects the controller's codec list with the sink capabilities.
///
/// Output mirrors the controller input order; unsupported and unknown tokens
/// drop out. A match-all sink accepts every offered codec.
#[must_use]
pub fn negotiate_codecs(controller_codecs: &str, sink: &SinkCapabilities) -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();

    for token in controller_codecs.split(',') {
        let token = token.trim();
        let Some(rule) = rule_for(token) else {
            continue;
        };
        if out.contains(&rule.token) {
            continue;
        }

        let supported = sink.match_all
            || rule
                .accepts
                .iter()
                .any(|a| sink.accepts(a, rule.details));
        if supported {
            out.push(rule.token);
        }
    }

    out
}

/// Picks the concrete MIME type to serve for a negotiated codec token.
///
/// Prefers the renderer's own advertisement; falls back to the canonical
/// MIME when the sink is match-all.
#[must_use]
pub fn mime_for_codec(token: &str, sink: &SinkCapabilities) -> Option<String> {
    let rule = rule_for(token)?;

    for accept in rule.accepts {
        let found = sink.entries.iter().find(|entry| {
            let mime_match = if accept.contains('/') {
                entry.mime.contains(accept)
            } else {
                entry.mime.contains(&format!("audio/{accept}"))
                    || entry.mime.contains(&format!("audio/x-{accept}"))
            };
            mime_match
                && rule
                    .details
                    .map_or(true, |d| entry.extras.contains(d) || entry.mime.contains(d))
        });
        if let Some(entry) = found {
            return Some(entry.mime.clone());
        }
    }

    sink.match_all.then(|| rule.canonical.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// DLNA content features
// ─────────────────────────────────────────────────────────────────────────────

/// DLNA profile name for a MIME type, when one exists.
fn dlna_profile(mime: &str) -> Option<&'static str> {
    if mime.contains("mpeg") || mime.contains("mp3") {
        Some("MP3")
    } else if mime.contains("aac") || mime.contains("mp4") || mime.contains("m4a") {
        Some("AAC_ISO")
    } else if mime.contains("wav") || mime.contains("audio/L") {
        Some("LPCM")
    } else if mime.contains("wma") {
        Some("WMABASE")
    } else {
        None
    }
}

/// Builds the `contentFeatures.dlna.org` value for a stream.
///
/// Tracks with a known duration advertise a time-seekable file
/// (`DLNA.ORG_OP=01`); live streams advertise the streaming flag profile
/// instead.
#[must_use]
pub fn dlna_content_features(mime: &str, duration_ms: u32) -> String {
    let pn = dlna_profile(mime)
        .map(|p| format!("DLNA.ORG_PN={p};"))
        .unwrap_or_default();

    if duration_ms > 0 {
        format!("{pn}DLNA.ORG_OP=01;DLNA.ORG_CI=0;DLNA.ORG_FLAGS=01500000000000000000000000000000")
    } else {
        format!("{pn}DLNA.ORG_OP=00;DLNA.ORG_CI=0;DLNA.ORG_FLAGS=8D500000000000000000000000000000")
    }
}

/// Builds the `res@protocolInfo` value handed to `SetAVTransportURI`.
#[must_use]
pub fn protocol_info_resource(mime: &str, duration_ms: u32) -> String {
    format!("http-get:*:{}:{}", mime, dlna_content_features(mime, duration_ms))
}
