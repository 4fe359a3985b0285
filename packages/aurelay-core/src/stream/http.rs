//! HTTP request parsing and response negotiation for the audio server.
//!
//! The diversity of renderer HTTP stacks is too large to do anything clever:
//! either we chunk or we don't, ranges are only honored as "resume from N",
//! and one well-known client gets its own restart choreography. All of that
//! policy is decided here, in one place, and returned as a [`ResponsePlan`]
//! the serving loop executes.

use super::TrackProfile;
use crate::protocol_constants::{ICY_INTERVAL, SERVER_IDENT, SONOS_RESTART_LENGTH};
use crate::renderer::capabilities::dlna_content_features;

/// Request methods the audio endpoint answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
}

/// A parsed audio-endpoint request.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub target: String,
    pub http11: bool,
    headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Parses a raw request (request line + headers) into a structure.
    ///
    /// Returns `None` on anything that is not a well-formed GET/HEAD.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut lines = raw.split("\r\n");
        let request_line = lines.next()?;
        let mut parts = request_line.split_whitespace();

        let method = match parts.next()? {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            _ => return None,
        };
        let target = parts.next()?.to_string();
        let version = parts.next()?;
        if !version.starts_with("HTTP/") {
            return None;
        }

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
        }

        Some(Self {
            method,
            target,
            http11: version.contains("1.1"),
            headers,
        })
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Extracts the decimal track index trailing the stream path prefix.
    #[must_use]
    pub fn trailing_index(&self, prefix: &str) -> Option<u16> {
        let rest = &self.target[self.target.find(prefix)? + prefix.len()..];
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok()
    }

    /// Parses `Range: bytes=N-` into the requested start offset.
    #[must_use]
    pub fn range_offset(&self) -> Option<u64> {
        let value = self.header("Range")?;
        let after = value.trim().strip_prefix("bytes=")?;
        let digits: String = after.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok()
    }

    /// True when the client identifies as the head-resend/range-restart
    /// dialect.
    #[must_use]
    pub fn is_sonos(&self) -> bool {
        self.header("User-Agent")
            .map_or(false, |ua| ua.eq_ignore_ascii_case("sonos"))
    }

    /// True when the client asked for ICY metadata.
    #[must_use]
    pub fn wants_icy(&self) -> bool {
        self.header("Icy-MetaData")
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map_or(false, |v| v != 0)
    }
}

/// How the serving loop resumes after this response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restart {
    /// Continue at the live edge.
    None,
    /// Replay from absolute stream offset N out of the tail ring.
    FromOffset(u64),
    /// Re-send the head buffer from byte zero, then close.
    ResendHead,
}

/// What happens once the response header is on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseAction {
    /// Close without a body (bad request, wrong index).
    Reject,
    /// Header only (HEAD request), then close.
    HeadOnly,
    /// Serve the stream.
    Stream(Restart),
}

/// A fully negotiated response.
#[derive(Debug)]
pub struct ResponsePlan {
    pub status: &'static str,
    pub headers: Vec<(String, String)>,
    pub chunked: bool,
    pub icy: bool,
    pub action: ResponseAction,
}

impl ResponsePlan {
    /// Serializes the response head.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!("HTTP/1.1 {}\r\n", self.status);
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out
    }
}

/// Inputs the negotiation needs from the serving loop.
pub struct Negotiation<'a> {
    /// The server's track index; anything else gets 410.
    pub track_index: u16,
    /// Stream path prefix the index trails.
    pub path_prefix: &'a str,
    /// Payload bytes already sent on this stream.
    pub bytes_sent: u64,
    /// Track parameters from codec acquisition.
    pub profile: &'a TrackProfile,
    /// ICY insertion enabled in configuration.
    pub send_icy: bool,
    /// A tail ring exists (a Sonos-dialect client was seen earlier).
    pub tail_allocated: bool,
}

/// Negotiates the response for a parsed request.
#[must_use]
pub fn negotiate_response(req: &HttpRequest, n: &Negotiation<'_>) -> ResponsePlan {
    let mut headers: Vec<(String, String)> = vec![
        ("Server".to_string(), SERVER_IDENT.to_string()),
        ("Connection".to_string(), "close".to_string()),
    ];

    // Wrong track index: normal during track transitions, refuse politely.
    if req.trailing_index(n.path_prefix) != Some(n.track_index) {
        return ResponsePlan {
            status: "410 Gone",
            headers,
            chunked: false,
            icy: false,
            action: ResponseAction::Reject,
        };
    }

    headers.push(("Content-Type".to_string(), n.profile.mime.clone()));
    if let Some(len) = n.profile.length.content_length() {
        headers.push(("Content-Length".to_string(), len.to_string()));
    }

    // Mirror the DLNA transfer mode back verbatim.
    if let Some(mode) = req.header("TransferMode.DLNA.ORG") {
        headers.push(("TransferMode.DLNA.ORG".to_string(), mode.to_string()));
    }

    if req.header("getcontentFeatures.dlna.org").is_some() {
        headers.push((
            "contentFeatures.dlna.org".to_string(),
            dlna_content_features(&n.profile.mime, n.profile.duration_ms),
        ));
    }

    // ICY only on live MP3/AAC streams, only when the client asked.
    let icy =
        n.send_icy && n.profile.duration_ms == 0 && n.profile.supports_icy() && req.wants_icy();
    if icy {
        headers.push(("icy-metaint".to_string(), ICY_INTERVAL.to_string()));
    }

    let mut status = "200 OK";
    let mut restart = Restart::None;
    let mut chunking_allowed = true;

    match req.range_offset() {
        // A range request - might happen even though we never said we
        // support ranges.
        Some(offset) if offset > 0 => {
            status = "206 Partial Content";
            restart = Restart::FromOffset(offset);
        }
        _ => {
            if n.bytes_sent > 0 && n.tail_allocated && req.is_sonos() {
                // Sonos re-opening the connection: advertise a huge length so
                // it comes back with a Range request, and replay the head.
                if n.profile.length.content_length().is_none() {
                    headers.push((
                        "Content-Length".to_string(),
                        SONOS_RESTART_LENGTH.to_string(),
                    ));
                }
                chunking_allowed = false;
                restart = Restart::ResendHead;
            }
        }
    }

    let chunked = chunking_allowed
        && req.http11
        && n.profile.length == super::StreamLength::Live;
    if chunked {
        headers.push(("Transfer-Encoding".to_string(), "chunked".to_string()));
    }

    let action = if req.method == Method::Head {
        ResponseAction::HeadOnly
    } else {
        ResponseAction::Stream(restart)
    };

    ResponsePlan {
        status,
        headers,
        chunked,
        icy,
        action,
    }
}
