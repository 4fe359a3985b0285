//! Audio streaming: the per-track HTTP servers and their decode-side seam.
//!
//! # Module Structure
//!
//! - `pipeline` - the decode/output collaborator interface (rings + states)
//! - `cache` - head buffer and tail ring for restart dialects
//! - `http` - GET/HEAD parsing and response negotiation
//! - `icy` - ICY metadata block formatting and interval tracking
//! - `server` - the serving loop, one instance per active track

pub mod cache;
pub mod http;
pub mod icy;
pub mod pipeline;
pub mod server;

pub use pipeline::{DecodeState, StreamPipeline};
pub use server::{StreamHandle, StreamSlots};

use serde::{Deserialize, Serialize};

/// Logical length of a stream as known to the decode side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamLength {
    /// Exact byte length known up front; sent as `Content-Length`.
    Known(u64),
    /// Unknown length; close-delimited response.
    Unknown,
    /// Live/unbounded stream; chunked when the client speaks HTTP/1.1.
    Live,
}

impl StreamLength {
    /// The `Content-Length` value to advertise, when one exists.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        match self {
            Self::Known(len) => Some(*len),
            _ => None,
        }
    }
}

/// Metadata for the current track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
}

/// Everything the HTTP server needs to know about a track, published by the
/// decode side once codec parameters are acquired.
#[derive(Debug, Clone)]
pub struct TrackProfile {
    /// Negotiated MIME type served as `Content-Type`.
    pub mime: String,
    /// Stream length as known to the decoder.
    pub length: StreamLength,
    /// Track duration in milliseconds; 0 means live.
    pub duration_ms: u32,
}

impl TrackProfile {
    /// True for formats that may carry ICY metadata (MP3 and AAC only).
    #[must_use]
    pub fn supports_icy(&self) -> bool {
        let mime = self.mime.as_str();
        mime.contains("mpeg") || mime.contains("mp3") || mime.contains("aac")
    }
}
