//! ICY (Shoutcast) metadata handling.
//!
//! Live MP3/AAC streams may carry in-band metadata: every `icy-metaint`
//! payload bytes, a length-prefixed metadata block is inserted. The server
//! counts payload bytes itself, so this module only formats blocks and
//! tracks the boundary.

use bytes::Bytes;

use super::StreamMetadata;

/// Formats stream metadata into ICY protocol blocks.
pub struct IcyFormatter;

impl IcyFormatter {
    /// Formats metadata into an ICY metadata block.
    ///
    /// Per ICY spec, a single zero byte indicates no metadata change.
    /// Otherwise the first byte is the number of 16-byte blocks, followed by
    /// the metadata string padded to that length.
    #[must_use]
    pub fn format_metadata(metadata: &StreamMetadata) -> Vec<u8> {
        let title = match (&metadata.artist, &metadata.title) {
            (Some(a), Some(t)) => format!("{} - {}", a, t),
            (None, Some(t)) => t.clone(),
            (Some(a), None) => a.clone(),
            (None, None) => return vec![0],
        };

        if title.is_empty() {
            return vec![0];
        }

        // ICY metadata uses single quotes as delimiters. Backslash escaping
        // shows up literally on some renderer displays, so substitute the
        // visually identical U+2019 instead.
        let title = title.replace('\'', "\u{2019}");
        let meta_str = format!("StreamTitle='{}';", title);
        let meta_bytes = meta_str.as_bytes();

        let num_blocks = meta_bytes.len().div_ceil(16);
        let padded_len = num_blocks * 16;

        let mut result = Vec::with_capacity(padded_len + 1);
        result.push(num_blocks as u8);
        result.extend_from_slice(meta_bytes);
        result.resize(padded_len + 1, 0);

        result
    }
}

/// Tracks the ICY interval for one connection and emits boundary blocks.
///
/// Caches the formatted block and re-emits the full metadata only when the
/// title or artist changed since the last boundary; otherwise the boundary
/// gets the single zero byte.
pub struct IcyBlockWriter {
    interval: usize,
    remain: usize,
    last_title: Option<String>,
    last_artist: Option<String>,
}

impl IcyBlockWriter {
    /// Creates a writer with the boundary `interval` bytes away.
    #[must_use]
    pub fn new(interval: usize) -> Self {
        Self {
            interval,
            remain: interval,
            last_title: None,
            last_artist: None,
        }
    }

    /// Payload bytes remaining until the next metadata boundary.
    #[must_use]
    pub fn remain(&self) -> usize {
        self.remain
    }

    /// Accounts `n` payload bytes; returns true when the boundary is hit.
    pub fn consume(&mut self, n: usize) -> bool {
        debug_assert!(n <= self.remain);
        self.remain -= n;
        self.remain == 0
    }

    /// Emits the block for the boundary just hit and re-arms the interval.
    ///
    /// Full metadata when it changed since the previous block, the
    /// single-zero-byte "no change" marker otherwise.
    pub fn block(&mut self, metadata: &StreamMetadata) -> Bytes {
        debug_assert_eq!(self.remain, 0);
        self.remain = self.interval;

        let changed =
            self.last_title != metadata.title || self.last_artist != metadata.artist;
        if changed {
            self.last_title = metadata.title.clone();
            self.last_artist = metadata.artist.clone();
            Bytes::from(IcyFormatter::format_metadata(metadata))
        } else {
            Bytes::from_static(&[0])
        }
    }
}
