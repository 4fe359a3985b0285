//! The decode-side collaborator interface.
//!
//! The decoder and transcoder live outside this crate; what the HTTP server
//! needs from them is narrow: a signal that codec parameters are known (the
//! track profile), a ring of encoded bytes to pull from, and the decode
//! state. [`StreamPipeline`] bundles exactly that behind the two mutexes the
//! serving loop takes in its fixed order: decoder state first, output buffer
//! second. Neither lock is ever held across socket waits.

use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tokio::sync::Notify;

use super::{StreamMetadata, TrackProfile};
use crate::protocol_constants::OUTPUT_RING_SIZE;

/// Decoder state as mirrored to the output side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeState {
    #[default]
    Stopped,
    Running,
    Complete,
    Error,
}

/// State guarded by the decoder mutex.
#[derive(Default)]
pub struct DecoderSide {
    /// Current decode state.
    pub state: DecodeState,
    /// Set once codec parameters are known; taken by the server.
    track_start: Option<TrackProfile>,
}

impl DecoderSide {
    /// Takes the pending track profile, if the decoder published one.
    pub fn take_track_start(&mut self) -> Option<TrackProfile> {
        self.track_start.take()
    }
}

/// State guarded by the output-buffer mutex.
pub struct OutputSide {
    /// Controller has released the output for streaming.
    pub running: bool,
    /// Producer ring the decode side writes encoded bytes into.
    pub ring: ByteRing,
    /// Flow encoding: the ring may keep refilling after a drain started.
    pub flow: bool,
    /// All bytes delivered, or the stream failed before the first byte.
    pub completed: bool,
    /// Current track metadata, read at ICY block boundaries.
    pub metadata: StreamMetadata,
}

impl Default for OutputSide {
    fn default() -> Self {
        Self {
            running: false,
            ring: ByteRing::with_capacity(OUTPUT_RING_SIZE),
            flow: false,
            completed: false,
            metadata: StreamMetadata::default(),
        }
    }
}

/// Shared handle between the decode side and one HTTP server.
///
/// Lock order is decoder -> output, globally. The serving loop's private
/// forward buffer is filled from `output().ring` via [`output_fill`].
#[derive(Default)]
pub struct StreamPipeline {
    decoder: Mutex<DecoderSide>,
    output: Mutex<OutputSide>,
    controller_wake: Notify,
}

impl StreamPipeline {
    /// Creates an idle pipeline.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Locks the decoder side. Acquire before the output side.
    pub fn decoder(&self) -> MutexGuard<'_, DecoderSide> {
        self.decoder.lock()
    }

    /// Locks the output side.
    pub fn output(&self) -> MutexGuard<'_, OutputSide> {
        self.output.lock()
    }

    // ── Decode-side API ─────────────────────────────────────────────────────

    /// Publishes codec parameters and starts the track.
    pub fn start_track(&self, profile: TrackProfile) {
        {
            let mut decoder = self.decoder();
            decoder.state = DecodeState::Running;
            decoder.track_start = Some(profile);
        }
        let mut output = self.output();
        output.running = true;
        output.completed = false;
    }

    /// Appends encoded bytes; returns how many the ring accepted.
    pub fn push(&self, data: &[u8]) -> usize {
        self.output().ring.write(data)
    }

    /// Marks the decode finished; remaining ring contents still drain.
    pub fn finish_decode(&self) {
        self.decoder().state = DecodeState::Complete;
    }

    /// Marks the decode failed. The serving loop exits once drained.
    pub fn fail_decode(&self) {
        self.decoder().state = DecodeState::Error;
    }

    /// Updates track metadata (picked up at the next ICY boundary).
    pub fn update_metadata(&self, metadata: StreamMetadata) {
        self.output().metadata = metadata;
    }

    // ── Controller-side API ─────────────────────────────────────────────────

    /// Wakes the controller; called when the stream completes.
    pub fn wake_controller(&self) {
        self.controller_wake.notify_waiters();
    }

    /// Waits for the next controller wake-up.
    pub async fn controller_notified(&self) {
        self.controller_wake.notified().await;
    }
}

/// Moves bytes from the shared producer ring into the server's private
/// forward buffer. Returns true if anything was pulled.
pub fn output_fill(output: &mut OutputSide, obuf: &mut ByteRing) -> bool {
    let mut pulled = false;
    loop {
        let span = output.ring.cont_read();
        if span.is_empty() || obuf.free() == 0 {
            break;
        }
        let n = obuf.write(span);
        if n == 0 {
            break;
        }
        output.ring.consume(n);
        pulled = true;
    }
    pulled
}

// ─────────────────────────────────────────────────────────────────────────────
// Byte ring
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed-capacity circular byte buffer with contiguous-span reads.
pub struct ByteRing {
    buf: Box<[u8]>,
    read: usize,
    used: usize,
}

impl ByteRing {
    /// Creates a ring of the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            read: 0,
            used: 0,
        }
    }

    /// Bytes currently buffered.
    #[must_use]
    pub fn used(&self) -> usize {
        self.used
    }

    /// Remaining capacity.
    #[must_use]
    pub fn free(&self) -> usize {
        self.buf.len() - self.used
    }

    /// True when nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Writes as much of `data` as fits; returns the number accepted.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.free());
        let cap = self.buf.len();
        let write_at = (self.read + self.used) % cap;
        let first = n.min(cap - write_at);
        self.buf[write_at..write_at + first].copy_from_slice(&data[..first]);
        self.buf[..n - first].copy_from_slice(&data[first..n]);
        self.used += n;
        n
    }

    /// The contiguous readable region at the read cursor.
    #[must_use]
    pub fn cont_read(&self) -> &[u8] {
        let span = self.used.min(self.buf.len() - self.read);
        &self.buf[self.read..self.read + span]
    }

    /// Advances the read cursor after consuming `n` bytes.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.used);
        self.read = (self.read + n) % self.buf.len();
        self.used -= n;
    }
}
