//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by external specifications (UPnP, GENA, HTTP,
//! Shoutcast) or by renderer firmware behavior observed in the field, and
//! changing them would break protocol compliance or device compatibility.

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Audio Serving
// ─────────────────────────────────────────────────────────────────────────────

/// Prefix cache: the first bytes of every stream are kept so that renderers
/// which restart playback from zero (Sonos) can be fed the exact prefix again.
pub const HEAD_SIZE: usize = 64 * 1024;

/// Circular cache of the most recently sent bytes, allocated only once a
/// range-restarting renderer has been seen on the stream.
pub const TAIL_SIZE: usize = 2 * 1024 * 1024;

/// Largest single socket write attempted per loop iteration.
pub const MAX_BLOCK: usize = 32 * 1024;

/// Largest HTTP/1.1 chunk emitted when chunked transfer encoding is active.
pub const MAX_CHUNK_SIZE: usize = 256 * 1024;

/// Poll cadence of the serving loop. Also bounds worst-case shutdown latency:
/// every suspension point wakes at least this often to re-check its flags.
pub const POLL_INTERVAL_MS: u64 = 50;

/// Listen backlog for per-track stream sockets. Exactly one renderer pulls a
/// stream; a backlog of one still lets reconnect-style dialects re-enter.
pub const STREAM_BACKLOG: u32 = 1;

/// Number of sequential ports tried when binding a stream server, starting
/// from the configured base port.
pub const MAX_PORT_RETRIES: u16 = 32;

/// Content-Length advertised to a Sonos renderer reconnecting mid-stream when
/// the true length is unknown. The bogus 2 GB value convinces the firmware to
/// come back with a Range request instead of restarting the track.
pub const SONOS_RESTART_LENGTH: u64 = 2_048_000_000;

/// URL path prefix for stream endpoints; the decimal track index follows.
pub const STREAM_PATH_PREFIX: &str = "/stream/";

/// Capacity of the decoder output ring each stream pulls from.
pub const OUTPUT_RING_SIZE: usize = 512 * 1024;

// ─────────────────────────────────────────────────────────────────────────────
// ICY Protocol (Shoutcast/Icecast metadata)
// ─────────────────────────────────────────────────────────────────────────────

/// ICY metadata interval (bytes of audio between metadata blocks).
pub const ICY_INTERVAL: usize = 32000;

// ─────────────────────────────────────────────────────────────────────────────
// GENA (UPnP General Event Notification Architecture)
// ─────────────────────────────────────────────────────────────────────────────

/// GENA subscription timeout requested from the renderer (seconds).
pub const GENA_SUBSCRIPTION_TIMEOUT_SECS: u64 = 3600;

/// Time before subscription expiry to trigger renewal (seconds).
pub const GENA_RENEWAL_BUFFER_SECS: u64 = 300;

/// Interval between subscription renewal checks in the device worker (seconds).
pub const GENA_RENEWAL_CHECK_SECS: u64 = 60;

// ─────────────────────────────────────────────────────────────────────────────
// SOAP
// ─────────────────────────────────────────────────────────────────────────────

/// Timeout for SOAP HTTP requests (seconds). Reasonable for LAN operations.
pub const SOAP_TIMEOUT_SECS: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed capacity of the renderer registry.
pub const MAX_RENDERERS: usize = 32;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Value of the `Server` response header on audio streams.
///
/// Intentionally NOT configurable: some renderers key quirk handling on the
/// server identity, so consistency matters more than branding.
pub const SERVER_IDENT: &str = "aurelay";

// ─────────────────────────────────────────────────────────────────────────────
// Event Bus
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the bridge event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;
