//! The per-track HTTP audio server.
//!
//! One instance per active track. Binds its own TCP port (sequential retry
//! from the configured base), accepts exactly one renderer connection at a
//! time, and pumps encoded audio from the decode pipeline to the socket in a
//! single cooperative loop: 50 ms readiness polls, non-blocking reads and
//! writes, and no lock ever held across a socket wait. Restart dialects are
//! honored from the head buffer and tail ring; everything the loop owes the
//! wire ahead of payload (response heads, chunk framing, ICY blocks) goes
//! through small pending queues flushed in order.
//!
//! The loop is highly non-linear and easier to follow as a ladder of
//! early-continue steps than as nested conditionals: accept, poll, acquire
//! codec, parse request, flush pending bytes, replay head, exit if done,
//! pull-and-send.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::Interest;
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinHandle;

use super::cache::{HeadBuffer, TailRing};
use super::http::{negotiate_response, HttpRequest, Negotiation, ResponseAction, Restart};
use super::icy::IcyBlockWriter;
use super::pipeline::{output_fill, ByteRing, DecodeState, StreamPipeline};
use crate::protocol_constants::{
    ICY_INTERVAL, MAX_BLOCK, MAX_CHUNK_SIZE, MAX_PORT_RETRIES, OUTPUT_RING_SIZE,
    POLL_INTERVAL_MS, STREAM_BACKLOG, STREAM_PATH_PREFIX,
};
use crate::state::BridgeConfig;

/// Errors from stream-server startup.
#[derive(Debug, Error)]
pub enum StreamError {
    /// No port in the retry window could be bound.
    #[error("failed to bind stream port: {0}")]
    Bind(#[source] io::Error),
}

/// Shared handle to a running stream server.
///
/// The controller side stops the loop through [`StreamHandle::stop`] and
/// observes the outcome through [`StreamHandle::is_completed`].
pub struct StreamHandle {
    /// Track index this server answers for.
    pub index: u16,
    /// Bound TCP port.
    pub port: u16,
    running: AtomicBool,
    completed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamHandle {
    /// Requests loop exit; takes effect within one poll tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// True while the serving loop runs.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// True once all bytes were delivered, or the stream failed before the
    /// first byte.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Waits for the serving task to finish.
    pub async fn join(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                log::debug!("[Stream] task join: {}", e);
            }
        }
    }
}

/// The two stream servers a player may own during a track transition:
/// at most one active and one shutting down.
#[derive(Default)]
pub struct StreamSlots {
    active: Option<Arc<StreamHandle>>,
    retiring: Option<Arc<StreamHandle>>,
}

impl StreamSlots {
    /// Installs a new active server, retiring the previous one.
    ///
    /// Returns the handle displaced out of the retiring slot (if any); the
    /// caller joins it outside whatever lock holds the slots.
    pub fn replace(&mut self, new: Arc<StreamHandle>) -> Option<Arc<StreamHandle>> {
        let displaced = self.retiring.take();
        if let Some(old) = self.active.take() {
            old.stop();
            self.retiring = Some(old);
        }
        if let Some(ref displaced) = displaced {
            displaced.stop();
        }
        self.active = Some(new);
        displaced
    }

    /// The currently active server.
    #[must_use]
    pub fn active(&self) -> Option<&Arc<StreamHandle>> {
        self.active.as_ref()
    }

    /// Stops both slots and returns the handles for joining.
    pub fn clear(&mut self) -> Vec<Arc<StreamHandle>> {
        let handles: Vec<_> = self
            .active
            .take()
            .into_iter()
            .chain(self.retiring.take())
            .collect();
        for handle in &handles {
            handle.stop();
        }
        handles
    }
}

/// Starts a stream server for `index`, binding the first free port at or
/// after `config.stream_port_base`.
///
/// # Errors
/// [`StreamError::Bind`] when the whole retry window is exhausted. No handle
/// is published in that case, so callers never observe a half-started
/// server.
pub async fn start(
    index: u16,
    pipeline: Arc<StreamPipeline>,
    config: &BridgeConfig,
) -> Result<Arc<StreamHandle>, StreamError> {
    let listener = bind_listener(config.stream_port_base)?;
    let port = listener.local_addr().map_err(StreamError::Bind)?.port();

    let handle = Arc::new(StreamHandle {
        index,
        port,
        running: AtomicBool::new(true),
        completed: AtomicBool::new(false),
        task: Mutex::new(None),
    });

    log::info!("[Stream {}] serving on port {}", index, port);

    let task = tokio::spawn(serve(
        listener,
        index,
        pipeline,
        config.send_icy,
        Arc::clone(&handle),
    ));
    *handle.task.lock() = Some(task);

    Ok(handle)
}

/// Binds a listener with sequential port retry and a backlog of one.
fn bind_listener(port_base: u16) -> Result<TcpListener, StreamError> {
    let mut last_err = None;

    for attempt in 0..MAX_PORT_RETRIES {
        let Some(port) = port_base.checked_add(attempt) else {
            break;
        };
        let socket = match TcpSocket::new_v4() {
            Ok(socket) => socket,
            Err(e) => {
                last_err = Some(e);
                continue;
            }
        };
        let _ = socket.set_reuseaddr(true);
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
        if let Err(e) = socket.bind(addr) {
            last_err = Some(e);
            continue;
        }
        match socket.listen(STREAM_BACKLOG) {
            Ok(listener) => return Ok(listener),
            Err(e) => last_err = Some(e),
        }
    }

    Err(StreamError::Bind(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrInUse, "no stream port available")
    })))
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Payload source for one send attempt.
enum Src {
    /// Pending ICY metadata block (not payload; exempt from ICY counting).
    Icy,
    /// Replay out of the tail ring (`tpos < bytes`).
    Tail,
    /// Fresh bytes from the private forward buffer.
    Live,
}

#[allow(clippy::too_many_lines)]
async fn serve(
    listener: TcpListener,
    index: u16,
    pipeline: Arc<StreamPipeline>,
    send_icy: bool,
    handle: Arc<StreamHandle>,
) {
    let poll = Duration::from_millis(POLL_INTERVAL_MS);

    let mut client: Option<tokio::net::TcpStream> = None;
    let mut reqbuf: Vec<u8> = Vec::new();
    let mut http_ready = false;
    let mut want_write = false;
    let mut close_after_pending = false;

    let mut profile = None;
    let mut obuf = ByteRing::with_capacity(OUTPUT_RING_SIZE);
    let mut head = HeadBuffer::new();
    let mut tail: Option<TailRing> = None;

    // Total payload bytes ingested from the pipeline / replay cursor.
    let mut bytes: u64 = 0;
    let mut tpos: u64 = 0;
    let mut head_resend: usize = 0;

    // Bytes owed to the wire ahead of payload: response head, chunk framing,
    // the final 0-chunk.
    let mut pending: Vec<u8> = Vec::new();
    let mut chunked = false;
    let mut chunk_remaining: usize = 0;

    let mut icy: Option<IcyBlockWriter> = None;
    let mut icy_block: Option<Bytes> = None;

    let mut draining = false;
    let mut done = false;

    while handle.is_running() {
        // ── no client: accept, or notice a stream that died unstarted ──
        if client.is_none() {
            match tokio::time::timeout(poll, listener.accept()).await {
                Ok(Ok((sock, peer))) => {
                    log::info!("[Stream {}] connection from {}", index, peer);
                    client = Some(sock);
                    http_ready = false;
                    want_write = false;
                    close_after_pending = false;
                    reqbuf.clear();
                }
                Ok(Err(e)) => {
                    log::warn!("[Stream {}] accept failed: {}", index, e);
                    tokio::time::sleep(poll).await;
                }
                Err(_) => {
                    // When streaming fails outright, decode completes but the
                    // renderer never shows up; exit so the controller is
                    // released.
                    let decode_state = pipeline.decoder().state;
                    let mut output = pipeline.output();
                    if output.ring.is_empty()
                        && matches!(decode_state, DecodeState::Complete | DecodeState::Error)
                    {
                        output.completed = true;
                        drop(output);
                        handle.completed.store(true, Ordering::SeqCst);
                        pipeline.wake_controller();
                        log::warn!("[Stream {}] streaming failed, exiting", index);
                        break;
                    }
                }
            }
            continue;
        }

        // ── 50 ms readiness poll; timeouts still fall through to the pull
        //    step so decoder progress is noticed every tick ──
        let interest = if want_write {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        let poll_result = {
            let sock = client.as_ref().expect("client checked above");
            tokio::time::timeout(poll, sock.ready(interest)).await
        };
        let ready = match poll_result {
            Ok(Ok(ready)) => Some(ready),
            Ok(Err(e)) => {
                log::info!("[Stream {}] socket error: {}", index, e);
                client = None;
                continue;
            }
            Err(_) => None,
        };

        // ── hold the response until codec parameters are acquired ──
        if profile.is_none() {
            if ready.is_some() {
                let track_start = pipeline.decoder().take_track_start();
                match track_start {
                    Some(acquired) => {
                        log::info!(
                            "[Stream {}] codec acquired: {} ({:?})",
                            index,
                            acquired.mime,
                            acquired.length
                        );
                        profile = Some(acquired);
                    }
                    None => {
                        // Not elegant, but no reason to burn CPU here.
                        tokio::time::sleep(poll).await;
                        continue;
                    }
                }
            } else {
                continue;
            }
        }

        // ── consume request bytes ──
        if ready.as_ref().map_or(false, |r| tokio::io::Ready::is_readable(*r)) {
            let sock = client.as_ref().expect("client present");
            let mut tmp = [0u8; 2048];
            match sock.try_read(&mut tmp) {
                Ok(0) => {
                    log::info!("[Stream {}] client closed ({} bytes sent)", index, bytes);
                    client = None;
                    pending.clear();
                    chunk_remaining = 0;
                    icy_block = None;
                    continue;
                }
                Ok(n) if !http_ready => {
                    reqbuf.extend_from_slice(&tmp[..n]);
                    if let Some(end) = find_headers_end(&reqbuf) {
                        let raw = String::from_utf8_lossy(&reqbuf[..end]).into_owned();
                        let Some(req) = HttpRequest::parse(&raw) else {
                            log::warn!("[Stream {}] http parsing error", index);
                            client = None;
                            continue;
                        };

                        // Sonos needs a tail of sent bytes for its restart
                        // choreography; other clients release it.
                        if req.is_sonos() {
                            if tail.is_none() {
                                tail = Some(TailRing::new());
                                log::info!("[Stream {}] entering sonos mode", index);
                            }
                        } else if tail.is_some() {
                            tail = None;
                            log::info!("[Stream {}] exiting sonos mode", index);
                        }

                        let track = profile.as_ref().expect("profile acquired");
                        let plan = negotiate_response(
                            &req,
                            &Negotiation {
                                track_index: index,
                                path_prefix: STREAM_PATH_PREFIX,
                                bytes_sent: bytes,
                                profile: track,
                                send_icy,
                                tail_allocated: tail.is_some(),
                            },
                        );
                        log::info!(
                            "[Stream {}] {} -> {}",
                            index,
                            raw.lines().next().unwrap_or_default(),
                            plan.status
                        );

                        pending = plan.render().into_bytes();
                        want_write = true;
                        chunk_remaining = 0;
                        head_resend = 0;
                        icy_block = None;
                        reqbuf.clear();

                        match plan.action {
                            ResponseAction::Reject | ResponseAction::HeadOnly => {
                                close_after_pending = true;
                            }
                            ResponseAction::Stream(restart) => {
                                http_ready = true;
                                chunked = plan.chunked;
                                icy = plan.icy.then(|| IcyBlockWriter::new(ICY_INTERVAL));
                                match restart {
                                    Restart::None => tpos = bytes,
                                    Restart::FromOffset(offset) if offset <= bytes => {
                                        tpos = offset;
                                        log::info!(
                                            "[Stream {}] tail pos {} (need {})",
                                            index,
                                            tpos,
                                            bytes - tpos
                                        );
                                    }
                                    Restart::FromOffset(offset) => {
                                        // Ahead of anything we ever sent.
                                        log::warn!(
                                            "[Stream {}] range {} beyond {} refused",
                                            index,
                                            offset,
                                            bytes
                                        );
                                        close_after_pending = true;
                                        http_ready = false;
                                    }
                                    Restart::ResendHead => {
                                        head_resend = head.len();
                                    }
                                }
                            }
                        }
                    } else if reqbuf.len() > 16 * 1024 {
                        log::warn!("[Stream {}] oversized request head", index);
                        client = None;
                        continue;
                    }
                }
                Ok(_) => {} // stray bytes after the request; ignored
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    log::info!("[Stream {}] read error: {}", index, e);
                    client = None;
                    continue;
                }
            }
        }

        // ── flush bytes owed ahead of payload ──
        if !pending.is_empty() {
            let sock = client.as_ref().expect("client present");
            match sock.try_write(&pending) {
                Ok(n) => {
                    pending.drain(..n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    log::info!("[Stream {}] write error: {}", index, e);
                    client = None;
                    continue;
                }
            }
            if pending.is_empty() && close_after_pending {
                client = None;
                close_after_pending = false;
                http_ready = false;
            }
            continue;
        }

        if !http_ready {
            continue;
        }

        // ── restart-from-zero dialect: replay the head, then hang up ──
        if head_resend > 0 {
            let sock = client.as_ref().expect("client present");
            let slice = &head.as_slice()[head.len() - head_resend..];
            match sock.try_write(slice) {
                Ok(n) => {
                    head_resend -= n;
                    if head_resend == 0 {
                        log::info!("[Stream {}] finished head re-send", index);
                        client = None;
                        http_ready = false;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    log::info!("[Stream {}] write error during head re-send: {}", index, e);
                    client = None;
                }
            }
            continue;
        }

        // Exit only after the final chunk frame went out.
        if done {
            log::info!("[Stream {}] self-exit", index);
            break;
        }

        // ── pull from the pipeline and push to the socket. Decoder state is
        //    read first (lock order), the output lock covers only ring pulls
        //    and the non-blocking send ──
        let decode_state = pipeline.decoder().state;
        let mut output = pipeline.output();

        if !output.running {
            want_write = false;
            continue;
        }

        if !draining
            && !output_fill(&mut output, &mut obuf)
            && decode_state != DecodeState::Running
        {
            // Full track pulled from the pipeline; what's left lives in obuf.
            output.completed = true;
            handle.completed.store(true, Ordering::SeqCst);
            draining = true;
            pipeline.wake_controller();
            log::info!("[Stream {}] draining - sent {} bytes", index, bytes);
        }

        let (src, avail) = if let Some(block) = icy_block.as_ref() {
            (Src::Icy, block.len())
        } else if tpos < bytes && tail.is_some() {
            (Src::Tail, ((bytes - tpos) as usize).min(MAX_BLOCK))
        } else {
            (Src::Live, obuf.cont_read().len().min(MAX_BLOCK))
        };

        if avail > 0 {
            want_write = true;
            let mut space = avail;

            // Payload never crosses an ICY boundary in one send.
            if !matches!(src, Src::Icy) {
                if let Some(writer) = icy.as_ref() {
                    space = space.min(writer.remain());
                }
            }

            if chunk_remaining > 0 {
                space = space.min(chunk_remaining);
            } else if chunked {
                // Open the next chunk; its size header goes out first.
                chunk_remaining = space.min(MAX_CHUNK_SIZE);
                pending = format!("{:x}\r\n", chunk_remaining).into_bytes();
                continue;
            }

            let sock = client.as_ref().expect("client present");
            let sent = match src {
                Src::Icy => {
                    let block = icy_block.as_ref().expect("icy block present");
                    sock.try_write(&block[..space])
                }
                Src::Tail => {
                    let ring = tail.as_ref().expect("tail allocated");
                    sock.try_write(ring.read_from(tpos, space))
                }
                Src::Live => sock.try_write(&obuf.cont_read()[..space]),
            };

            match sent {
                Ok(0) => {
                    client = None;
                }
                Ok(sent) => {
                    if chunk_remaining > 0 {
                        chunk_remaining -= sent;
                        if chunk_remaining == 0 {
                            pending = b"\r\n".to_vec();
                        }
                    }

                    match src {
                        Src::Icy => {
                            let block = icy_block.take().expect("icy block present");
                            let rest = block.slice(sent..);
                            if !rest.is_empty() {
                                icy_block = Some(rest);
                            }
                        }
                        Src::Tail => {
                            tpos += sent as u64;
                            if let Some(writer) = icy.as_mut() {
                                if writer.consume(sent) {
                                    icy_block = Some(writer.block(&output.metadata));
                                }
                            }
                        }
                        Src::Live => {
                            {
                                let data = &obuf.cont_read()[..sent];
                                head.extend(data);
                                if let Some(ring) = tail.as_mut() {
                                    ring.write(bytes, data);
                                }
                            }
                            obuf.consume(sent);
                            bytes += sent as u64;
                            tpos = bytes;
                            if let Some(writer) = icy.as_mut() {
                                if writer.consume(sent) {
                                    icy_block = Some(writer.block(&output.metadata));
                                }
                            }
                        }
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    log::info!("[Stream {}] send error: {}", index, e);
                    client = None;
                }
            }
        } else {
            // Nothing to send: either the drain just finished, or we idle
            // until the decoder produces more.
            if draining {
                if !output.flow {
                    if chunked {
                        pending = b"0\r\n\r\n".to_vec();
                        want_write = true;
                    }
                    done = true;
                } else if !output.ring.is_empty() {
                    // Flow encoding refilled the ring; not done after all.
                    draining = false;
                }
            }
            if !done {
                want_write = false;
            }
        }
    }

    log::info!("[Stream {}] completed: {} bytes", index, bytes);

    drop(client);
    drop(listener);
    handle.running.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{StreamLength, TrackProfile};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    const TEST_TIMEOUT: Duration = Duration::from_secs(10);

    fn live_mp3() -> TrackProfile {
        TrackProfile {
            mime: "audio/mpeg".to_string(),
            length: StreamLength::Live,
            duration_ms: 0,
        }
    }

    fn config(port_base: u16) -> BridgeConfig {
        BridgeConfig {
            stream_port_base: port_base,
            ..Default::default()
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    async fn connect(port: u16) -> TcpStream {
        tokio::time::timeout(TEST_TIMEOUT, TcpStream::connect(("127.0.0.1", port)))
            .await
            .expect("connect timeout")
            .expect("connect")
    }

    async fn read_to_end(sock: &mut TcpStream) -> Vec<u8> {
        let mut buf = Vec::new();
        tokio::time::timeout(TEST_TIMEOUT, sock.read_to_end(&mut buf))
            .await
            .expect("read timeout")
            .expect("read");
        buf
    }

    async fn read_exact(sock: &mut TcpStream, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        tokio::time::timeout(TEST_TIMEOUT, sock.read_exact(&mut buf))
            .await
            .expect("read timeout")
            .expect("read");
        buf
    }

    fn split_head(response: &[u8]) -> (String, Vec<u8>) {
        let end = find_headers_end(response).expect("response head terminator");
        (
            String::from_utf8_lossy(&response[..end]).into_owned(),
            response[end..].to_vec(),
        )
    }

    /// Strips chunked framing, asserting frame invariants along the way.
    fn dechunk(mut body: &[u8]) -> Vec<u8> {
        let mut payload = Vec::new();
        loop {
            let line_end = body
                .windows(2)
                .position(|w| w == b"\r\n")
                .expect("chunk size line");
            let size = usize::from_str_radix(
                std::str::from_utf8(&body[..line_end]).expect("hex size"),
                16,
            )
            .expect("chunk size parses");
            assert!(size <= MAX_CHUNK_SIZE, "chunk exceeds MAX_CHUNK_SIZE");
            body = &body[line_end + 2..];
            if size == 0 {
                assert_eq!(body, b"\r\n", "terminating chunk ends the stream");
                return payload;
            }
            payload.extend_from_slice(&body[..size]);
            assert_eq!(&body[size..size + 2], b"\r\n", "chunk footer");
            body = &body[size + 2..];
        }
    }

    /// Strips ICY metadata blocks inserted every `ICY_INTERVAL` bytes.
    fn strip_icy(payload: &[u8]) -> Vec<u8> {
        let mut audio = Vec::new();
        let mut rest = payload;
        loop {
            let take = rest.len().min(ICY_INTERVAL);
            audio.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if rest.is_empty() {
                return audio;
            }
            let blocks = rest[0] as usize;
            rest = &rest[1 + blocks * 16..];
        }
    }

    #[tokio::test]
    async fn chunked_live_stream_with_icy_metadata() {
        let audio = pattern(100 * 1024);
        let pipeline = StreamPipeline::new();
        pipeline.start_track(live_mp3());
        assert_eq!(pipeline.push(&audio), audio.len());
        pipeline.finish_decode();

        let handle = start(7, Arc::clone(&pipeline), &config(42100)).await.unwrap();

        let mut sock = connect(handle.port).await;
        sock.write_all(b"GET /stream/7 HTTP/1.1\r\nIcy-MetaData:1\r\n\r\n")
            .await
            .unwrap();

        let response = read_to_end(&mut sock).await;
        let (head, body) = split_head(&response);

        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Transfer-Encoding: chunked"));
        assert!(head.contains("icy-metaint: 32000"));
        assert!(head.contains("Content-Type: audio/mpeg"));

        let payload = dechunk(&body);
        // Three boundaries inside 100 KiB, empty metadata = 1 zero byte each
        assert_eq!(payload.len(), audio.len() + 3);
        assert_eq!(strip_icy(&payload), audio);

        handle.join().await;
        assert!(handle.is_completed());
    }

    #[tokio::test]
    async fn sonos_head_resend_and_range_restart() {
        let audio = pattern(500 * 1024);
        let pipeline = StreamPipeline::new();
        pipeline.start_track(live_mp3());
        assert_eq!(pipeline.push(&audio), audio.len());

        let handle = start(3, Arc::clone(&pipeline), &config(42200)).await.unwrap();

        // First pull: HTTP/1.0 keeps the wire close-delimited. Read 500 KiB,
        // then drop the connection like a pausing Sonos does.
        let mut first = connect(handle.port).await;
        first
            .write_all(b"GET /stream/3 HTTP/1.0\r\nUser-Agent: sonos\r\n\r\n")
            .await
            .unwrap();
        let head_end: Vec<u8> = {
            let mut acc = Vec::new();
            while find_headers_end(&acc).is_none() {
                acc.extend_from_slice(&read_exact(&mut first, 1).await);
            }
            acc
        };
        let (status, _) = split_head(&head_end);
        assert!(status.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(!status.contains("Transfer-Encoding"));
        let body = read_exact(&mut first, audio.len()).await;
        assert_eq!(body, audio);
        drop(first);

        // Give the loop a tick to notice the hangup.
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Reconnect without a Range: fake 2G length, exactly the head buffer
        // re-sent, then the server hangs up.
        let mut second = connect(handle.port).await;
        second
            .write_all(b"GET /stream/3 HTTP/1.1\r\nUser-Agent: sonos\r\n\r\n")
            .await
            .unwrap();
        let response = read_to_end(&mut second).await;
        let (head, body) = split_head(&response);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Content-Length: 2048000000"));
        assert!(!head.contains("Transfer-Encoding"));
        assert_eq!(body.len(), 64 * 1024);
        assert_eq!(body, audio[..64 * 1024]);

        tokio::time::sleep(Duration::from_millis(150)).await;

        // Range restart: resume at 65536 out of the tail ring, then keep
        // getting live bytes until the track drains.
        let mut third = connect(handle.port).await;
        third
            .write_all(
                b"GET /stream/3 HTTP/1.0\r\nUser-Agent: sonos\r\nRange: bytes=65536-\r\n\r\n",
            )
            .await
            .unwrap();
        let tail_bytes = pattern(16 * 1024 + 500 * 1024);
        pipeline.push(&tail_bytes[500 * 1024..]);
        pipeline.finish_decode();

        let response = read_to_end(&mut third).await;
        let (head, body) = split_head(&response);
        assert!(head.starts_with("HTTP/1.1 206 Partial Content\r\n"));

        let mut expected = audio[65536..].to_vec();
        expected.extend_from_slice(&tail_bytes[500 * 1024..]);
        assert_eq!(body.len(), expected.len());
        assert_eq!(body, expected);

        handle.join().await;
        assert!(handle.is_completed());
    }

    #[tokio::test]
    async fn wrong_index_gets_410_and_consumes_no_audio() {
        let audio = pattern(8 * 1024);
        let pipeline = StreamPipeline::new();
        pipeline.start_track(live_mp3());
        pipeline.push(&audio);

        let handle = start(4, Arc::clone(&pipeline), &config(42300)).await.unwrap();

        let mut sock = connect(handle.port).await;
        sock.write_all(b"GET /stream/9 HTTP/1.1\r\n\r\n").await.unwrap();
        let response = read_to_end(&mut sock).await;
        let (head, body) = split_head(&response);
        assert!(head.starts_with("HTTP/1.1 410 Gone\r\n"));
        assert!(body.is_empty());

        // The server is still alive and the audio is still there.
        assert!(handle.is_running());
        assert_eq!(pipeline.output().ring.used(), audio.len());

        handle.stop();
        handle.join().await;
    }

    #[tokio::test]
    async fn decode_failure_before_connect_exits_completed() {
        let pipeline = StreamPipeline::new();
        pipeline.finish_decode(); // complete, ring empty, no track_start

        let handle = start(1, Arc::clone(&pipeline), &config(42400)).await.unwrap();
        handle.join().await;

        assert!(!handle.is_running());
        assert!(handle.is_completed());
        assert!(pipeline.output().completed);
    }

    #[tokio::test]
    async fn head_request_gets_header_only() {
        let pipeline = StreamPipeline::new();
        pipeline.start_track(live_mp3());
        pipeline.push(&pattern(4096));

        let handle = start(2, Arc::clone(&pipeline), &config(42500)).await.unwrap();

        let mut sock = connect(handle.port).await;
        sock.write_all(b"HEAD /stream/2 HTTP/1.1\r\n\r\n").await.unwrap();
        let response = read_to_end(&mut sock).await;
        let (head, body) = split_head(&response);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(body.is_empty());

        handle.stop();
        handle.join().await;
    }

    #[tokio::test]
    async fn stop_terminates_within_poll_latency() {
        let pipeline = StreamPipeline::new();
        let handle = start(5, pipeline, &config(42600)).await.unwrap();

        handle.stop();
        tokio::time::timeout(Duration::from_secs(2), handle.join())
            .await
            .expect("join after stop");
        assert!(!handle.is_running());
    }

    #[test]
    fn slots_keep_one_active_one_retiring() {
        let make = |index| {
            Arc::new(StreamHandle {
                index,
                port: 0,
                running: AtomicBool::new(true),
                completed: AtomicBool::new(false),
                task: Mutex::new(None),
            })
        };

        let mut slots = StreamSlots::default();
        let first = make(1);
        assert!(slots.replace(Arc::clone(&first)).is_none());
        assert_eq!(slots.active().unwrap().index, 1);

        let second = make(2);
        assert!(slots.replace(Arc::clone(&second)).is_none());
        assert!(!first.is_running(), "displaced active is stopped");
        assert_eq!(slots.active().unwrap().index, 2);

        // Third replace displaces the retiring first handle for joining.
        let third = make(3);
        let displaced = slots.replace(third).expect("retiring slot displaced");
        assert_eq!(displaced.index, 1);
        assert!(!second.is_running());

        let cleared = slots.clear();
        assert_eq!(cleared.len(), 2);
        assert!(slots.active().is_none());
    }
}
