//! The HTTP/2 connection engine (RFC 7540 §3-§6, C7): preface exchange,
//! SETTINGS negotiation, the multiplexed read loop, flow control, PING
//! keepalive, and graceful GOAWAY shutdown.
//!
//! One [`Engine`] owns exactly one duplex byte stream and runs a single
//! reactor task that reads frames, dispatches them to the stream map, and
//! serializes outbound frames through one writer task so that a stream's
//! HEADERS/CONTINUATION sequence is never interleaved with another
//! stream's.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex, Notify};

use crate::error::{Error, Result};

use super::frame::{self, flags, Frame, FrameType};
use super::hpack;
use super::settings::{self, Param, Settings};
use super::stream::{Stream, StreamEvent, StreamState};

const DEFAULT_WINDOW: u32 = 65_535;
const WINDOW_REFRESH_THRESHOLD: i64 = 32_767;

type IncomingIndex = u32;

/// A fully assembled unary response: status plus headers and the
/// concatenated body observed before END_STREAM.
#[derive(Debug, Clone)]
pub struct Http2Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// A locally-initiated stream's outbound half plus its inbound event
/// stream, used by streaming callers (gRPC in particular).
pub struct StreamHandle {
    pub id: u32,
    engine: Arc<Engine>,
    events: mpsc::UnboundedReceiver<StreamEvent>,
}

impl StreamHandle {
    pub async fn send_data(&self, data: Bytes, end_stream: bool) -> Result<()> {
        self.engine.send_data(self.id, data, end_stream).await
    }

    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    pub async fn reset(&self) {
        self.engine.send_rst_stream(self.id, 0x8 /* CANCEL */).await;
    }
}

struct StreamEntry {
    stream: Stream,
    completion: Option<oneshot::Sender<Http2Response>>,
    pending_headers: Vec<(String, String)>,
    trailing_headers: Vec<(String, String)>,
    pending_body: Vec<u8>,
}

/// A stream opened by the peer, handed to the server side for routing
/// (the gRPC service registry keys off the `:path` pseudo-header here).
pub struct IncomingStream {
    pub id: u32,
    pub headers: Vec<(String, String)>,
    events: mpsc::UnboundedReceiver<StreamEvent>,
}

impl IncomingStream {
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }
}

struct Shared {
    writer_tx: mpsc::UnboundedSender<Bytes>,
    streams: AsyncMutex<HashMap<u32, StreamEntry>>,
    hpack_encoder: AsyncMutex<hpack::Encoder>,
    hpack_decoder: AsyncMutex<hpack::Decoder>,
    local_settings: Settings,
    remote_settings: std::sync::Mutex<Settings>,
    next_stream_id: AtomicU32,
    connection_send_window: std::sync::atomic::AtomicI64,
    connection_recv_window: std::sync::atomic::AtomicI64,
    goaway_received: AtomicBool,
    goaway_last_stream_id: AtomicU32,
    window_updated: Notify,
    closed: Notify,
    is_server: bool,
    incoming_tx: mpsc::UnboundedSender<IncomingIndex>,
    incoming_rx: AsyncMutex<mpsc::UnboundedReceiver<IncomingIndex>>,
}

/// A live HTTP/2 connection. Construct with [`Engine::handshake_client`] or
/// [`Engine::handshake_server`] over an already-connected duplex stream.
pub struct Engine {
    shared: Arc<Shared>,
}

impl Engine {
    pub async fn handshake_client<S>(mut io: S) -> Result<Arc<Engine>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        io.write_all(frame::CONNECTION_PREFACE)
            .await
            .map_err(|e| Error::new_io(e, "http2::handshake_client"))?;
        Engine::start(io, false).await
    }

    pub async fn handshake_server<S>(mut io: S) -> Result<Arc<Engine>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut preface = [0u8; 24];
        io.read_exact(&mut preface)
            .await
            .map_err(|e| Error::new_io(e, "http2::handshake_server"))?;
        if preface != *frame::CONNECTION_PREFACE {
            return Err(Error::invalid_preface().with_where("http2::handshake_server"));
        }
        Engine::start(io, true).await
    }

    async fn start<S>(io: S, is_server: bool) -> Result<Arc<Engine>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut read_half, mut write_half) = tokio::io::split(io);
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Bytes>();

        let local_settings = Settings::default();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel::<IncomingIndex>();
        let shared = Arc::new(Shared {
            writer_tx,
            streams: AsyncMutex::new(HashMap::new()),
            hpack_encoder: AsyncMutex::new(hpack::Encoder::new(hpack::DEFAULT_DYNAMIC_TABLE_SIZE)),
            hpack_decoder: AsyncMutex::new(hpack::Decoder::new(hpack::DEFAULT_DYNAMIC_TABLE_SIZE)),
            local_settings,
            remote_settings: std::sync::Mutex::new(Settings::default()),
            next_stream_id: AtomicU32::new(if is_server { 2 } else { 1 }),
            connection_send_window: std::sync::atomic::AtomicI64::new(DEFAULT_WINDOW as i64),
            connection_recv_window: std::sync::atomic::AtomicI64::new(DEFAULT_WINDOW as i64),
            goaway_received: AtomicBool::new(false),
            goaway_last_stream_id: AtomicU32::new(u32::MAX),
            window_updated: Notify::new(),
            closed: Notify::new(),
            is_server,
            incoming_tx,
            incoming_rx: AsyncMutex::new(incoming_rx),
        });

        tokio::spawn(async move {
            while let Some(bytes) = writer_rx.recv().await {
                if write_half.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        });

        let engine = Arc::new(Engine { shared: shared.clone() });

        let (frame_type, flags, stream_id, payload) = local_settings.encode_frame(0);
        engine.write_frame(frame_type, flags, stream_id, &payload).await;

        tokio::spawn(run_connection(shared, read_half));

        debug!(is_server, "http2 engine started");
        Ok(engine)
    }

    async fn write_frame(&self, frame_type: FrameType, flags: u8, stream_id: u32, payload: &[u8]) {
        let mut out = BytesMut::new();
        frame::encode(&mut out, frame_type, flags, stream_id, payload);
        let _ = self.shared.writer_tx.send(out.freeze());
    }

    fn allocate_stream_id(&self) -> u32 {
        self.shared.next_stream_id.fetch_add(2, Ordering::SeqCst)
    }

    /// Issue a unary request: open a new stream, write HEADERS (with
    /// END_STREAM only if `body` is empty) followed by one DATA frame,
    /// and wait for the response to complete.
    pub async fn send_request(
        self: &Arc<Self>,
        pseudo_headers: Vec<(String, String)>,
        extra_headers: Vec<(String, String)>,
        body: Bytes,
    ) -> Result<Http2Response> {
        if self.goaway_received() {
            return Err(Error::closed().with_where("http2::send_request: connection received GOAWAY"));
        }
        let stream_id = self.allocate_stream_id();
        let (tx, rx) = oneshot::channel();
        {
            let mut streams = self.shared.streams.lock().await;
            streams.insert(
                stream_id,
                StreamEntry {
                    stream: Stream::new(stream_id, DEFAULT_WINDOW, DEFAULT_WINDOW),
                    completion: Some(tx),
                    pending_headers: Vec::new(),
                    trailing_headers: Vec::new(),
                    pending_body: Vec::new(),
                },
            );
        }

        let mut header_list: Vec<(String, String, bool)> = pseudo_headers
            .into_iter()
            .chain(extra_headers)
            .map(|(n, v)| (n, v, false))
            .collect();
        if header_list.is_empty() {
            header_list.push((":method".to_string(), "GET".to_string(), false));
        }

        let end_stream_on_headers = body.is_empty();
        let mut block = BytesMut::new();
        {
            let mut encoder = self.shared.hpack_encoder.lock().await;
            encoder.encode(&header_list, &mut block);
        }
        let mut header_flags = flags::END_HEADERS;
        if end_stream_on_headers {
            header_flags |= flags::END_STREAM;
        }
        self.write_frame(FrameType::Headers, header_flags, stream_id, &block)
            .await;
        {
            let mut streams = self.shared.streams.lock().await;
            if let Some(entry) = streams.get_mut(&stream_id) {
                entry.stream.on_send(end_stream_on_headers)?;
            }
        }

        if !body.is_empty() {
            self.send_data(stream_id, body, true).await?;
        }

        rx.await
            .map_err(|_| Error::closed().with_where("http2::send_request: connection closed before response"))
    }

    /// Open a stream for bidirectional streaming (used by the gRPC layer).
    /// The caller drives outbound frames through the returned handle and
    /// reads inbound events from it.
    pub async fn open_stream(
        self: &Arc<Self>,
        pseudo_headers: Vec<(String, String)>,
        extra_headers: Vec<(String, String)>,
    ) -> Result<StreamHandle> {
        if self.goaway_received() {
            return Err(Error::closed().with_where("http2::open_stream: connection received GOAWAY"));
        }
        let stream_id = self.allocate_stream_id();
        let mut stream = Stream::new(stream_id, DEFAULT_WINDOW, DEFAULT_WINDOW);
        let events = stream.take_receiver().expect("freshly constructed stream has a receiver");
        {
            let mut streams = self.shared.streams.lock().await;
            streams.insert(
                stream_id,
                StreamEntry {
                    stream,
                    completion: None,
                    pending_headers: Vec::new(),
                    trailing_headers: Vec::new(),
                    pending_body: Vec::new(),
                },
            );
        }

        let header_list: Vec<(String, String, bool)> = pseudo_headers
            .into_iter()
            .chain(extra_headers)
            .map(|(n, v)| (n, v, false))
            .collect();
        let mut block = BytesMut::new();
        {
            let mut encoder = self.shared.hpack_encoder.lock().await;
            encoder.encode(&header_list, &mut block);
        }
        self.write_frame(FrameType::Headers, flags::END_HEADERS, stream_id, &block)
            .await;
        {
            let mut streams = self.shared.streams.lock().await;
            if let Some(entry) = streams.get_mut(&stream_id) {
                entry.stream.on_send(false)?;
            }
        }

        Ok(StreamHandle {
            id: stream_id,
            engine: self.clone(),
            events,
        })
    }

    pub async fn send_data(&self, stream_id: u32, data: Bytes, end_stream: bool) -> Result<()> {
        let max_frame_size = self.shared.remote_settings.lock().unwrap().max_frame_size as usize;
        let mut offset = 0;
        while offset < data.len() || (offset == 0 && data.is_empty()) {
            let chunk_len = (data.len() - offset).min(max_frame_size);
            self.acquire_send_window(stream_id, chunk_len as u32).await?;
            let chunk = data.slice(offset..offset + chunk_len);
            let is_last = offset + chunk_len >= data.len();
            let frame_flags = if is_last && end_stream { flags::END_STREAM } else { 0 };
            self.write_frame(FrameType::Data, frame_flags, stream_id, &chunk).await;
            offset += chunk_len;
            if data.is_empty() {
                break;
            }
        }
        if end_stream {
            let mut streams = self.shared.streams.lock().await;
            if let Some(entry) = streams.get_mut(&stream_id) {
                entry.stream.on_send(true)?;
            }
        }
        Ok(())
    }

    /// Waits until both the stream's and the connection's send windows can
    /// cover `n` bytes, debiting both atomically once they can. Stalls on a
    /// `WINDOW_UPDATE` notification rather than erroring, per the engine's
    /// flow-control contract.
    async fn acquire_send_window(&self, stream_id: u32, n: u32) -> Result<()> {
        loop {
            let notified = self.shared.window_updated.notified();
            {
                let mut streams = self.shared.streams.lock().await;
                let entry = streams
                    .get_mut(&stream_id)
                    .ok_or_else(|| Error::not_connected().with_where("http2::send_data: unknown stream"))?;
                let conn_window = self.shared.connection_send_window.load(Ordering::SeqCst);
                if (n as i64) <= entry.stream.send_window && (n as i64) <= conn_window {
                    entry.stream.debit_send(n)?;
                    self.shared
                        .connection_send_window
                        .fetch_sub(n as i64, Ordering::SeqCst);
                    return Ok(());
                }
            }
            if self.goaway_received() {
                return Err(Error::closed().with_where("http2::send_data: connection received GOAWAY"));
            }
            notified.await;
        }
    }

    pub async fn send_rst_stream(&self, stream_id: u32, error_code: u32) {
        let mut payload = BytesMut::new();
        payload.extend_from_slice(&error_code.to_be_bytes());
        self.write_frame(FrameType::RstStream, 0, stream_id, &payload).await;
        let mut streams = self.shared.streams.lock().await;
        if let Some(entry) = streams.remove(&stream_id) {
            entry.stream.deliver(StreamEvent::Reset(error_code));
        }
    }

    pub async fn ping(&self, opaque: [u8; 8]) {
        self.write_frame(FrameType::Ping, 0, 0, &opaque).await;
    }

    /// Graceful shutdown: announce GOAWAY with the last stream id we will
    /// still service.
    pub async fn close(&self) {
        let last_stream_id = self.shared.next_stream_id.load(Ordering::SeqCst).saturating_sub(2);
        let mut payload = BytesMut::new();
        payload.extend_from_slice(&(last_stream_id & 0x7FFF_FFFF).to_be_bytes());
        payload.extend_from_slice(&0u32.to_be_bytes()); // NO_ERROR
        self.write_frame(FrameType::GoAway, 0, 0, &payload).await;
        self.shared.closed.notify_waiters();
    }

    pub async fn wait_closed(&self) {
        self.shared.closed.notified().await;
    }

    pub fn goaway_received(&self) -> bool {
        self.shared.goaway_received.load(Ordering::SeqCst)
    }

    pub fn is_server(&self) -> bool {
        self.shared.is_server
    }

    /// Wait for the next peer-initiated stream (server side only). Used by
    /// the gRPC service registry to route each new stream by `:path`.
    pub async fn accept_stream(&self) -> Option<IncomingStream> {
        let stream_id = self.shared.incoming_rx.lock().await.recv().await?;
        let mut streams = self.shared.streams.lock().await;
        let entry = streams.get_mut(&stream_id)?;
        let events = entry.stream.take_receiver()?;
        let headers = entry.pending_headers.clone();
        Some(IncomingStream {
            id: stream_id,
            headers,
            events,
        })
    }

    /// Write HEADERS for a response (or trailers, via `end_stream`) on an
    /// already-open stream.
    pub async fn send_headers(&self, stream_id: u32, headers: Vec<(String, String)>, end_stream: bool) -> Result<()> {
        let header_list: Vec<(String, String, bool)> = headers.into_iter().map(|(n, v)| (n, v, false)).collect();
        let mut block = BytesMut::new();
        {
            let mut encoder = self.shared.hpack_encoder.lock().await;
            encoder.encode(&header_list, &mut block);
        }
        let mut header_flags = flags::END_HEADERS;
        if end_stream {
            header_flags |= flags::END_STREAM;
        }
        self.write_frame(FrameType::Headers, header_flags, stream_id, &block).await;
        let mut streams = self.shared.streams.lock().await;
        if let Some(entry) = streams.get_mut(&stream_id) {
            entry.stream.on_send(end_stream)?;
        }
        Ok(())
    }
}

/// Drives the read side of one connection: reads frames off `io` and
/// dispatches them against `shared` until EOF, GOAWAY, or a protocol error.
pub(crate) async fn run_connection<S>(shared: Arc<Shared>, mut io: S)
where
    S: AsyncRead + Unpin + Send,
{
    let mut buf = BytesMut::with_capacity(16 * 1024);
    let mut chunk = vec![0u8; 16 * 1024];
    loop {
        match frame::decode(&mut buf, shared.local_settings.max_frame_size) {
            Ok(Some(f)) => {
                if let Err(_err) = dispatch(&shared, f).await {
                    break;
                }
                continue;
            }
            Ok(None) => {}
            Err(_) => break,
        }
        match io.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(_) => break,
        }
    }
    let mut streams = shared.streams.lock().await;
    for (_, entry) in streams.drain() {
        entry.stream.reset();
    }
    shared.closed.notify_waiters();
}

async fn dispatch(shared: &Arc<Shared>, f: Frame) -> Result<()> {
    match f.frame_type {
        FrameType::Settings => {
            if f.has_flag(flags::ACK) {
                return Ok(());
            }
            let params = settings::decode_params(f.payload)?;
            apply_remote_settings(shared, &params).await;
            let ack = Settings::ack_frame();
            write_raw(shared, ack.0, ack.1, ack.2, &ack.3).await;
        }
        FrameType::WindowUpdate => {
            if f.payload.len() != 4 {
                return Err(Error::invalid_frame().with_where("http2::dispatch: bad WINDOW_UPDATE"));
            }
            let increment = u32::from_be_bytes([f.payload[0], f.payload[1], f.payload[2], f.payload[3]])
                & 0x7FFF_FFFF;
            if increment == 0 {
                return Err(Error::invalid_frame().with_where("http2::dispatch: zero WINDOW_UPDATE"));
            }
            if f.stream_id == 0 {
                shared
                    .connection_send_window
                    .fetch_add(increment as i64, Ordering::SeqCst);
            } else {
                let mut streams = shared.streams.lock().await;
                if let Some(entry) = streams.get_mut(&f.stream_id) {
                    entry.stream.apply_send_increment(increment)?;
                }
            }
            shared.window_updated.notify_waiters();
        }
        FrameType::Headers => {
            let end_stream = f.has_flag(flags::END_STREAM);
            let headers = {
                let mut decoder = shared.hpack_decoder.lock().await;
                decoder.decode(&f.payload)?
            };
            let mut streams = shared.streams.lock().await;
            let is_new = !streams.contains_key(&f.stream_id);
            let entry = streams.entry(f.stream_id).or_insert_with(|| StreamEntry {
                stream: Stream::new(f.stream_id, DEFAULT_WINDOW, DEFAULT_WINDOW),
                completion: None,
                pending_headers: Vec::new(),
                trailing_headers: Vec::new(),
                pending_body: Vec::new(),
            });
            entry.stream.on_receive(end_stream)?;
            if is_new && shared.is_server {
                let _ = shared.incoming_tx.send(f.stream_id);
            }
            if entry.pending_headers.is_empty() {
                entry.pending_headers = headers.clone();
            } else {
                entry.trailing_headers = headers.clone();
            }
            entry.stream.deliver(StreamEvent::Headers(headers));
            if end_stream {
                complete_if_ready(&mut streams, f.stream_id);
            }
        }
        FrameType::Data => {
            let n = f.payload.len() as u32;
            let end_stream = f.has_flag(flags::END_STREAM);
            let mut streams = shared.streams.lock().await;
            if let Some(entry) = streams.get_mut(&f.stream_id) {
                entry.stream.debit_recv(n)?;
                entry.pending_body.extend_from_slice(&f.payload);
                entry.stream.deliver(StreamEvent::Data(f.payload.clone()));
                entry.stream.on_receive(end_stream)?;
                if entry.stream.recv_window < WINDOW_REFRESH_THRESHOLD {
                    let increment = DEFAULT_WINDOW as i64 - entry.stream.recv_window;
                    if increment > 0 {
                        entry.stream.credit_recv(increment as u32);
                        let mut payload = BytesMut::new();
                        payload.extend_from_slice(&(increment as u32).to_be_bytes());
                        write_raw(shared, FrameType::WindowUpdate, 0, f.stream_id, &payload).await;
                    }
                }
            }
            let conn_recv = shared.connection_recv_window.fetch_sub(n as i64, Ordering::SeqCst) - n as i64;
            if conn_recv < WINDOW_REFRESH_THRESHOLD {
                let increment = DEFAULT_WINDOW as i64 - conn_recv;
                if increment > 0 {
                    shared
                        .connection_recv_window
                        .fetch_add(increment, Ordering::SeqCst);
                    let mut payload = BytesMut::new();
                    payload.extend_from_slice(&(increment as u32).to_be_bytes());
                    write_raw(shared, FrameType::WindowUpdate, 0, 0, &payload).await;
                }
            }
            if end_stream {
                if let Some(entry) = streams.get_mut(&f.stream_id) {
                    entry.stream.deliver(StreamEvent::Eof);
                }
                complete_if_ready(&mut streams, f.stream_id);
            }
        }
        FrameType::RstStream => {
            trace!(stream_id = f.stream_id, "http2 rst_stream received");
            let mut streams = shared.streams.lock().await;
            if let Some(mut entry) = streams.remove(&f.stream_id) {
                entry.stream.reset();
                entry.stream.deliver(StreamEvent::Reset(0));
            }
        }
        FrameType::GoAway => {
            if f.payload.len() < 8 {
                return Err(Error::invalid_frame().with_where("http2::dispatch: bad GOAWAY"));
            }
            let last_stream_id = u32::from_be_bytes([f.payload[0], f.payload[1], f.payload[2], f.payload[3]])
                & 0x7FFF_FFFF;
            let error_code = u32::from_be_bytes([f.payload[4], f.payload[5], f.payload[6], f.payload[7]]);
            let debug_data = String::from_utf8_lossy(&f.payload[8..]).into_owned();
            warn!(last_stream_id, error_code, debug_data = %debug_data, "http2 goaway received");
            shared.goaway_received.store(true, Ordering::SeqCst);
            shared.goaway_last_stream_id.store(last_stream_id, Ordering::SeqCst);

            let mut streams = shared.streams.lock().await;
            let stale: Vec<u32> = streams
                .keys()
                .copied()
                .filter(|id| *id > last_stream_id)
                .collect();
            for id in stale {
                if let Some(mut entry) = streams.remove(&id) {
                    entry.stream.reset();
                    entry.stream.deliver(StreamEvent::Reset(error_code));
                }
            }
            drop(streams);
            shared.window_updated.notify_waiters();
        }
        FrameType::Ping => {
            if !f.has_flag(flags::ACK) {
                write_raw(shared, FrameType::Ping, flags::ACK, 0, &f.payload).await;
            }
        }
        FrameType::Priority | FrameType::PushPromise | FrameType::Continuation => {
            // Priority hints and server push are accepted but not acted on;
            // CONTINUATION-split header blocks are out of scope for the
            // frame sizes this engine negotiates.
        }
        FrameType::Unknown(_) => {
            // RFC 7540 §4.1: implementations MUST ignore unrecognized frame types.
        }
    }
    Ok(())
}

fn complete_if_ready(streams: &mut HashMap<u32, StreamEntry>, stream_id: u32) {
    if let Some(entry) = streams.get_mut(&stream_id) {
        if entry.stream.state() == StreamState::Closed || entry.stream.state() == StreamState::HalfClosedRemote {
            if let Some(tx) = entry.completion.take() {
                let status = entry
                    .pending_headers
                    .iter()
                    .find(|(n, _)| n == ":status")
                    .and_then(|(_, v)| v.parse::<u16>().ok())
                    .unwrap_or(0);
                let mut headers = entry.pending_headers.clone();
                headers.extend(entry.trailing_headers.iter().cloned());
                let _ = tx.send(Http2Response {
                    status,
                    headers,
                    body: entry.pending_body.clone(),
                });
            }
        }
    }
}

async fn apply_remote_settings(shared: &Arc<Shared>, params: &[Param]) {
    let mut remote = shared.remote_settings.lock().unwrap();
    let previous_window = remote.initial_window_size;
    remote.apply(params);
    let new_window = remote.initial_window_size;
    let header_table_size = remote.header_table_size;
    drop(remote);

    if new_window != previous_window {
        let delta = new_window as i64 - previous_window as i64;
        let mut streams = shared.streams.lock().await;
        for entry in streams.values_mut() {
            if entry.stream.state() != StreamState::Closed {
                entry.stream.send_window += delta;
            }
        }
        drop(streams);
        if delta > 0 {
            shared.window_updated.notify_waiters();
        }
    }
    let mut encoder = shared.hpack_encoder.lock().await;
    encoder.set_max_dynamic_table_size(header_table_size as usize);
}

async fn write_raw(shared: &Arc<Shared>, frame_type: FrameType, flags: u8, stream_id: u32, payload: &[u8]) {
    let mut out = BytesMut::new();
    frame::encode(&mut out, frame_type, flags, stream_id, payload);
    let _ = shared.writer_tx.send(out.freeze());
}
