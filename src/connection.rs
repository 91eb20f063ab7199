//! Per-connection state machine: stream registry, SETTINGS/PING/GOAWAY
//! handling, frame routing, and error classification (§4.5).
//!
//! Grounded on `H2Codec::process`'s buffer-accumulate-then-parse loop and
//! its `parse_frame` dispatch, generalized from "return one flat event per
//! frame" to "route by stream id, mutate the registry, emit structured
//! events" per §2's data-flow description. The cyclic Connection<->Stream
//! reference the base spec's §9 design note warns about is avoided the
//! same way `h2_codec.rs` avoids it: `Connection` exclusively owns
//! `streams`, and [`StreamHandle`] is a short-lived borrow (id + `&mut
//! Connection`), never a pointer stored on `Stream` itself.
//!
//! Outbound wire bytes are not folded into the `Event` stream (unlike the
//! distilled spec's literal "frame" event): they are buffered internally
//! and drained with [`Connection::take_outbound`], mirroring how
//! `rustls`-style sans-I/O engines separate "what happened" from "what to
//! write next". This keeps `Result<Vec<Event>, H2Error>` meaningful even
//! on a connection error, since the terminal RST_STREAM(0, code) is still
//! sitting in the outbound buffer for the embedder to flush before tearing
//! the transport down.

use std::collections::{HashMap, VecDeque};

use crate::error::{ErrorCode, H2Error};
use crate::flow::{FlowController, Window};
use crate::frame::{
    settings_id, ContinuationFlags, Frame, Framer, HeadersFlags, PingFlags,
    SettingsFlags, StreamId, CONNECTION_PREFACE, DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_PRIORITY,
};
use crate::hpack::{H2Header, HpackDecoder, HpackEncoder};
use crate::stream::{ClosedCause, LifecycleEvent, Stream, StreamState, Trigger};

/// Cap on an accumulated HEADERS + CONTINUATION* block, guarding against
/// unbounded memory growth from a CONTINUATION flood. Carried over from
/// the teacher's identical guard in `h2_codec.rs`.
pub const MAX_HEADER_BLOCK_SIZE: usize = 256 * 1024;

/// How many locally-reset stream ids stay recognizable after their
/// `Stream` is removed from the registry, so a PUSH_PROMISE whose parent
/// was just reset can still be answered with `REFUSED_STREAM` instead of
/// a connection error (§4.5's PUSH_PROMISE handling).
const RESET_STREAM_HISTORY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connected,
    Draining,
    Closed,
}

/// Settings an embedder wants to advertise to the peer (§6's `settings(map)`
/// and the "Configuration" section of SPEC_FULL.md — the only
/// configuration surface this sans-I/O engine has).
#[derive(Debug, Clone, Copy, Default)]
pub struct Settings {
    pub max_concurrent_streams: Option<u32>,
    pub initial_window_size: Option<u32>,
    pub flow_control_options: Option<u8>,
}

impl Settings {
    fn to_params(self) -> Vec<(u32, u32)> {
        let mut params = Vec::new();
        if let Some(v) = self.max_concurrent_streams {
            params.push((settings_id::MAX_CONCURRENT_STREAMS, v));
        }
        if let Some(v) = self.initial_window_size {
            params.push((settings_id::INITIAL_WINDOW_SIZE, v));
        }
        if let Some(v) = self.flow_control_options {
            params.push((settings_id::FLOW_CONTROL_OPTIONS, v as u32));
        }
        params
    }
}

/// Structured events observable to the embedder (§4.4, §6).
#[derive(Debug, Clone)]
pub enum Event {
    FrameSent(Frame),
    FrameReceived(Frame),
    /// A new peer-initiated stream appeared (server: new request; either
    /// role: unexpected but parity-valid frame on an unknown id).
    NewStream(StreamId),
    /// A new pushed stream was promised by the peer.
    Promise { parent_stream_id: StreamId, promised_stream_id: StreamId },
    Headers { stream_id: StreamId, headers: Vec<H2Header>, end_stream: bool },
    Data { stream_id: StreamId, data: Vec<u8>, end_stream: bool },
    Active(StreamId),
    HalfClose(StreamId),
    StreamClosed { stream_id: StreamId, cause: ClosedCause },
    Priority { stream_id: StreamId, priority: u32 },
    Window { stream_id: StreamId, window: Window },
    GoAway { last_stream_id: StreamId, error_code: ErrorCode, debug_data: Vec<u8> },
    PingAck([u8; 8]),
}

#[derive(Debug, Clone)]
struct PendingHeaderBlock {
    stream_id: StreamId,
    end_stream: bool,
    buffer: Vec<u8>,
    kind: HeaderBlockKind,
    /// Lifecycle events (half_close/close) produced by the triggering
    /// HEADERS frame, held back until the `headers` content event fires so
    /// observers always see active -> headers -> half_close in that order
    /// (§9's "event order is deterministic" contract), even when the block
    /// spans CONTINUATION frames.
    deferred: Vec<LifecycleEvent>,
}

#[derive(Debug, Clone, Copy)]
enum HeaderBlockKind {
    Headers,
    PushPromise { parent_stream_id: StreamId, promised_stream_id: StreamId, refused: bool },
}

/// Splits the lifecycle events a HEADERS frame's trigger produced into
/// those that must be observed before the `headers` content event
/// (`Active`) and those that must come after (`HalfClose`, `Closed`,
/// `Priority`).
fn split_lifecycle(lifecycle: Vec<LifecycleEvent>) -> (Vec<LifecycleEvent>, Vec<LifecycleEvent>) {
    lifecycle.into_iter().partition(|ev| matches!(ev, LifecycleEvent::Active))
}

/// The per-connection state machine (§3's "Connection", §4.5).
pub struct Connection {
    role: Role,
    next_stream_id: StreamId,
    last_peer_stream_id: StreamId,
    stream_limit: u32,
    active_stream_count: u32,
    streams: HashMap<StreamId, Stream>,
    receive_window: Window,
    flow: FlowController,
    initial_window_size: u32,
    state: ConnectionState,
    last_error: Option<H2Error>,
    inbound: Vec<u8>,
    outbound: Vec<u8>,
    preface_sent: bool,
    preface_consumed: bool,
    pending_header_block: Option<PendingHeaderBlock>,
    /// Bounded FIFO of stream ids this endpoint reset and has since
    /// evicted from `streams`, so PUSH_PROMISE's `local_rst` parent check
    /// still has something to look at after the registry entry is gone.
    locally_reset: VecDeque<StreamId>,
    goaway_last_stream_id: Option<StreamId>,
    local_settings: Settings,
    hpack_encoder: HpackEncoder,
    hpack_decoder: HpackDecoder,
}

impl Connection {
    pub fn new(role: Role) -> Self {
        Self::with_settings(role, Settings::default())
    }

    pub fn with_settings(role: Role, local_settings: Settings) -> Self {
        Connection {
            role,
            next_stream_id: if role == Role::Client { 1 } else { 2 },
            last_peer_stream_id: 0,
            stream_limit: u32::MAX,
            active_stream_count: 0,
            streams: HashMap::new(),
            receive_window: Window::Bounded(DEFAULT_INITIAL_WINDOW_SIZE as i64),
            flow: FlowController::new(DEFAULT_INITIAL_WINDOW_SIZE as i64),
            initial_window_size: DEFAULT_INITIAL_WINDOW_SIZE,
            state: ConnectionState::New,
            last_error: None,
            inbound: Vec::new(),
            outbound: Vec::new(),
            preface_sent: false,
            preface_consumed: role != Role::Server,
            pending_header_block: None,
            locally_reset: VecDeque::new(),
            goaway_last_stream_id: None,
            local_settings,
            hpack_encoder: HpackEncoder::new(),
            hpack_decoder: HpackDecoder::new(),
        }
    }

    // -- observable properties (§6) -----------------------------------

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn window(&self) -> Window {
        self.flow.connection_window
    }

    pub fn buffered_amount(&self) -> usize {
        self.flow.buffered_amount()
    }

    pub fn error(&self) -> Option<&H2Error> {
        self.last_error.as_ref()
    }

    pub fn active_stream_count(&self) -> u32 {
        self.active_stream_count
    }

    pub fn stream_limit(&self) -> u32 {
        self.stream_limit
    }

    pub fn goaway_last_stream_id(&self) -> Option<StreamId> {
        self.goaway_last_stream_id
    }

    /// Drain bytes accumulated for the transport since the last call.
    pub fn take_outbound(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbound)
    }

    /// Borrow a handle for per-stream operations (§6's "Per Stream"
    /// surface), or `None` if `id` is not a known stream.
    pub fn stream(&mut self, id: StreamId) -> Option<StreamHandle<'_>> {
        if self.streams.contains_key(&id) {
            Some(StreamHandle { conn: self, id })
        } else {
            None
        }
    }

    // -- outbound connection operations (§6) ---------------------------

    pub fn new_stream(&mut self, priority: Option<u32>) -> Result<StreamId, H2Error> {
        if self.state == ConnectionState::Closed {
            return Err(H2Error::connection(ErrorCode::InternalError, "connection is closed"));
        }
        if self.active_stream_count >= self.stream_limit {
            return Err(H2Error::connection(ErrorCode::RefusedStream, "stream limit reached"));
        }
        let id = self.next_stream_id;
        self.next_stream_id += 2;
        let window = Window::Bounded(self.initial_window_size as i64);
        self.streams.insert(id, Stream::new(id, priority.unwrap_or(DEFAULT_PRIORITY), window));
        Ok(id)
    }

    pub fn ping(&mut self, payload: [u8; 8]) -> Vec<Event> {
        let mut events = Vec::new();
        self.emit(&Frame::Ping { flags: PingFlags { ack: false }, payload }, &mut events);
        events
    }

    pub fn goaway(&mut self, error_code: ErrorCode, debug_data: Vec<u8>) -> Vec<Event> {
        let mut events = Vec::new();
        let last_stream_id = self.last_peer_stream_id;
        self.emit(&Frame::GoAway { last_stream_id, error_code, debug_data }, &mut events);
        self.state = ConnectionState::Draining;
        events
    }

    pub fn settings(&mut self, settings: Settings) -> Vec<Event> {
        let mut events = Vec::new();
        self.emit(
            &Frame::Settings { flags: SettingsFlags::default(), params: settings.to_params() },
            &mut events,
        );
        events
    }

    pub fn window_update(&mut self, increment: u32) -> Result<Vec<Event>, H2Error> {
        if increment == 0 {
            return Err(H2Error::connection(ErrorCode::ProtocolError, "connection WINDOW_UPDATE increment of 0"));
        }
        self.receive_window.adjust(increment as i64);
        let mut events = Vec::new();
        self.emit(&Frame::WindowUpdate { stream_id: 0, increment }, &mut events);
        Ok(events)
    }

    // -- outbound per-stream operations, forwarded from StreamHandle ---

    fn stream_headers(&mut self, id: StreamId, headers: &[H2Header], end_stream: bool) -> Result<Vec<Event>, H2Error> {
        self.require_local_stream(id)?;
        let mut events = Vec::new();
        self.apply_stream_trigger(id, Trigger::SendHeaders { end_stream }, &mut events)?;
        let header_block = self.hpack_encoder.encode(headers);
        let flags = HeadersFlags { end_stream, end_headers: true, priority: false };
        self.emit(&Frame::Headers { stream_id: id, flags, priority: None, header_block }, &mut events);
        Ok(events)
    }

    fn stream_data(&mut self, id: StreamId, data: &[u8], end_stream: bool) -> Result<Vec<Event>, H2Error> {
        self.require_local_stream(id)?;
        // Probe the trigger against a clone first so an illegal SendData
        // (e.g. the local side is already closed) fails before any bytes
        // reach the wire. Once it's known legal, queue/drain against flow
        // control while the stream's send_window is still in the registry,
        // then apply the trigger for real — reversing that order would let
        // a same-call stream closure evict the window entry before drain()
        // ever sees it.
        self.streams[&id].clone().apply(Trigger::SendData { end_stream })?;

        let mut events = Vec::new();
        let frames = self.submit_data_frame(id, data.to_vec(), end_stream);
        for frame in &frames {
            self.emit(frame, &mut events);
        }
        self.apply_stream_trigger(id, Trigger::SendData { end_stream }, &mut events)?;
        Ok(events)
    }

    fn stream_set_priority(&mut self, id: StreamId, priority: u32) -> Result<Vec<Event>, H2Error> {
        self.require_local_stream(id)?;
        let mut events = Vec::new();
        let lifecycle = self.streams.get_mut(&id).unwrap().set_priority(priority);
        self.handle_lifecycle_events(id, vec![lifecycle], &mut events);
        self.emit(&Frame::Priority { stream_id: id, priority }, &mut events);
        Ok(events)
    }

    fn stream_window_update(&mut self, id: StreamId, increment: u32) -> Result<Vec<Event>, H2Error> {
        self.require_local_stream(id)?;
        let mut events = Vec::new();
        self.emit(&Frame::WindowUpdate { stream_id: id, increment }, &mut events);
        Ok(events)
    }

    fn stream_close(&mut self, id: StreamId, error: Option<ErrorCode>) -> Result<Vec<Event>, H2Error> {
        self.require_local_stream(id)?;
        let mut events = Vec::new();
        let code = error.unwrap_or(ErrorCode::Cancel);
        let lifecycle = self.streams.get_mut(&id).unwrap().force_reset();
        self.handle_lifecycle_events(id, lifecycle, &mut events);
        self.emit(&Frame::RstStream { stream_id: id, error_code: code }, &mut events);
        Ok(events)
    }

    fn require_local_stream(&self, id: StreamId) -> Result<(), H2Error> {
        if self.streams.contains_key(&id) {
            Ok(())
        } else {
            Err(H2Error::connection(ErrorCode::InternalError, format!("unknown stream {id}")))
        }
    }

    // -- inbound processing (§4.5) -------------------------------------

    /// Append `bytes` to the inbound buffer and process every complete
    /// frame now available.
    pub fn receive(&mut self, bytes: &[u8]) -> Result<Vec<Event>, H2Error> {
        if self.state == ConnectionState::Closed {
            return Ok(Vec::new());
        }
        self.inbound.extend_from_slice(bytes);
        let mut events = Vec::new();

        if self.role == Role::Server && !self.preface_consumed {
            if self.inbound.len() < CONNECTION_PREFACE.len() {
                return Ok(events);
            }
            if &self.inbound[..CONNECTION_PREFACE.len()] != CONNECTION_PREFACE {
                let err = H2Error::connection(ErrorCode::ProtocolError, "missing connection preface");
                return Err(self.fail(err));
            }
            self.inbound.drain(..CONNECTION_PREFACE.len());
            self.preface_consumed = true;
        }

        loop {
            let parsed = match Framer::parse(&self.inbound) {
                Ok(Some(v)) => v,
                Ok(None) => break,
                Err(e) => return Err(self.fail(e)),
            };
            let (frame, consumed) = parsed;
            self.inbound.drain(..consumed);
            events.push(Event::FrameReceived(frame.clone()));

            if let Err(e) = self.dispatch(frame, &mut events) {
                if e.is_connection_error() {
                    return Err(self.fail(e));
                }
                self.reset_stream_due_to_error(&e, &mut events);
            }
            if self.state == ConnectionState::Closed {
                break;
            }
        }
        Ok(events)
    }

    fn dispatch(&mut self, frame: Frame, events: &mut Vec<Event>) -> Result<(), H2Error> {
        if let Some(pending) = &self.pending_header_block {
            let continues_pending =
                matches!(&frame, Frame::Continuation { stream_id, .. } if *stream_id == pending.stream_id);
            if !continues_pending {
                return Err(H2Error::connection(
                    ErrorCode::ProtocolError,
                    "frame interleaved between a HEADERS/PUSH_PROMISE and its CONTINUATION",
                ));
            }
        }

        let stream_id = frame.stream_id();
        if stream_id == 0 || matches!(frame, Frame::Settings { .. }) {
            self.connection_management(frame, events)
        } else if self.state == ConnectionState::New {
            Err(H2Error::connection(
                ErrorCode::ProtocolError,
                "stream frame received before the connection's initial SETTINGS",
            ))
        } else {
            self.stream_dispatch(frame, events)
        }
    }

    fn connection_management(&mut self, frame: Frame, events: &mut Vec<Event>) -> Result<(), H2Error> {
        if self.state == ConnectionState::New {
            return match frame {
                Frame::Settings { flags, params } if !flags.ack => {
                    self.apply_settings(&params, events)?;
                    self.state = ConnectionState::Connected;
                    let reply = Frame::Settings {
                        flags: SettingsFlags::default(),
                        params: self.local_settings.to_params(),
                    };
                    self.emit(&reply, events);
                    Ok(())
                }
                _ => Err(H2Error::connection(ErrorCode::ProtocolError, "expected SETTINGS to open the connection")),
            };
        }

        match frame {
            Frame::Settings { flags, params } => {
                if !flags.ack {
                    self.apply_settings(&params, events)?;
                }
                Ok(())
            }
            Frame::WindowUpdate { increment, .. } => {
                if increment == 0 {
                    return Err(H2Error::connection(ErrorCode::ProtocolError, "connection WINDOW_UPDATE increment of 0"));
                }
                self.flow.flow_control_allowed()?;
                self.flow.connection_window.adjust(increment as i64);
                let frames = self.run_drain();
                for f in &frames {
                    self.emit(f, events);
                }
                Ok(())
            }
            Frame::Ping { flags, payload } => {
                if flags.ack {
                    events.push(Event::PingAck(payload));
                } else {
                    self.emit(&Frame::Ping { flags: PingFlags { ack: true }, payload }, events);
                }
                Ok(())
            }
            Frame::GoAway { last_stream_id, error_code, debug_data } => {
                self.goaway_last_stream_id = Some(last_stream_id);
                self.state = ConnectionState::Draining;
                events.push(Event::GoAway { last_stream_id, error_code, debug_data });
                Ok(())
            }
            other => Err(H2Error::connection(
                ErrorCode::ProtocolError,
                format!("frame type not valid on stream 0: {other:?}"),
            )),
        }
    }

    fn stream_dispatch(&mut self, frame: Frame, events: &mut Vec<Event>) -> Result<(), H2Error> {
        match frame {
            Frame::Data { stream_id, flags, payload } => {
                self.get_or_create_stream(stream_id, events)?;
                let stream = self.streams.get_mut(&stream_id).expect("stream must exist before a trigger is applied");
                let lifecycle = stream.apply(Trigger::RecvData { end_stream: flags.end_stream })?;
                let (before, after) = split_lifecycle(lifecycle);
                self.handle_lifecycle_events(stream_id, before, events);
                self.receive_window.adjust(-(payload.len() as i64));
                events.push(Event::Data { stream_id, data: payload, end_stream: flags.end_stream });
                self.handle_lifecycle_events(stream_id, after, events);
                Ok(())
            }
            Frame::Headers { stream_id, flags, priority, header_block } => {
                self.get_or_create_stream(stream_id, events)?;
                if let Some(p) = priority {
                    let lifecycle = self.streams.get_mut(&stream_id).unwrap().set_priority(p);
                    self.handle_lifecycle_events(stream_id, vec![lifecycle], events);
                }
                let stream = self.streams.get_mut(&stream_id).expect("stream must exist before a trigger is applied");
                let lifecycle = stream.apply(Trigger::RecvHeaders { end_stream: flags.end_stream })?;
                let (before, after) = split_lifecycle(lifecycle);
                self.handle_lifecycle_events(stream_id, before, events);
                if flags.end_headers {
                    let headers = self.decode_headers(&header_block)?;
                    events.push(Event::Headers { stream_id, headers, end_stream: flags.end_stream });
                    self.handle_lifecycle_events(stream_id, after, events);
                } else {
                    if header_block.len() > MAX_HEADER_BLOCK_SIZE {
                        return Err(H2Error::connection(ErrorCode::FrameSizeError, "header block too large"));
                    }
                    self.pending_header_block = Some(PendingHeaderBlock {
                        stream_id,
                        end_stream: flags.end_stream,
                        buffer: header_block,
                        kind: HeaderBlockKind::Headers,
                        deferred: after,
                    });
                }
                Ok(())
            }
            Frame::Continuation { stream_id, flags, header_block } => {
                self.handle_continuation(stream_id, flags, header_block, events)
            }
            Frame::Priority { stream_id, priority } => {
                self.get_or_create_stream(stream_id, events)?;
                let lifecycle = self.streams.get_mut(&stream_id).unwrap().set_priority(priority);
                self.handle_lifecycle_events(stream_id, vec![lifecycle], events);
                Ok(())
            }
            Frame::RstStream { stream_id, error_code } => {
                if stream_id == 0 {
                    return Err(H2Error::connection(ErrorCode::ProtocolError, "RST_STREAM on stream 0"));
                }
                let _ = error_code;
                self.get_or_create_stream(stream_id, events)?;
                self.apply_stream_trigger(stream_id, Trigger::RecvRstStream, events)
            }
            Frame::WindowUpdate { stream_id, increment } => {
                self.get_or_create_stream(stream_id, events)?;
                if increment == 0 {
                    return Err(H2Error::stream(stream_id, ErrorCode::ProtocolError, "stream WINDOW_UPDATE increment of 0"));
                }
                self.flow.flow_control_allowed()?;
                self.streams.get_mut(&stream_id).unwrap().send_window.adjust(increment as i64);
                let frames = self.run_drain();
                for f in &frames {
                    self.emit(f, events);
                }
                let window = self.streams.get(&stream_id).map(|s| s.send_window).unwrap_or(Window::Bounded(0));
                events.push(Event::Window { stream_id, window });
                Ok(())
            }
            Frame::PushPromise { stream_id: parent_id, flags, promised_stream_id, header_block } => {
                self.handle_push_promise(parent_id, flags.end_push_promise, promised_stream_id, header_block, events)
            }
            Frame::Settings { .. } => unreachable!("SETTINGS always routes through connection_management"),
            Frame::Ping { .. } => unreachable!("PING always routes through connection_management"),
            Frame::GoAway { .. } => unreachable!("GOAWAY always routes through connection_management"),
        }
    }

    fn handle_push_promise(
        &mut self,
        parent_id: StreamId,
        end_push_promise: bool,
        promised_stream_id: StreamId,
        header_block: Vec<u8>,
        events: &mut Vec<Event>,
    ) -> Result<(), H2Error> {
        let parent = self.streams.get(&parent_id).map(|p| (p.state, p.closed_cause));
        let refused = matches!(parent, Some((StreamState::Closed, ClosedCause::LocalRst)))
            || (parent.is_none() && self.was_locally_reset(parent_id));
        if !refused {
            match parent {
                None => return Err(H2Error::connection(ErrorCode::ProtocolError, "PUSH_PROMISE parent stream does not exist")),
                Some((state, _)) if !matches!(state, StreamState::Open | StreamState::HalfClosedLocal) => {
                    return Err(H2Error::connection(
                        ErrorCode::ProtocolError,
                        "PUSH_PROMISE parent stream is not open or half_closed_local",
                    ));
                }
                _ => {}
            }
        }
        if promised_stream_id % 2 != 0 {
            return Err(H2Error::connection(ErrorCode::ProtocolError, "promised stream id must be server-initiated"));
        }
        if self.streams.contains_key(&promised_stream_id) {
            return Err(H2Error::connection(ErrorCode::ProtocolError, "promised stream id is not idle"));
        }

        if end_push_promise {
            self.finish_push_promise(parent_id, promised_stream_id, refused, header_block, events)
        } else {
            if header_block.len() > MAX_HEADER_BLOCK_SIZE {
                return Err(H2Error::connection(ErrorCode::FrameSizeError, "header block too large"));
            }
            self.pending_header_block = Some(PendingHeaderBlock {
                stream_id: parent_id,
                end_stream: false,
                buffer: header_block,
                kind: HeaderBlockKind::PushPromise { parent_stream_id: parent_id, promised_stream_id, refused },
                deferred: Vec::new(),
            });
            Ok(())
        }
    }

    fn handle_continuation(
        &mut self,
        stream_id: StreamId,
        flags: ContinuationFlags,
        header_block: Vec<u8>,
        events: &mut Vec<Event>,
    ) -> Result<(), H2Error> {
        let Some(mut pending) = self.pending_header_block.take() else {
            return Err(H2Error::connection(ErrorCode::ProtocolError, "unexpected CONTINUATION frame"));
        };
        debug_assert_eq!(pending.stream_id, stream_id);

        let new_len = pending.buffer.len() + header_block.len();
        if new_len > MAX_HEADER_BLOCK_SIZE {
            return Err(H2Error::connection(ErrorCode::FrameSizeError, "header block too large"));
        }
        pending.buffer.extend_from_slice(&header_block);

        if !flags.end_headers {
            self.pending_header_block = Some(pending);
            return Ok(());
        }

        match pending.kind {
            HeaderBlockKind::Headers => {
                let headers = self.decode_headers(&pending.buffer)?;
                events.push(Event::Headers { stream_id: pending.stream_id, headers, end_stream: pending.end_stream });
                self.handle_lifecycle_events(pending.stream_id, pending.deferred, events);
                Ok(())
            }
            HeaderBlockKind::PushPromise { parent_stream_id, promised_stream_id, refused } => {
                self.finish_push_promise(parent_stream_id, promised_stream_id, refused, pending.buffer, events)
            }
        }
    }

    fn finish_push_promise(
        &mut self,
        parent_stream_id: StreamId,
        promised_stream_id: StreamId,
        refused: bool,
        header_block: Vec<u8>,
        events: &mut Vec<Event>,
    ) -> Result<(), H2Error> {
        // Reassembly happens unconditionally so the shared HPACK decoder
        // context stays in sync even when the promise is about to be
        // refused (base spec Open Question (a)).
        let headers = self.decode_headers(&header_block)?;
        if refused {
            self.emit(&Frame::RstStream { stream_id: promised_stream_id, error_code: ErrorCode::RefusedStream }, events);
            return Ok(());
        }
        let window = Window::Bounded(self.initial_window_size as i64);
        self.streams.insert(promised_stream_id, Stream::new(promised_stream_id, DEFAULT_PRIORITY, window));
        self.apply_stream_trigger(promised_stream_id, Trigger::RecvPushPromise, events)?;
        events.push(Event::Promise { parent_stream_id, promised_stream_id });
        events.push(Event::Headers { stream_id: promised_stream_id, headers, end_stream: false });
        Ok(())
    }

    fn decode_headers(&mut self, header_block: &[u8]) -> Result<Vec<H2Header>, H2Error> {
        self.hpack_decoder
            .decode(header_block)
            .map_err(|e| H2Error::connection(ErrorCode::CompressionError, e))
    }

    fn apply_settings(&mut self, params: &[(u32, u32)], events: &mut Vec<Event>) -> Result<(), H2Error> {
        for &(key, value) in params {
            match key {
                settings_id::MAX_CONCURRENT_STREAMS => self.stream_limit = value,
                settings_id::INITIAL_WINDOW_SIZE => {
                    self.flow.flow_control_allowed()?;
                    let delta = value as i64 - self.initial_window_size as i64;
                    self.initial_window_size = value;
                    self.flow.connection_window.adjust(delta);
                    let ids: Vec<StreamId> = self.streams.keys().copied().collect();
                    for id in ids {
                        let stream = self.streams.get_mut(&id).unwrap();
                        stream.send_window.adjust(delta);
                        let window = stream.send_window;
                        events.push(Event::Window { stream_id: id, window });
                    }
                    let frames = self.run_drain();
                    for f in &frames {
                        self.emit(f, events);
                    }
                }
                settings_id::FLOW_CONTROL_OPTIONS => {
                    self.flow.flow_control_allowed()?;
                    if value == 1 {
                        self.flow.disable_forever();
                        for stream in self.streams.values_mut() {
                            stream.send_window = Window::Unbounded;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn is_peer_initiated_id(&self, id: StreamId) -> bool {
        match self.role {
            Role::Client => id % 2 == 0,
            Role::Server => id % 2 == 1,
        }
    }

    fn get_or_create_stream(&mut self, id: StreamId, events: &mut Vec<Event>) -> Result<(), H2Error> {
        if self.streams.contains_key(&id) {
            return Ok(());
        }
        if !self.is_peer_initiated_id(id) {
            return Err(H2Error::connection(ErrorCode::ProtocolError, "frame referenced a stream id this endpoint owns"));
        }
        if id <= self.last_peer_stream_id {
            return Err(H2Error::connection(ErrorCode::ProtocolError, "peer-initiated stream id did not increase"));
        }
        if self.state == ConnectionState::Draining {
            return Err(H2Error::connection(ErrorCode::ProtocolError, "new stream while connection is draining"));
        }
        self.last_peer_stream_id = id;
        if self.active_stream_count >= self.stream_limit {
            return Err(H2Error::stream(id, ErrorCode::RefusedStream, "stream limit exceeded"));
        }
        let window = Window::Bounded(self.initial_window_size as i64);
        self.streams.insert(id, Stream::new(id, DEFAULT_PRIORITY, window));
        events.push(Event::NewStream(id));
        Ok(())
    }

    fn remember_locally_reset(&mut self, id: StreamId) {
        if self.locally_reset.len() == RESET_STREAM_HISTORY {
            self.locally_reset.pop_front();
        }
        self.locally_reset.push_back(id);
    }

    fn was_locally_reset(&self, id: StreamId) -> bool {
        self.locally_reset.contains(&id)
    }

    fn apply_stream_trigger(&mut self, id: StreamId, trigger: Trigger, events: &mut Vec<Event>) -> Result<(), H2Error> {
        let stream = self.streams.get_mut(&id).expect("stream must exist before a trigger is applied");
        let lifecycle = stream.apply(trigger)?;
        self.handle_lifecycle_events(id, lifecycle, events);
        Ok(())
    }

    fn handle_lifecycle_events(&mut self, id: StreamId, lifecycle: Vec<LifecycleEvent>, events: &mut Vec<Event>) {
        for ev in lifecycle {
            match ev {
                LifecycleEvent::Active => {
                    self.active_stream_count += 1;
                    events.push(Event::Active(id));
                }
                LifecycleEvent::HalfClose => events.push(Event::HalfClose(id)),
                LifecycleEvent::Closed(cause) => {
                    self.active_stream_count -= 1;
                    events.push(Event::StreamClosed { stream_id: id, cause });
                    self.streams.remove(&id);
                    if cause == ClosedCause::LocalRst {
                        self.remember_locally_reset(id);
                    }
                    if self.state == ConnectionState::Draining && self.active_stream_count == 0 {
                        self.state = ConnectionState::Closed;
                    }
                }
                LifecycleEvent::Priority(priority) => events.push(Event::Priority { stream_id: id, priority }),
            }
        }
    }

    fn reset_stream_due_to_error(&mut self, err: &H2Error, events: &mut Vec<Event>) {
        let Some(id) = err.stream_id() else { return };
        if let Some(stream) = self.streams.get_mut(&id) {
            let lifecycle = stream.force_reset();
            self.handle_lifecycle_events(id, lifecycle, events);
        }
        self.emit(&Frame::RstStream { stream_id: id, error_code: err.code }, events);
    }

    /// §7: "Sets state to closed, records the error code, emits an
    /// RST_STREAM on stream 0 ... and raises a typed failure outward."
    fn fail(&mut self, err: H2Error) -> H2Error {
        self.state = ConnectionState::Closed;
        self.last_error = Some(err.clone());
        let rst = Frame::RstStream { stream_id: 0, error_code: err.code };
        self.outbound.extend_from_slice(&Framer::encode(&rst));
        err
    }

    fn submit_data_frame(&mut self, id: StreamId, data: Vec<u8>, end_stream: bool) -> Vec<Frame> {
        let mut windows: HashMap<StreamId, Window> =
            self.streams.iter().map(|(k, v)| (*k, v.send_window)).collect();
        let frames = self.flow.submit_data(id, data, end_stream, &mut windows);
        for (k, w) in windows {
            if let Some(stream) = self.streams.get_mut(&k) {
                stream.send_window = w;
            }
        }
        frames
    }

    fn run_drain(&mut self) -> Vec<Frame> {
        let mut windows: HashMap<StreamId, Window> =
            self.streams.iter().map(|(k, v)| (*k, v.send_window)).collect();
        let frames = self.flow.drain(&mut windows);
        for (k, w) in windows {
            if let Some(stream) = self.streams.get_mut(&k) {
                stream.send_window = w;
            }
        }
        frames
    }

    fn emit(&mut self, frame: &Frame, events: &mut Vec<Event>) {
        if self.role == Role::Client && !self.preface_sent {
            self.outbound.extend_from_slice(CONNECTION_PREFACE);
            self.preface_sent = true;
        }
        self.outbound.extend_from_slice(&Framer::encode(frame));
        events.push(Event::FrameSent(frame.clone()));
    }
}

/// A non-owning, borrowed handle for the "Per Stream" operations in §6 —
/// realizes §9's "back-edge that is a non-owning handle (an id plus a way
/// to call into the Connection)" as an ordinary Rust borrow instead of a
/// pointer stored on `Stream`.
pub struct StreamHandle<'a> {
    conn: &'a mut Connection,
    id: StreamId,
}

impl<'a> StreamHandle<'a> {
    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn state(&self) -> StreamState {
        self.conn.streams[&self.id].state
    }

    pub fn priority(&self) -> u32 {
        self.conn.streams[&self.id].priority
    }

    pub fn window(&self) -> Window {
        self.conn.streams[&self.id].send_window
    }

    pub fn buffered_amount(&self) -> usize {
        self.conn.flow.stream_buffered_amount(self.id)
    }

    pub fn headers(&mut self, headers: &[H2Header], end_stream: bool) -> Result<Vec<Event>, H2Error> {
        self.conn.stream_headers(self.id, headers, end_stream)
    }

    pub fn data(&mut self, data: &[u8], end_stream: bool) -> Result<Vec<Event>, H2Error> {
        self.conn.stream_data(self.id, data, end_stream)
    }

    pub fn set_priority(&mut self, priority: u32) -> Result<Vec<Event>, H2Error> {
        self.conn.stream_set_priority(self.id, priority)
    }

    pub fn window_update(&mut self, increment: u32) -> Result<Vec<Event>, H2Error> {
        self.conn.stream_window_update(self.id, increment)
    }

    pub fn close(&mut self, error: Option<ErrorCode>) -> Result<Vec<Event>, H2Error> {
        self.conn.stream_close(self.id, error)
    }
}
