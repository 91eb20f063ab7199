//! Binary framing: the nine HTTP/2 frame types over a length-prefixed wire
//! envelope (§4.2).
//!
//! Grounded on `h2_codec.rs`'s `H2FrameHeader`/`parse_frame`/`create_*`
//! family, generalized from "parse straight into a flat event" into "parse
//! into a tagged `Frame` value" per §9's design note ("A faithful
//! re-implementation should use a tagged sum over frame types with
//! payload-specific fields").
//!
//! The wire envelope here is the simplified 8-octet header used by
//! draft-ietf-httpbis-http2-06 (16-bit length, unlike the 24-bit length
//! RFC 7540 settled on later): 2-byte length, 1-byte type, 1-byte flags,
//! 4-byte stream id with the top bit reserved.

use crate::error::{ErrorCode, H2Error};

/// A 31-bit stream identifier (top bit always clear; masked off on parse).
pub type StreamId = u32;

pub mod frame_type {
    pub const DATA: u8 = 0x0;
    pub const HEADERS: u8 = 0x1;
    pub const PRIORITY: u8 = 0x2;
    pub const RST_STREAM: u8 = 0x3;
    pub const SETTINGS: u8 = 0x4;
    pub const PUSH_PROMISE: u8 = 0x5;
    pub const PING: u8 = 0x6;
    pub const GOAWAY: u8 = 0x7;
    pub const WINDOW_UPDATE: u8 = 0x8;
    pub const CONTINUATION: u8 = 0x9;
}

mod bits {
    pub const END_STREAM: u8 = 0x1;
    pub const END_SEGMENT: u8 = 0x2;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PRIORITY: u8 = 0x20;
    pub const END_PUSH_PROMISE: u8 = 0x4;
}

/// Recognized SETTINGS identifiers (§3's "Settings snapshot").
pub mod settings_id {
    pub const MAX_CONCURRENT_STREAMS: u32 = 4;
    pub const INITIAL_WINDOW_SIZE: u32 = 7;
    pub const FLOW_CONTROL_OPTIONS: u32 = 10;
}

/// The connection preface clients send before any frames (§6).
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Default initial flow-control window (§6).
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65535;

/// Default stream priority: lower value is higher priority (§6).
pub const DEFAULT_PRIORITY: u32 = 1 << 30;

macro_rules! flag_struct {
    ($name:ident { $($field:ident : $bit:path),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name {
            $(pub $field: bool),+
        }

        impl $name {
            fn from_byte(byte: u8) -> Self {
                $name { $($field: byte & $bit != 0),+ }
            }

            fn to_byte(self) -> u8 {
                let mut byte = 0u8;
                $(if self.$field { byte |= $bit; })+
                byte
            }
        }
    };
}

flag_struct!(DataFlags { end_stream: bits::END_STREAM, end_segment: bits::END_SEGMENT });
flag_struct!(HeadersFlags {
    end_stream: bits::END_STREAM,
    end_headers: bits::END_HEADERS,
    priority: bits::PRIORITY,
});
flag_struct!(SettingsFlags { ack: bits::ACK });
flag_struct!(PushPromiseFlags { end_push_promise: bits::END_PUSH_PROMISE });
flag_struct!(PingFlags { ack: bits::ACK });
flag_struct!(ContinuationFlags { end_headers: bits::END_HEADERS });

/// One unit of the binary wire format (§3's "Frame record").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data {
        stream_id: StreamId,
        flags: DataFlags,
        payload: Vec<u8>,
    },
    Headers {
        stream_id: StreamId,
        flags: HeadersFlags,
        priority: Option<u32>,
        header_block: Vec<u8>,
    },
    Priority {
        stream_id: StreamId,
        priority: u32,
    },
    RstStream {
        stream_id: StreamId,
        error_code: ErrorCode,
    },
    Settings {
        flags: SettingsFlags,
        params: Vec<(u32, u32)>,
    },
    PushPromise {
        stream_id: StreamId,
        flags: PushPromiseFlags,
        promised_stream_id: StreamId,
        header_block: Vec<u8>,
    },
    Ping {
        flags: PingFlags,
        payload: [u8; 8],
    },
    GoAway {
        last_stream_id: StreamId,
        error_code: ErrorCode,
        debug_data: Vec<u8>,
    },
    WindowUpdate {
        stream_id: StreamId,
        increment: u32,
    },
    Continuation {
        stream_id: StreamId,
        flags: ContinuationFlags,
        header_block: Vec<u8>,
    },
}

impl Frame {
    pub fn stream_id(&self) -> StreamId {
        match self {
            Frame::Data { stream_id, .. }
            | Frame::Headers { stream_id, .. }
            | Frame::Priority { stream_id, .. }
            | Frame::RstStream { stream_id, .. }
            | Frame::PushPromise { stream_id, .. }
            | Frame::WindowUpdate { stream_id, .. }
            | Frame::Continuation { stream_id, .. } => *stream_id,
            Frame::Settings { .. } | Frame::Ping { .. } | Frame::GoAway { .. } => 0,
        }
    }
}

/// The 8-byte frame header that precedes every frame's type-specific
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u16,
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: StreamId,
}

impl FrameHeader {
    pub const SIZE: usize = 8;

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        let length = u16::from_be_bytes([bytes[0], bytes[1]]);
        let frame_type = bytes[2];
        let flags = bytes[3];
        let stream_id =
            u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) & 0x7FFF_FFFF;
        Some(FrameHeader { length, frame_type, flags, stream_id })
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let len = self.length.to_be_bytes();
        let sid = (self.stream_id & 0x7FFF_FFFF).to_be_bytes();
        [len[0], len[1], self.frame_type, self.flags, sid[0], sid[1], sid[2], sid[3]]
    }

    pub fn total_size(&self) -> usize {
        Self::SIZE + self.length as usize
    }
}

/// Stateless encode/decode of [`Frame`] values over the wire envelope.
pub struct Framer;

impl Framer {
    /// Parse one frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` if `buf` does not yet contain a complete frame.
    /// On success returns the frame and the number of bytes consumed from
    /// the front of `buf`; the caller is responsible for draining them.
    pub fn parse(buf: &[u8]) -> Result<Option<(Frame, usize)>, H2Error> {
        let header = match FrameHeader::parse(buf) {
            Some(h) => h,
            None => return Ok(None),
        };
        let total = header.total_size();
        if buf.len() < total {
            return Ok(None);
        }
        let payload = &buf[FrameHeader::SIZE..total];
        let frame = Self::parse_payload(&header, payload)?;
        Ok(Some((frame, total)))
    }

    fn parse_payload(header: &FrameHeader, payload: &[u8]) -> Result<Frame, H2Error> {
        match header.frame_type {
            frame_type::DATA => {
                if header.stream_id == 0 {
                    return Err(protocol_error("DATA frame on stream 0"));
                }
                Ok(Frame::Data {
                    stream_id: header.stream_id,
                    flags: DataFlags::from_byte(header.flags),
                    payload: payload.to_vec(),
                })
            }
            frame_type::HEADERS => {
                if header.stream_id == 0 {
                    return Err(protocol_error("HEADERS frame on stream 0"));
                }
                let flags = HeadersFlags::from_byte(header.flags);
                let (priority, header_block) = if flags.priority {
                    if payload.len() < 4 {
                        return Err(frame_size_error("HEADERS priority field truncated"));
                    }
                    let priority = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                    (Some(priority), payload[4..].to_vec())
                } else {
                    (None, payload.to_vec())
                };
                Ok(Frame::Headers { stream_id: header.stream_id, flags, priority, header_block })
            }
            frame_type::PRIORITY => {
                if header.stream_id == 0 {
                    return Err(protocol_error("PRIORITY frame on stream 0"));
                }
                if payload.len() != 4 {
                    return Err(frame_size_error("PRIORITY payload must be 4 bytes"));
                }
                let priority = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                Ok(Frame::Priority { stream_id: header.stream_id, priority })
            }
            frame_type::RST_STREAM => {
                if payload.len() != 4 {
                    return Err(frame_size_error("RST_STREAM payload must be 4 bytes"));
                }
                let code = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                Ok(Frame::RstStream { stream_id: header.stream_id, error_code: ErrorCode::from_u32(code) })
            }
            frame_type::SETTINGS => {
                if header.stream_id != 0 {
                    return Err(protocol_error("SETTINGS frame on non-zero stream"));
                }
                if payload.len() % 8 != 0 {
                    return Err(frame_size_error("SETTINGS payload must be a multiple of 8 bytes"));
                }
                let mut params = Vec::with_capacity(payload.len() / 8);
                let mut pos = 0;
                while pos < payload.len() {
                    let key = u32::from_be_bytes([payload[pos], payload[pos + 1], payload[pos + 2], payload[pos + 3]]);
                    let value = u32::from_be_bytes([
                        payload[pos + 4],
                        payload[pos + 5],
                        payload[pos + 6],
                        payload[pos + 7],
                    ]);
                    params.push((key, value));
                    pos += 8;
                }
                Ok(Frame::Settings { flags: SettingsFlags::from_byte(header.flags), params })
            }
            frame_type::PUSH_PROMISE => {
                if header.stream_id == 0 {
                    return Err(protocol_error("PUSH_PROMISE frame on stream 0"));
                }
                if payload.len() < 4 {
                    return Err(frame_size_error("PUSH_PROMISE payload truncated"));
                }
                let promised = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7FFF_FFFF;
                Ok(Frame::PushPromise {
                    stream_id: header.stream_id,
                    flags: PushPromiseFlags::from_byte(header.flags),
                    promised_stream_id: promised,
                    header_block: payload[4..].to_vec(),
                })
            }
            frame_type::PING => {
                if header.stream_id != 0 {
                    return Err(protocol_error("PING frame on non-zero stream"));
                }
                if payload.len() != 8 {
                    return Err(frame_size_error("PING payload must be 8 bytes"));
                }
                let mut data = [0u8; 8];
                data.copy_from_slice(payload);
                Ok(Frame::Ping { flags: PingFlags::from_byte(header.flags), payload: data })
            }
            frame_type::GOAWAY => {
                if payload.len() < 8 {
                    return Err(frame_size_error("GOAWAY payload truncated"));
                }
                let last = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7FFF_FFFF;
                let code = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
                Ok(Frame::GoAway {
                    last_stream_id: last,
                    error_code: ErrorCode::from_u32(code),
                    debug_data: payload[8..].to_vec(),
                })
            }
            frame_type::WINDOW_UPDATE => {
                if payload.len() != 4 {
                    return Err(frame_size_error("WINDOW_UPDATE payload must be 4 bytes"));
                }
                let increment = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7FFF_FFFF;
                Ok(Frame::WindowUpdate { stream_id: header.stream_id, increment })
            }
            frame_type::CONTINUATION => {
                if header.stream_id == 0 {
                    return Err(protocol_error("CONTINUATION frame on stream 0"));
                }
                Ok(Frame::Continuation {
                    stream_id: header.stream_id,
                    flags: ContinuationFlags::from_byte(header.flags),
                    header_block: payload.to_vec(),
                })
            }
            other => Err(H2Error::connection(
                ErrorCode::ProtocolError,
                format!("unknown frame type {other:#x}"),
            )),
        }
    }

    /// Serialize `frame` to its wire representation (header + payload).
    pub fn encode(frame: &Frame) -> Vec<u8> {
        let (frame_type, flags, stream_id, payload) = match frame {
            Frame::Data { stream_id, flags, payload } => {
                (frame_type::DATA, flags.to_byte(), *stream_id, payload.clone())
            }
            Frame::Headers { stream_id, flags, priority, header_block } => {
                let mut payload = Vec::new();
                if let Some(p) = priority {
                    payload.extend_from_slice(&p.to_be_bytes());
                }
                payload.extend_from_slice(header_block);
                (frame_type::HEADERS, flags.to_byte(), *stream_id, payload)
            }
            Frame::Priority { stream_id, priority } => {
                (frame_type::PRIORITY, 0, *stream_id, priority.to_be_bytes().to_vec())
            }
            Frame::RstStream { stream_id, error_code } => {
                (frame_type::RST_STREAM, 0, *stream_id, error_code.to_u32().to_be_bytes().to_vec())
            }
            Frame::Settings { flags, params } => {
                let mut payload = Vec::with_capacity(params.len() * 8);
                for (key, value) in params {
                    payload.extend_from_slice(&key.to_be_bytes());
                    payload.extend_from_slice(&value.to_be_bytes());
                }
                (frame_type::SETTINGS, flags.to_byte(), 0, payload)
            }
            Frame::PushPromise { stream_id, flags, promised_stream_id, header_block } => {
                let mut payload = (promised_stream_id & 0x7FFF_FFFF).to_be_bytes().to_vec();
                payload.extend_from_slice(header_block);
                (frame_type::PUSH_PROMISE, flags.to_byte(), *stream_id, payload)
            }
            Frame::Ping { flags, payload } => {
                (frame_type::PING, flags.to_byte(), 0, payload.to_vec())
            }
            Frame::GoAway { last_stream_id, error_code, debug_data } => {
                let mut payload = (last_stream_id & 0x7FFF_FFFF).to_be_bytes().to_vec();
                payload.extend_from_slice(&error_code.to_u32().to_be_bytes());
                payload.extend_from_slice(debug_data);
                (frame_type::GOAWAY, 0, 0, payload)
            }
            Frame::WindowUpdate { stream_id, increment } => {
                (frame_type::WINDOW_UPDATE, 0, *stream_id, (increment & 0x7FFF_FFFF).to_be_bytes().to_vec())
            }
            Frame::Continuation { stream_id, flags, header_block } => {
                (frame_type::CONTINUATION, flags.to_byte(), *stream_id, header_block.clone())
            }
        };

        let header = FrameHeader {
            length: payload.len() as u16,
            frame_type,
            flags,
            stream_id,
        };
        let mut out = Vec::with_capacity(FrameHeader::SIZE + payload.len());
        out.extend_from_slice(&header.encode());
        out.extend_from_slice(&payload);
        out
    }
}

fn protocol_error(message: &str) -> H2Error {
    H2Error::connection(ErrorCode::ProtocolError, message)
}

fn frame_size_error(message: &str) -> H2Error {
    H2Error::connection(ErrorCode::FrameSizeError, message)
}

/// Check if `data` starts with the HTTP/2 connection preface.
pub fn is_h2c_preface(data: &[u8]) -> bool {
    data.len() >= CONNECTION_PREFACE.len() && &data[..CONNECTION_PREFACE.len()] == CONNECTION_PREFACE
}
