//! Typed errors for the engine.
//!
//! The teacher crate's `h2_codec.rs` propagates `Result<_, String>`
//! everywhere, which is enough for a frame-only parser but doesn't let a
//! caller branch on "tear down the connection" vs "reset one stream" (§7).
//! `H2Error` carries both the scope and the symbolic error code so the
//! embedder can act on it directly instead of pattern-matching a message.

use std::fmt;

use crate::frame::StreamId;

/// Symbolic error codes (§7), 1:1 with their RFC numeric values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError,
    ProtocolError,
    InternalError,
    FlowControlError,
    StreamClosed,
    FrameSizeError,
    RefusedStream,
    Cancel,
    CompressionError,
    ConnectError,
    EnhanceYourCalm,
}

impl ErrorCode {
    pub fn to_u32(self) -> u32 {
        match self {
            ErrorCode::NoError => 0x0,
            ErrorCode::ProtocolError => 0x1,
            ErrorCode::InternalError => 0x2,
            ErrorCode::FlowControlError => 0x3,
            ErrorCode::StreamClosed => 0x5,
            ErrorCode::FrameSizeError => 0x6,
            ErrorCode::RefusedStream => 0x7,
            ErrorCode::Cancel => 0x8,
            ErrorCode::CompressionError => 0x9,
            ErrorCode::ConnectError => 0xa,
            ErrorCode::EnhanceYourCalm => 0xb,
        }
    }

    /// Unrecognized wire values map to `InternalError` rather than failing
    /// to parse — an unknown error code on an RST_STREAM/GOAWAY we receive
    /// is still informative even if we don't have a symbolic name for it.
    pub fn from_u32(value: u32) -> Self {
        match value {
            0x0 => ErrorCode::NoError,
            0x1 => ErrorCode::ProtocolError,
            0x3 => ErrorCode::FlowControlError,
            0x5 => ErrorCode::StreamClosed,
            0x6 => ErrorCode::FrameSizeError,
            0x7 => ErrorCode::RefusedStream,
            0x8 => ErrorCode::Cancel,
            0x9 => ErrorCode::CompressionError,
            0xa => ErrorCode::ConnectError,
            0xb => ErrorCode::EnhanceYourCalm,
            _ => ErrorCode::InternalError,
        }
    }
}

impl Default for ErrorCode {
    /// §7: "Error code defaults to PROTOCOL_ERROR."
    fn default() -> Self {
        ErrorCode::ProtocolError
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Which part of the connection an [`H2Error`] applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// Fatal: the whole connection must be torn down.
    Connection,
    /// Affects a single stream; remediated by RST_STREAM.
    Stream(StreamId),
}

impl fmt::Display for ErrorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorScope::Connection => write!(f, "connection"),
            ErrorScope::Stream(id) => write!(f, "stream {id}"),
        }
    }
}

/// A single typed error value carrying a scope and a code, per §7 and §9's
/// "Error raising" design note.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{scope} error: {code} ({message})")]
pub struct H2Error {
    pub scope: ErrorScope,
    pub code: ErrorCode,
    pub message: String,
}

impl H2Error {
    pub fn connection(code: ErrorCode, message: impl Into<String>) -> Self {
        H2Error {
            scope: ErrorScope::Connection,
            code,
            message: message.into(),
        }
    }

    pub fn stream(id: StreamId, code: ErrorCode, message: impl Into<String>) -> Self {
        H2Error {
            scope: ErrorScope::Stream(id),
            code,
            message: message.into(),
        }
    }

    pub fn is_connection_error(&self) -> bool {
        matches!(self.scope, ErrorScope::Connection)
    }

    pub fn stream_id(&self) -> Option<StreamId> {
        match self.scope {
            ErrorScope::Stream(id) => Some(id),
            ErrorScope::Connection => None,
        }
    }
}

impl From<crate::primitives::PrimitiveError> for H2Error {
    fn from(_: crate::primitives::PrimitiveError) -> Self {
        H2Error::connection(ErrorCode::CompressionError, "malformed integer in header block")
    }
}
