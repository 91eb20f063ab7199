//! h2-proto-core: a sans-I/O HTTP/2 protocol engine.
//!
//! This crate provides a synchronous HTTP/2 connection and stream state
//! machine designed for environments that cannot use async runtimes (e.g.,
//! WebAssembly, embedded systems) or that want full control over their own
//! event loop. It never touches a socket: the embedder hands it bytes that
//! arrived from the network and pulls bytes to write back out.
//!
//! # Features
//!
//! - **Sans-I/O design**: no transport, no TLS, no event loop baked in.
//! - **Pure Rust**: no C bindings, compiles to WASM.
//! - **Full connection lifecycle**: handshake, SETTINGS negotiation, stream
//!   multiplexing, PUSH_PROMISE, PING, GOAWAY/draining.
//! - **Flow control**: two-level connection/stream credit with an internal
//!   send buffer, split automatically to fit available credit.
//! - **HPACK support**: header compression via `fluke-hpack`.
//! - **CONTINUATION assembly**: automatic header block reassembly.
//!
//! # Quick start
//!
//! ```rust
//! use h2_proto_core::{Connection, Role, Event};
//!
//! let mut conn = Connection::new(Role::Client);
//! let id = conn.new_stream(None).unwrap();
//! conn.stream(id).unwrap().headers(&[], true).unwrap();
//! let wire_bytes = conn.take_outbound();
//! assert!(!wire_bytes.is_empty());
//! ```
//!
//! # Architecture
//!
//! Five leaf-to-root components (§2 of the design): integer coding
//! primitives, the binary framer, the flow controller, the per-stream state
//! machine, and the connection state machine that ties them together.
//!
//! It does NOT provide:
//! - TCP/UDP transport (you provide the bytes)
//! - TLS (use rustls or similar)
//! - An event loop (you drive `receive`/`take_outbound` yourself)

pub mod connection;
pub mod error;
pub mod flow;
pub mod frame;
pub mod hpack;
pub mod primitives;
pub mod stream;

pub use connection::{Connection, ConnectionState, Event, Role, Settings, StreamHandle};
pub use error::{ErrorCode, ErrorScope, H2Error};
pub use flow::{FlowController, Window};
pub use frame::{
    frame_type, is_h2c_preface, settings_id, ContinuationFlags, DataFlags, Frame, FrameHeader,
    Framer, HeadersFlags, PingFlags, PushPromiseFlags, SettingsFlags, StreamId,
    CONNECTION_PREFACE, DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_PRIORITY,
};
pub use hpack::{H2Header, HpackDecoder, HpackEncoder};
pub use primitives::{decode_int, encode_int, PrimitiveError};
pub use stream::{ClosedCause, LifecycleEvent, Stream, StreamState, Trigger};
