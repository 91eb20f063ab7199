//! Per-stream lifecycle state machine and event emission (§4.4).
//!
//! Grounded on the state diagram and `idle -> reserved_* -> half_closed_* ->
//! closed` transition table in
//! `examples/other_examples/235f199d_ymesika-h2__src-proto-state.rs.rs`
//! (the `h2` crate's `proto::state`), renamed to the symbols §4.4 actually
//! uses. A `Stream` here holds no back-reference to its `Connection` — per
//! §9's design note, the non-owning "handle + id" edge is realized as
//! [`crate::connection::StreamHandle`], a short-lived borrow, rather than
//! a pointer stored on `Stream` itself.

use crate::error::{ErrorCode, H2Error};
use crate::flow::Window;
use crate::frame::StreamId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    ReservedLocal,
    ReservedRemote,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

impl StreamState {
    /// True for states that count toward `active_stream_count` (§4.4:
    /// "fires exactly once, on first entry to open or either half_closed
    /// state").
    pub fn is_active(self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedLocal | StreamState::HalfClosedRemote)
    }
}

/// Disambiguates why a stream reached `closed` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClosedCause {
    #[default]
    None,
    LocalRst,
    RemoteRst,
    LocalFin,
    RemoteFin,
}

/// What happened to a [`Stream`] as a pure value; `Connection` maps these
/// into the public, stream-id-tagged `Event` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Active,
    HalfClose,
    Closed(ClosedCause),
    Priority(u32),
}

/// The frame-level action being applied to a stream's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    SendHeaders { end_stream: bool },
    RecvHeaders { end_stream: bool },
    SendPushPromise,
    RecvPushPromise,
    SendData { end_stream: bool },
    RecvData { end_stream: bool },
    SendRstStream,
    RecvRstStream,
}

/// Per-stream state (§3's "Stream").
#[derive(Debug, Clone)]
pub struct Stream {
    pub id: StreamId,
    pub priority: u32,
    pub send_window: Window,
    pub state: StreamState,
    pub closed_cause: ClosedCause,
}

impl Stream {
    pub fn new(id: StreamId, priority: u32, initial_window: Window) -> Self {
        Stream {
            id,
            priority,
            send_window: initial_window,
            state: StreamState::Idle,
            closed_cause: ClosedCause::None,
        }
    }

    pub fn set_priority(&mut self, priority: u32) -> LifecycleEvent {
        self.priority = priority;
        LifecycleEvent::Priority(priority)
    }

    /// Apply `trigger` to the state machine, returning the lifecycle
    /// events it produced or a stream error if the trigger is illegal in
    /// the current state (§4.4).
    pub fn apply(&mut self, trigger: Trigger) -> Result<Vec<LifecycleEvent>, H2Error> {
        if self.state == StreamState::Closed {
            return Err(self.illegal(trigger));
        }

        match (self.state, trigger) {
            (StreamState::Idle, Trigger::SendHeaders { end_stream }) => {
                Ok(self.enter_open(end_stream, true))
            }
            (StreamState::Idle, Trigger::RecvHeaders { end_stream }) => {
                Ok(self.enter_open(end_stream, false))
            }
            (StreamState::Idle, Trigger::SendPushPromise) => {
                self.state = StreamState::ReservedLocal;
                Ok(vec![])
            }
            (StreamState::Idle, Trigger::RecvPushPromise) => {
                self.state = StreamState::ReservedRemote;
                Ok(vec![])
            }

            (StreamState::ReservedLocal, Trigger::SendHeaders { .. }) => {
                self.state = StreamState::HalfClosedRemote;
                Ok(vec![LifecycleEvent::Active, LifecycleEvent::HalfClose])
            }
            (StreamState::ReservedLocal, Trigger::RecvRstStream) => {
                Ok(self.close(ClosedCause::RemoteRst))
            }

            (StreamState::ReservedRemote, Trigger::RecvHeaders { .. }) => {
                self.state = StreamState::HalfClosedLocal;
                Ok(vec![LifecycleEvent::Active, LifecycleEvent::HalfClose])
            }
            (StreamState::ReservedRemote, Trigger::SendRstStream) => {
                Ok(self.close(ClosedCause::LocalRst))
            }

            (StreamState::Open, Trigger::SendHeaders { end_stream })
            | (StreamState::Open, Trigger::SendData { end_stream }) => {
                if end_stream {
                    self.state = StreamState::HalfClosedLocal;
                    Ok(vec![LifecycleEvent::HalfClose])
                } else {
                    Ok(vec![])
                }
            }
            (StreamState::Open, Trigger::RecvHeaders { end_stream })
            | (StreamState::Open, Trigger::RecvData { end_stream }) => {
                if end_stream {
                    self.state = StreamState::HalfClosedRemote;
                    Ok(vec![LifecycleEvent::HalfClose])
                } else {
                    Ok(vec![])
                }
            }
            (StreamState::Open, Trigger::SendRstStream) => Ok(self.close(ClosedCause::LocalRst)),
            (StreamState::Open, Trigger::RecvRstStream) => Ok(self.close(ClosedCause::RemoteRst)),

            (StreamState::HalfClosedLocal, Trigger::RecvData { end_stream: true })
            | (StreamState::HalfClosedLocal, Trigger::RecvHeaders { end_stream: true }) => {
                Ok(self.close(ClosedCause::RemoteFin))
            }
            (StreamState::HalfClosedLocal, Trigger::RecvData { end_stream: false })
            | (StreamState::HalfClosedLocal, Trigger::RecvHeaders { end_stream: false }) => Ok(vec![]),
            (StreamState::HalfClosedLocal, Trigger::RecvRstStream) => {
                Ok(self.close(ClosedCause::RemoteRst))
            }
            (StreamState::HalfClosedLocal, Trigger::SendRstStream) => {
                Ok(self.close(ClosedCause::LocalRst))
            }

            (StreamState::HalfClosedRemote, Trigger::SendData { end_stream: true })
            | (StreamState::HalfClosedRemote, Trigger::SendHeaders { end_stream: true }) => {
                Ok(self.close(ClosedCause::LocalFin))
            }
            (StreamState::HalfClosedRemote, Trigger::SendData { end_stream: false })
            | (StreamState::HalfClosedRemote, Trigger::SendHeaders { end_stream: false }) => Ok(vec![]),
            (StreamState::HalfClosedRemote, Trigger::SendRstStream) => {
                Ok(self.close(ClosedCause::LocalRst))
            }
            (StreamState::HalfClosedRemote, Trigger::RecvRstStream) => {
                Ok(self.close(ClosedCause::RemoteRst))
            }

            _ => Err(self.illegal(trigger)),
        }
    }

    /// Force the stream to `closed` with cause `local_rst`, as happens
    /// when the engine rejects an illegal frame (§4.4) or the embedder
    /// calls the local reset operation (§5).
    pub fn force_reset(&mut self) -> Vec<LifecycleEvent> {
        if self.state == StreamState::Closed {
            return vec![];
        }
        self.close(ClosedCause::LocalRst)
    }

    fn enter_open(&mut self, end_stream: bool, local: bool) -> Vec<LifecycleEvent> {
        self.state = StreamState::Open;
        let mut events = vec![LifecycleEvent::Active];
        if end_stream {
            self.state = if local { StreamState::HalfClosedLocal } else { StreamState::HalfClosedRemote };
            events.push(LifecycleEvent::HalfClose);
        }
        events
    }

    fn close(&mut self, cause: ClosedCause) -> Vec<LifecycleEvent> {
        let was_active = self.state.is_active();
        self.state = StreamState::Closed;
        self.closed_cause = cause;
        let mut events = Vec::new();
        if was_active {
            events.push(LifecycleEvent::Closed(cause));
        }
        events
    }

    fn illegal(&self, _trigger: Trigger) -> H2Error {
        let code = if self.state == StreamState::Closed {
            ErrorCode::StreamClosed
        } else {
            ErrorCode::ProtocolError
        };
        H2Error::stream(self.id, code, format!("frame not permitted in state {:?}", self.state))
    }
}
