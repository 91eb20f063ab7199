//! Flow control: connection/stream credit accounting and the DATA send
//! buffer (§4.3).
//!
//! Not present in the teacher crate (its own doc comment disclaims flow
//! control entirely: "does NOT implement flow control ... Those are
//! handled by the browser/upstream server"). Grounded on the window
//! bookkeeping style in the `solicit` flow-control module of the reference
//! pack — a signed credit that can go negative, plus an explicit
//! drain-on-update loop rather than a blocking write.

use std::collections::{HashMap, VecDeque};

use crate::error::{ErrorCode, H2Error};
use crate::frame::{DataFlags, Frame, StreamId};

/// A flow-control credit that is either a finite signed balance or
/// permanently disabled (§4.3's "window-limit = ∞").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Bounded(i64),
    Unbounded,
}

impl Window {
    pub fn adjust(&mut self, delta: i64) {
        if let Window::Bounded(v) = self {
            *v += delta;
        }
    }

    pub fn is_positive(&self) -> bool {
        match self {
            Window::Bounded(v) => *v > 0,
            Window::Unbounded => true,
        }
    }

    pub fn value(&self) -> Option<i64> {
        match self {
            Window::Bounded(v) => Some(*v),
            Window::Unbounded => None,
        }
    }
}

struct PendingData {
    stream_id: StreamId,
    payload: Vec<u8>,
    end_stream: bool,
}

/// Per-connection flow-control state: the connection's own credit plus the
/// global FIFO of DATA frames blocked on either the connection or their
/// stream's credit.
pub struct FlowController {
    pub connection_window: Window,
    /// Once true, `connection_window` and every stream window are
    /// permanently `Unbounded` and any further flow-control signal is a
    /// `FLOW_CONTROL_ERROR` (§4.3's `flow_control_allowed?`).
    pub disabled: bool,
    queue: VecDeque<PendingData>,
}

impl FlowController {
    pub fn new(initial_window: i64) -> Self {
        FlowController {
            connection_window: Window::Bounded(initial_window),
            disabled: false,
            queue: VecDeque::new(),
        }
    }

    pub fn disable_forever(&mut self) {
        self.disabled = true;
        self.connection_window = Window::Unbounded;
    }

    pub fn flow_control_allowed(&self) -> Result<(), H2Error> {
        if self.disabled {
            Err(H2Error::connection(
                ErrorCode::FlowControlError,
                "flow control was permanently disabled by a prior SETTINGS",
            ))
        } else {
            Ok(())
        }
    }

    pub fn buffered_amount(&self) -> usize {
        self.queue.iter().map(|p| p.payload.len()).sum()
    }

    pub fn stream_buffered_amount(&self, stream_id: StreamId) -> usize {
        self.queue
            .iter()
            .filter(|p| p.stream_id == stream_id)
            .map(|p| p.payload.len())
            .sum()
    }

    /// Submit a DATA frame for transmission, returning it immediately if
    /// flow control is disabled or applying the drain discipline
    /// (§4.3, outbound discipline steps 1-3) otherwise.
    pub fn submit_data(
        &mut self,
        stream_id: StreamId,
        payload: Vec<u8>,
        end_stream: bool,
        stream_windows: &mut HashMap<StreamId, Window>,
    ) -> Vec<Frame> {
        if self.disabled {
            return vec![Frame::Data {
                stream_id,
                flags: DataFlags { end_stream, end_segment: false },
                payload,
            }];
        }
        self.queue.push_back(PendingData { stream_id, payload, end_stream });
        self.drain(stream_windows)
    }

    /// Re-run the drain loop, e.g. after a WINDOW_UPDATE or a
    /// SETTINGS_INITIAL_WINDOW_SIZE change (§4.3, step 3).
    pub fn drain(&mut self, stream_windows: &mut HashMap<StreamId, Window>) -> Vec<Frame> {
        let mut emitted = Vec::new();
        if self.disabled {
            for pending in self.queue.drain(..) {
                emitted.push(Frame::Data {
                    stream_id: pending.stream_id,
                    flags: DataFlags { end_stream: pending.end_stream, end_segment: false },
                    payload: pending.payload,
                });
            }
            return emitted;
        }

        loop {
            let Some(head) = self.queue.front_mut() else { break };
            let stream_window = stream_windows.entry(head.stream_id).or_insert(Window::Bounded(0));

            let conn_credit = match self.connection_window.value() {
                Some(v) => v,
                None => i64::MAX,
            };
            let stream_credit = match stream_window.value() {
                Some(v) => v,
                None => i64::MAX,
            };
            let available = conn_credit.min(stream_credit);
            if available <= 0 {
                break;
            }

            let send_len = head.payload.len().min(available as usize);
            if send_len == 0 {
                break;
            }

            let chunk: Vec<u8> = head.payload.drain(..send_len).collect();
            self.connection_window.adjust(-(send_len as i64));
            stream_window.adjust(-(send_len as i64));

            if head.payload.is_empty() {
                let pending = self.queue.pop_front().unwrap();
                emitted.push(Frame::Data {
                    stream_id: pending.stream_id,
                    flags: DataFlags { end_stream: pending.end_stream, end_segment: false },
                    payload: chunk,
                });
            } else {
                emitted.push(Frame::Data {
                    stream_id: head.stream_id,
                    flags: DataFlags { end_stream: false, end_segment: false },
                    payload: chunk,
                });
            }
        }
        emitted
    }
}
