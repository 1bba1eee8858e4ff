// src/interception/websocket.rs
//! WebSocket-style connection tracking
//!
//! The record is created when the socket is constructed and then updated by
//! open, frame, close and error notifications. Frames are kept in a bounded
//! log on the record. A socket dropped while still connecting or open is
//! recorded as failed.

use crate::events::topics;
use crate::interception::body::Body;
use crate::interception::context::{CaptureContext, PendingCapture};
use crate::interception::record::{Direction, SocketState};
use tracing::debug;

/// One tracked connection
pub struct TrackedSocket {
    ctx: CaptureContext,
    pending: Option<PendingCapture>,
    settled: bool,
}

impl TrackedSocket {
    /// Record a new connection attempt
    pub fn connect(ctx: CaptureContext, url: &str, protocols: &[&str]) -> Self {
        let pending = ctx.begin_socket(url, protocols.iter().map(|p| p.to_string()).collect());
        Self {
            ctx,
            pending,
            settled: false,
        }
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.correlation_id.as_str())
    }

    pub fn opened(&self) {
        let Some(pending) = &self.pending else { return };
        self.ctx
            .socket_transition(pending, topics::SOCKET_OPEN, |record, _| {
                if record.state != SocketState::Connecting {
                    return false;
                }
                record.state = SocketState::Open;
                true
            });
    }

    pub fn sent(&self, data: &Body) {
        if let Some(pending) = &self.pending {
            self.ctx.socket_message(pending, Direction::Sent, data);
        }
    }

    pub fn received(&self, data: &Body) {
        if let Some(pending) = &self.pending {
            self.ctx.socket_message(pending, Direction::Received, data);
        }
    }

    pub fn close(&mut self, code: u16, reason: &str) {
        if self.settled {
            return;
        }
        self.settled = true;
        let Some(pending) = &self.pending else { return };
        let reason = reason.to_string();
        self.ctx
            .socket_transition(pending, topics::SOCKET_CLOSE, move |record, duration| {
                if record.state.is_terminal() {
                    return false;
                }
                record.state = SocketState::Closed;
                record.close_code = Some(code);
                record.close_reason = (!reason.is_empty()).then_some(reason);
                record.duration_ms = Some(duration);
                true
            });
    }

    pub fn error(&mut self, message: &str) {
        if self.settled {
            return;
        }
        self.settled = true;
        let Some(pending) = &self.pending else { return };
        let message = message.to_string();
        self.ctx
            .socket_transition(pending, topics::SOCKET_ERROR, move |record, duration| {
                if record.state.is_terminal() {
                    return false;
                }
                record.state = SocketState::Failed;
                record.error = Some(message);
                record.duration_ms = Some(duration);
                true
            });
    }
}

impl Drop for TrackedSocket {
    fn drop(&mut self) {
        if !self.settled && self.pending.is_some() {
            debug!(id = ?self.correlation_id(), "Socket dropped while open");
            self.error("Socket dropped without close");
        }
    }
}
