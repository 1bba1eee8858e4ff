// src/interception/lifecycle.rs
//! Lifecycle-event request (XHR style)
//!
//! The host drives a [`TrackedRequest`] through `open`, optional headers,
//! `send`, any number of `progress` calls and then exactly one terminal
//! event. Only the first terminal event is recorded. Dropping a request that
//! was sent but never settled records it as failed.
//!
//! ```text
//! Unopened ─open─► Opened ─send─► Sent ─┬─ load ───► Done (resolved)
//!                                       ├─ error ──► Done (failed)
//!                                       ├─ timeout ► Done (failed)
//!                                       ├─ abort ──► Done (failed)
//!                                       └─ drop ───► Done (failed)
//! ```

use crate::interception::body::{Body, Headers};
use crate::interception::context::{CaptureContext, PendingCapture, ResponseParts};
use crate::interception::fetch::HookResponse;
use crate::interception::record::{FailureInfo, FailureKind, NetworkKind};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unopened,
    Opened,
    Sent,
    Done,
}

/// One XHR-style request
pub struct TrackedRequest {
    ctx: CaptureContext,
    method: String,
    url: String,
    headers: Headers,
    pending: Option<PendingCapture>,
    phase: Phase,
}

impl TrackedRequest {
    pub fn new(ctx: CaptureContext) -> Self {
        Self {
            ctx,
            method: String::new(),
            url: String::new(),
            headers: Headers::new(),
            pending: None,
            phase: Phase::Unopened,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Correlation id of the latest send
    pub fn correlation_id(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.correlation_id.as_str())
    }

    /// Set method and url; re-opening an in-flight request aborts it
    pub fn open(&mut self, method: &str, url: &str) {
        if self.phase == Phase::Sent {
            self.settle_failed(FailureKind::Abort, "Request re-opened");
        }
        self.method = method.to_string();
        self.url = url.to_string();
        self.headers.clear();
        self.pending = None;
        self.phase = Phase::Opened;
    }

    pub fn set_request_header(&mut self, name: &str, value: &str) {
        if self.phase != Phase::Opened {
            warn!(name, "Header set outside the opened phase; ignored");
            return;
        }
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
    }

    /// Persist and publish the begin record
    pub fn send(&mut self, body: &Body) {
        if self.phase != Phase::Opened {
            warn!(phase = ?self.phase, "send() called on a request that is not opened");
            return;
        }
        self.pending = self.ctx.begin(
            NetworkKind::Xhr,
            &self.method,
            &self.url,
            self.headers.clone(),
            body,
        );
        self.phase = Phase::Sent;
    }

    pub fn progress(&self, loaded: u64, total: Option<u64>) {
        if self.phase != Phase::Sent {
            return;
        }
        if let Some(pending) = &self.pending {
            self.ctx.progress(pending, loaded, total);
        }
    }

    /// Successful completion
    pub fn load(&mut self, response: &HookResponse) {
        if self.phase != Phase::Sent {
            debug!("load() after the request settled; ignored");
            return;
        }
        self.phase = Phase::Done;
        if let Some(pending) = &self.pending {
            self.ctx.resolve(
                pending,
                ResponseParts {
                    status: response.status,
                    status_text: &response.status_text,
                    headers: &response.headers,
                    body: &response.body,
                    cache_status: response.cache_status,
                },
            );
        }
    }

    pub fn error(&mut self, message: &str) {
        self.settle_failed(FailureKind::Error, message);
    }

    pub fn timeout(&mut self) {
        self.settle_failed(FailureKind::Timeout, "Request timed out");
    }

    pub fn abort(&mut self) {
        self.settle_failed(FailureKind::Abort, "Request aborted");
    }

    fn settle_failed(&mut self, kind: FailureKind, message: &str) {
        if self.phase != Phase::Sent {
            return;
        }
        self.phase = Phase::Done;
        if let Some(pending) = &self.pending {
            self.ctx.fail(pending, FailureInfo::new(kind, message));
        }
    }
}

impl Drop for TrackedRequest {
    fn drop(&mut self) {
        if self.phase == Phase::Sent {
            debug!(url = %self.url, "Request dropped before settling");
            self.settle_failed(FailureKind::Dropped, "Request dropped before completion");
        }
    }
}
