// src/interception/record.rs
//! Captured records
//!
//! One [`CapturedEvent`] is stored per instrumented operation. Its correlation
//! id is assigned at begin and never changes; later stages update the stored
//! record in place until it reaches a terminal state.

use crate::interception::body::{CapturedBody, Headers};
use crate::interception::formatter::CapturedValue;
use crate::tracking::TrackedError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Record stored in the network, console and error logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CapturedEvent {
    Fetch(NetworkRecord),
    Xhr(NetworkRecord),
    Beacon(NetworkRecord),
    #[serde(rename = "websocket")]
    WebSocket(SocketRecord),
    Log(LogRecord),
    Error(TrackedError),
}

impl CapturedEvent {
    /// Correlation id shared by every stage of the operation
    pub fn id(&self) -> &str {
        match self {
            CapturedEvent::Fetch(r) | CapturedEvent::Xhr(r) | CapturedEvent::Beacon(r) => &r.id,
            CapturedEvent::WebSocket(r) => &r.id,
            CapturedEvent::Log(r) => &r.id,
            CapturedEvent::Error(r) => &r.id,
        }
    }

    /// Begin timestamp (ms)
    pub fn timestamp(&self) -> i64 {
        match self {
            CapturedEvent::Fetch(r) | CapturedEvent::Xhr(r) | CapturedEvent::Beacon(r) => {
                r.timestamp
            }
            CapturedEvent::WebSocket(r) => r.timestamp,
            CapturedEvent::Log(r) => r.timestamp,
            CapturedEvent::Error(r) => r.timestamp,
        }
    }

    /// Type tag as serialized
    pub fn kind(&self) -> &'static str {
        match self {
            CapturedEvent::Fetch(_) => "fetch",
            CapturedEvent::Xhr(_) => "xhr",
            CapturedEvent::Beacon(_) => "beacon",
            CapturedEvent::WebSocket(_) => "websocket",
            CapturedEvent::Log(_) => "log",
            CapturedEvent::Error(_) => "error",
        }
    }

    pub fn as_network(&self) -> Option<&NetworkRecord> {
        match self {
            CapturedEvent::Fetch(r) | CapturedEvent::Xhr(r) | CapturedEvent::Beacon(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_network_mut(&mut self) -> Option<&mut NetworkRecord> {
        match self {
            CapturedEvent::Fetch(r) | CapturedEvent::Xhr(r) | CapturedEvent::Beacon(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_socket_mut(&mut self) -> Option<&mut SocketRecord> {
        match self {
            CapturedEvent::WebSocket(r) => Some(r),
            _ => None,
        }
    }
}

/// Which hook produced a network record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
    Fetch,
    Xhr,
    Beacon,
}

impl NetworkKind {
    pub(crate) fn wrap(self, record: NetworkRecord) -> CapturedEvent {
        match self {
            NetworkKind::Fetch => CapturedEvent::Fetch(record),
            NetworkKind::Xhr => CapturedEvent::Xhr(record),
            NetworkKind::Beacon => CapturedEvent::Beacon(record),
        }
    }
}

/// Request lifecycle
///
/// ```text
/// Pending ──► Resolved
///    │
///    └─────► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Pending,
    Resolved,
    Failed,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestState::Pending)
    }
}

/// Request side of a network record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub method: String,
    pub url: String,
    pub headers: Headers,
    pub body: CapturedBody,
}

impl RequestInfo {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            url: url.into(),
            headers: Headers::new(),
            body: CapturedBody::Empty,
        }
    }
}

/// Response side of a network record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseInfo {
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    pub body: CapturedBody,

    /// Declared content-length, else the sanitized body length
    pub size: u64,

    /// Heuristic: fast response or caching headers present
    pub from_cache: bool,
}

/// How a request failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Error,
    Timeout,
    Abort,
    /// The request handle was dropped before a terminal event
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub message: String,
    pub kind: FailureKind,
}

impl FailureInfo {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

/// Transfer progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub loaded: u64,
    pub total: Option<u64>,
}

/// Fetch, XHR or beacon record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRecord {
    /// Correlation id
    pub id: String,
    pub timestamp: i64,
    pub state: RequestState,
    pub request: RequestInfo,
    pub response: Option<ResponseInfo>,
    pub error: Option<FailureInfo>,
    pub duration_ms: Option<u64>,
    pub progress: Option<Progress>,
}

impl NetworkRecord {
    pub fn begin(id: impl Into<String>, timestamp: i64, request: RequestInfo) -> Self {
        Self {
            id: id.into(),
            timestamp,
            state: RequestState::Pending,
            request,
            response: None,
            error: None,
            duration_ms: None,
            progress: None,
        }
    }

    /// Apply the end stage; `false` if already terminal
    pub fn resolve(&mut self, response: ResponseInfo, duration_ms: u64) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = RequestState::Resolved;
        self.response = Some(response);
        self.duration_ms = Some(duration_ms);
        true
    }

    /// Apply the error stage; `false` if already terminal
    pub fn fail(&mut self, failure: FailureInfo, duration_ms: u64) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = RequestState::Failed;
        self.error = Some(failure);
        self.duration_ms = Some(duration_ms);
        true
    }

    /// Record progress; `false` if already terminal
    pub fn record_progress(&mut self, progress: Progress) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.progress = Some(progress);
        true
    }
}

/// WebSocket connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketState {
    Connecting,
    Open,
    Closed,
    Failed,
}

impl SocketState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SocketState::Closed | SocketState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

/// One frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketMessage {
    pub direction: Direction,
    pub timestamp: i64,
    pub data: CapturedBody,
    pub size: u64,
}

/// WebSocket record with a bounded frame log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketRecord {
    /// Correlation id
    pub id: String,
    pub timestamp: i64,
    pub url: String,
    pub protocols: Vec<String>,
    pub state: SocketState,
    pub messages: VecDeque<SocketMessage>,

    /// Frames dropped from the front of `messages`
    pub dropped_messages: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub close_code: Option<u16>,
    pub close_reason: Option<String>,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
}

impl SocketRecord {
    pub fn begin(id: impl Into<String>, timestamp: i64, url: impl Into<String>, protocols: Vec<String>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            url: url.into(),
            protocols,
            state: SocketState::Connecting,
            messages: VecDeque::new(),
            dropped_messages: 0,
            bytes_sent: 0,
            bytes_received: 0,
            close_code: None,
            close_reason: None,
            error: None,
            duration_ms: None,
        }
    }

    /// Append a frame, dropping the oldest past `max_messages`
    pub fn push_message(&mut self, message: SocketMessage, max_messages: usize) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        match message.direction {
            Direction::Sent => self.bytes_sent += message.size,
            Direction::Received => self.bytes_received += message.size,
        }
        self.messages.push_back(message);
        while self.messages.len() > max_messages {
            self.messages.pop_front();
            self.dropped_messages += 1;
        }
        true
    }
}

/// Console level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Log,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Log => "log",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Console call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: String,
    pub timestamp: i64,
    pub level: LogLevel,
    pub args: Vec<CapturedValue>,

    /// Space-joined preview of `args`
    pub message: String,
}
