// src/events.rs
//! Bus payloads and topic names

use crate::bus::ListenerFailure;
use crate::interception::record::CapturedEvent;
use crate::performance::PerformanceSnapshot;
use crate::tracking::TrackedError;

/// Topic names
pub mod topics {
    /// A network request began
    pub const NETWORK_REQUEST: &str = "network:request";

    /// A network request completed
    pub const NETWORK_RESPONSE: &str = "network:response";

    /// A network request failed
    pub const NETWORK_ERROR: &str = "network:error";

    /// Upload/download progress for a lifecycle request
    pub const NETWORK_PROGRESS: &str = "network:progress";

    /// A WebSocket frame was sent or received
    pub const SOCKET_MESSAGE: &str = "websocket:message";

    /// A WebSocket connection opened
    pub const SOCKET_OPEN: &str = "websocket:open";

    /// A WebSocket connection closed
    pub const SOCKET_CLOSE: &str = "websocket:close";

    /// A WebSocket connection failed
    pub const SOCKET_ERROR: &str = "websocket:error";

    /// A console call was recorded
    pub const CONSOLE_LOG: &str = "console:log";

    /// An error was grouped and forwarded
    pub const ERROR_TRACKED: &str = "error:tracked";

    /// Coalesced performance snapshot
    pub const PERFORMANCE_UPDATE: &str = "performance:update";

    pub use crate::bus::ERROR_TOPIC as LISTENER_ERROR;
}

/// Everything published on the inspector bus
#[derive(Debug, Clone)]
pub enum InspectorEvent {
    /// Network, socket or console record (begin, update or terminal stage)
    Captured(CapturedEvent),

    /// Deduplicated error with its group id attached
    ErrorTracked(TrackedError),

    /// Latest performance values
    Performance(PerformanceSnapshot),

    /// A bus listener failed (capture-rejections mode)
    ListenerFailed(ListenerFailure),
}

impl From<ListenerFailure> for InspectorEvent {
    fn from(failure: ListenerFailure) -> Self {
        InspectorEvent::ListenerFailed(failure)
    }
}

impl InspectorEvent {
    /// Captured record, if this is one
    pub fn as_captured(&self) -> Option<&CapturedEvent> {
        match self {
            InspectorEvent::Captured(event) => Some(event),
            _ => None,
        }
    }
}
