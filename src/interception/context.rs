// src/interception/context.rs
//! Shared capture state for every hook wrapper
//!
//! A [`CaptureContext`] owns the path from hook to subscribers:
//!
//! ```text
//! begin()  ──► push record into ring store ──► publish network:request
//!   │                                              (before the hook runs)
//!   ▼
//! PendingCapture { correlation id, entry id, start time }
//!   │
//!   ├─ resolve() ──► update stored record ──► publish network:response
//!   └─ fail()    ──► update stored record ──► publish network:error
//! ```
//!
//! If the begin record was evicted before the operation settles, the update
//! misses and nothing is published.

use crate::bus::EventBus;
use crate::events::{topics, InspectorEvent};
use crate::interception::body::{
    is_probably_cached, normalize_headers, response_size, sanitize_body, Body, Headers,
};
use crate::interception::formatter::{RawValue, ValueFormatter};
use crate::interception::record::{
    CapturedEvent, Direction, FailureInfo, LogLevel, LogRecord, NetworkKind, NetworkRecord,
    Progress, RequestInfo, ResponseInfo, SocketMessage, SocketRecord,
};
use crate::storage::BoundedRingStore;
use crate::utils::config::InspectorConfig;
use crate::utils::ids::new_correlation_id;
use crate::utils::time::SharedClock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Capture limits and heuristics
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Text bodies longer than this become placeholders
    pub max_body_chars: usize,

    /// Responses faster than this are flagged as probably cached
    pub cache_threshold_ms: u64,

    /// Frames retained per socket record
    pub max_socket_messages: usize,

    /// Console argument formatter
    pub formatter: ValueFormatter,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self::from(&InspectorConfig::default())
    }
}

impl From<&InspectorConfig> for CaptureSettings {
    fn from(config: &InspectorConfig) -> Self {
        Self {
            max_body_chars: config.network.max_body_chars,
            cache_threshold_ms: config.network.cache_threshold_ms,
            max_socket_messages: config.network.max_socket_messages,
            formatter: ValueFormatter::new(
                config.console.max_depth,
                config.console.max_entries_per_value,
                config.network.max_body_chars,
            ),
        }
    }
}

/// Handle for one in-flight operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCapture {
    /// Correlation id shared by every stage
    pub correlation_id: String,

    /// Ring store entry holding the record
    pub entry_id: String,

    /// Begin time (ms)
    pub started_at: i64,
}

/// Response data handed to [`CaptureContext::resolve`]
#[derive(Debug, Clone)]
pub struct ResponseParts<'a> {
    pub status: u16,
    pub status_text: &'a str,
    pub headers: &'a Headers,
    pub body: &'a Body,

    /// Environment-provided cache status, overriding the heuristic
    pub cache_status: Option<bool>,
}

/// Bus, stores and settings shared by the hook wrappers
#[derive(Clone)]
pub struct CaptureContext {
    bus: EventBus<InspectorEvent>,
    network: Arc<BoundedRingStore<CapturedEvent>>,
    console: Arc<BoundedRingStore<CapturedEvent>>,
    clock: SharedClock,
    settings: CaptureSettings,
    active: Arc<AtomicBool>,
}

impl CaptureContext {
    pub fn new(
        bus: EventBus<InspectorEvent>,
        network: Arc<BoundedRingStore<CapturedEvent>>,
        console: Arc<BoundedRingStore<CapturedEvent>>,
        clock: SharedClock,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            bus,
            network,
            console,
            clock,
            settings,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether wrappers should record
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Turn recording on or off for every wrapper sharing this context
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn network_store(&self) -> &Arc<BoundedRingStore<CapturedEvent>> {
        &self.network
    }

    pub fn console_store(&self) -> &Arc<BoundedRingStore<CapturedEvent>> {
        &self.console
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Persist and publish the begin record of a network operation
    ///
    /// Returns `None` while capture is inactive.
    pub fn begin(
        &self,
        kind: NetworkKind,
        method: &str,
        url: &str,
        headers: Headers,
        body: &Body,
    ) -> Option<PendingCapture> {
        if !self.is_active() {
            return None;
        }

        let correlation_id = new_correlation_id();
        let started_at = self.clock.now_ms();
        let mut request = RequestInfo::new(method, url);
        request.headers = normalize_headers(headers);
        request.body = sanitize_body(body, self.settings.max_body_chars);

        let event = kind.wrap(NetworkRecord::begin(
            correlation_id.clone(),
            started_at,
            request,
        ));
        let entry_id = self.network.push(event.clone());

        debug!(id = %correlation_id, kind = event.kind(), %method, %url, "Request captured");
        metrics::counter!("inspector_requests_captured_total", "kind" => event.kind())
            .increment(1);
        self.bus
            .publish(topics::NETWORK_REQUEST, InspectorEvent::Captured(event));

        Some(PendingCapture {
            correlation_id,
            entry_id,
            started_at,
        })
    }

    /// Apply the end stage and publish `network:response`
    ///
    /// Returns `false` when the record is gone or already terminal.
    pub fn resolve(&self, pending: &PendingCapture, response: ResponseParts<'_>) -> bool {
        let duration_ms = self.elapsed(pending);
        let body = sanitize_body(response.body, self.settings.max_body_chars);
        let headers = normalize_headers(response.headers);
        let info = ResponseInfo {
            status: response.status,
            status_text: response.status_text.to_string(),
            size: response_size(&headers, &body),
            from_cache: is_probably_cached(
                duration_ms,
                &headers,
                self.settings.cache_threshold_ms,
                response.cache_status,
            ),
            headers,
            body,
        };

        let updated = self.update_network(pending, |record| record.resolve(info, duration_ms));
        self.emit(pending, topics::NETWORK_RESPONSE, updated)
    }

    /// Apply the error stage and publish `network:error`
    pub fn fail(&self, pending: &PendingCapture, failure: FailureInfo) -> bool {
        let duration_ms = self.elapsed(pending);
        let updated = self.update_network(pending, |record| record.fail(failure, duration_ms));
        self.emit(pending, topics::NETWORK_ERROR, updated)
    }

    /// Record transfer progress and publish `network:progress`
    pub fn progress(&self, pending: &PendingCapture, loaded: u64, total: Option<u64>) -> bool {
        let updated = self.update_network(pending, |record| {
            record.record_progress(Progress { loaded, total })
        });
        self.emit(pending, topics::NETWORK_PROGRESS, updated)
    }

    /// Persist a socket record
    pub fn begin_socket(&self, url: &str, protocols: Vec<String>) -> Option<PendingCapture> {
        if !self.is_active() {
            return None;
        }

        let correlation_id = new_correlation_id();
        let started_at = self.clock.now_ms();
        let event = CapturedEvent::WebSocket(SocketRecord::begin(
            correlation_id.clone(),
            started_at,
            url,
            protocols,
        ));
        let entry_id = self.network.push(event.clone());

        debug!(id = %correlation_id, %url, "Socket captured");
        metrics::counter!("inspector_requests_captured_total", "kind" => "websocket")
            .increment(1);
        self.bus
            .publish(topics::NETWORK_REQUEST, InspectorEvent::Captured(event));

        Some(PendingCapture {
            correlation_id,
            entry_id,
            started_at,
        })
    }

    /// Append a frame to a socket record and publish `websocket:message`
    pub fn socket_message(&self, pending: &PendingCapture, direction: Direction, data: &Body) -> bool {
        let captured = sanitize_body(data, self.settings.max_body_chars);
        let size = match data {
            Body::Binary(bytes) => bytes.len() as u64,
            Body::Text(text) => text.len() as u64,
            _ => captured.size(),
        };
        let message = SocketMessage {
            direction,
            timestamp: self.clock.now_ms(),
            data: captured,
            size,
        };
        let max = self.settings.max_socket_messages;
        let updated = self.update_socket(pending, |record| record.push_message(message, max));
        self.emit(pending, topics::SOCKET_MESSAGE, updated)
    }

    /// Apply a socket state change and publish it on `topic`
    pub fn socket_transition<F>(&self, pending: &PendingCapture, topic: &str, f: F) -> bool
    where
        F: FnOnce(&mut SocketRecord, u64) -> bool,
    {
        let duration_ms = self.elapsed(pending);
        let updated = self.update_socket(pending, |record| f(record, duration_ms));
        self.emit(pending, topic, updated)
    }

    /// Record a console call and publish `console:log`
    pub fn record_log(&self, level: LogLevel, args: &[RawValue]) -> Option<String> {
        if !self.is_active() {
            return None;
        }

        let args = self.settings.formatter.format_all(args);
        let message = args
            .iter()
            .map(|arg| arg.preview())
            .collect::<Vec<_>>()
            .join(" ");
        let id = new_correlation_id();
        let event = CapturedEvent::Log(LogRecord {
            id: id.clone(),
            timestamp: self.clock.now_ms(),
            level,
            args,
            message,
        });

        self.console.push(event.clone());
        metrics::counter!("inspector_logs_captured_total", "level" => level.as_str())
            .increment(1);
        self.bus
            .publish(topics::CONSOLE_LOG, InspectorEvent::Captured(event));
        Some(id)
    }

    fn elapsed(&self, pending: &PendingCapture) -> u64 {
        (self.clock.now_ms() - pending.started_at).max(0) as u64
    }

    fn update_network<F>(&self, pending: &PendingCapture, f: F) -> Option<CapturedEvent>
    where
        F: FnOnce(&mut NetworkRecord) -> bool,
    {
        let mut updated = None;
        self.network.update(&pending.entry_id, |event| {
            if let Some(record) = event.as_network_mut() {
                if record.id == pending.correlation_id && f(record) {
                    updated = Some(event.clone());
                }
            }
        });
        updated
    }

    fn update_socket<F>(&self, pending: &PendingCapture, f: F) -> Option<CapturedEvent>
    where
        F: FnOnce(&mut SocketRecord) -> bool,
    {
        let mut updated = None;
        self.network.update(&pending.entry_id, |event| {
            if let Some(record) = event.as_socket_mut() {
                if record.id == pending.correlation_id && f(record) {
                    updated = Some(event.clone());
                }
            }
        });
        updated
    }

    fn emit(&self, pending: &PendingCapture, topic: &str, updated: Option<CapturedEvent>) -> bool {
        match updated {
            Some(event) => {
                self.bus.publish(topic, InspectorEvent::Captured(event));
                true
            }
            None => {
                debug!(
                    id = %pending.correlation_id,
                    topic,
                    "Record no longer stored or already settled; update skipped"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for CaptureContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureContext")
            .field("active", &self.is_active())
            .field("network_entries", &self.network.size())
            .field("console_entries", &self.console.size())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bus::ListenerResult;
    use crate::interception::record::{FailureKind, RequestState};
    use crate::utils::time::ManualClock;
    use parking_lot::Mutex;

    pub(crate) struct Harness {
        pub ctx: CaptureContext,
        pub clock: Arc<ManualClock>,
        pub seen: Arc<Mutex<Vec<(String, CapturedEvent)>>>,
        pub bus: EventBus<InspectorEvent>,
    }

    pub(crate) fn harness(capacity: usize) -> Harness {
        let clock = Arc::new(ManualClock::new(10_000));
        let bus: EventBus<InspectorEvent> = EventBus::default();
        let network = Arc::new(
            BoundedRingStore::new(capacity)
                .unwrap()
                .with_clock(clock.clone()),
        );
        let console = Arc::new(BoundedRingStore::new(capacity).unwrap().with_clock(clock.clone()));
        let ctx = CaptureContext::new(
            bus.clone(),
            network,
            console,
            clock.clone(),
            CaptureSettings::default(),
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        for topic in [
            topics::NETWORK_REQUEST,
            topics::NETWORK_RESPONSE,
            topics::NETWORK_ERROR,
            topics::NETWORK_PROGRESS,
            topics::SOCKET_OPEN,
            topics::SOCKET_MESSAGE,
            topics::SOCKET_CLOSE,
            topics::SOCKET_ERROR,
            topics::CONSOLE_LOG,
        ] {
            let seen = Arc::clone(&seen);
            let name = topic.to_string();
            // Subscriptions live as long as the bus.
            let _ = bus.subscribe(topic, move |event: &InspectorEvent| -> ListenerResult {
                if let Some(captured) = event.as_captured() {
                    seen.lock().push((name.clone(), captured.clone()));
                }
                Ok(())
            });
        }

        Harness { ctx, clock, seen, bus }
    }

    pub(crate) fn topics_seen(h: &Harness) -> Vec<String> {
        h.seen.lock().iter().map(|(t, _)| t.clone()).collect()
    }

    #[test]
    fn test_begin_then_resolve() {
        let h = harness(10);
        let pending = h
            .ctx
            .begin(NetworkKind::Fetch, "get", "https://api.test/a", Headers::new(), &Body::Empty)
            .unwrap();

        h.clock.advance(40);
        let headers = Headers::new();
        assert!(h.ctx.resolve(
            &pending,
            ResponseParts {
                status: 200,
                status_text: "OK",
                headers: &headers,
                body: &Body::from("{}"),
                cache_status: None,
            }
        ));

        assert_eq!(topics_seen(&h), vec!["network:request", "network:response"]);
        let seen = h.seen.lock();
        assert_eq!(seen[0].1.id(), pending.correlation_id);
        assert_eq!(seen[1].1.id(), pending.correlation_id);

        let record = h.ctx.network_store().get(&pending.entry_id).unwrap();
        let record = record.as_network().unwrap();
        assert_eq!(record.state, RequestState::Resolved);
        assert_eq!(record.duration_ms, Some(40));
        let response = record.response.as_ref().unwrap();
        assert_eq!(response.size, 2);
        assert!(!response.from_cache);
    }

    #[test]
    fn test_headers_stored_lowercase() {
        let h = harness(10);
        let mut request_headers = Headers::new();
        request_headers.insert("X-Trace".to_string(), "abc".to_string());
        let pending = h
            .ctx
            .begin(NetworkKind::Fetch, "get", "/traced", request_headers, &Body::Empty)
            .unwrap();

        h.clock.advance(500);
        let mut response_headers = Headers::new();
        response_headers.insert("X-Cache".to_string(), "HIT".to_string());
        response_headers.insert("Content-Length".to_string(), "12".to_string());
        assert!(h.ctx.resolve(
            &pending,
            ResponseParts {
                status: 200,
                status_text: "OK",
                headers: &response_headers,
                body: &Body::Empty,
                cache_status: None,
            }
        ));

        let record = h.ctx.network_store().get(&pending.entry_id).unwrap();
        let record = record.as_network().unwrap();
        assert_eq!(record.request.headers.get("x-trace").map(String::as_str), Some("abc"));
        assert!(!record.request.headers.contains_key("X-Trace"));

        let response = record.response.as_ref().unwrap();
        assert!(response.headers.contains_key("x-cache"));
        assert_eq!(response.size, 12);
        assert!(response.from_cache);
    }

    #[test]
    fn test_second_terminal_stage_is_ignored() {
        let h = harness(10);
        let pending = h
            .ctx
            .begin(NetworkKind::Xhr, "post", "/x", Headers::new(), &Body::Empty)
            .unwrap();

        assert!(h.ctx.fail(&pending, FailureInfo::new(FailureKind::Abort, "aborted")));
        assert!(!h.ctx.fail(&pending, FailureInfo::new(FailureKind::Error, "again")));
        assert_eq!(topics_seen(&h), vec!["network:request", "network:error"]);
    }

    #[test]
    fn test_evicted_begin_record_is_silent_noop() {
        let h = harness(1);
        let first = h
            .ctx
            .begin(NetworkKind::Fetch, "get", "/first", Headers::new(), &Body::Empty)
            .unwrap();
        let _second = h
            .ctx
            .begin(NetworkKind::Fetch, "get", "/second", Headers::new(), &Body::Empty)
            .unwrap();

        assert!(!h.ctx.fail(&first, FailureInfo::new(FailureKind::Error, "boom")));
        assert_eq!(topics_seen(&h), vec!["network:request", "network:request"]);
    }

    #[test]
    fn test_inactive_context_records_nothing() {
        let h = harness(10);
        h.ctx.set_active(false);
        assert!(h
            .ctx
            .begin(NetworkKind::Fetch, "get", "/", Headers::new(), &Body::Empty)
            .is_none());
        assert!(h.ctx.record_log(LogLevel::Info, &[RawValue::from("x")]).is_none());
        assert!(h.seen.lock().is_empty());
        assert_eq!(h.bus.stats().published, 0);
    }

    #[test]
    fn test_record_log_message_preview() {
        let h = harness(10);
        h.ctx
            .record_log(LogLevel::Warn, &[RawValue::from("count"), RawValue::from(3.0)])
            .unwrap();

        let logs = h.ctx.console_store().get_all();
        match &logs[0] {
            CapturedEvent::Log(record) => {
                assert_eq!(record.message, "count 3");
                assert_eq!(record.level, LogLevel::Warn);
            }
            other => panic!("unexpected record {:?}", other),
        }
    }
}
