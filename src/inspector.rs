// src/inspector.rs
//! Inspector context object
//!
//! Owns one instance of every pipeline component and wires them together.
//! There is no global: build an [`Inspector`] per session and hand its
//! wrappers to whatever owns the real entry points.
//!
//! # Architecture
//!
//! ```text
//! Inspector
//! ├─ EventBus<InspectorEvent>          shared fan-out
//! ├─ network: BoundedRingStore          fetch / xhr / beacon / websocket
//! ├─ console: BoundedRingStore          log records + grouped errors
//! ├─ ErrorTracker       ◄── network:error, console:log (error level)
//! ├─ PerformanceAggregator              frames, memory, long tasks, vitals
//! └─ CaptureContext                     handed to every wrapper
//! ```
//!
//! The bus listeners feeding the tracker hold weak references, so dropping
//! the inspector releases the tracker even while listeners remain.

use crate::bus::{BusStats, EventBus, EventBusConfig, ListenerId, ListenerResult};
use crate::events::{topics, InspectorEvent};
use crate::export::{ExportFormat, Exporter};
use crate::interception::beacon::{BeaconHook, InterceptedBeacon};
use crate::interception::console::{ConsoleHook, InterceptedConsole};
use crate::interception::context::{CaptureContext, CaptureSettings};
use crate::interception::fetch::{FetchHook, InterceptedFetch};
use crate::interception::formatter::CapturedValue;
use crate::interception::lifecycle::TrackedRequest;
use crate::interception::record::{CapturedEvent, FailureKind, LogLevel};
use crate::interception::websocket::TrackedSocket;
use crate::performance::PerformanceAggregator;
use crate::storage::{BoundedRingStore, StoreStats};
use crate::tracking::{ErrorOrigin, ErrorReport, ErrorStats, ErrorTracker, TrackOutcome};
use crate::utils::config::InspectorConfig;
use crate::utils::errors::{InspectorError, Result};
use crate::utils::time::{SharedClock, SystemClock};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Kind of hook registered under a name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HookKind {
    Fetch,
    Beacon,
    Console,
}

/// Point-in-time view of every component
#[derive(Debug, Clone, Serialize)]
pub struct InspectorSummary {
    pub bus: BusStats,
    pub network: StoreStats,
    pub console: StoreStats,
    pub errors: ErrorStats,
    pub performance: StoreStats,
    pub hooks: Vec<(String, HookKind)>,
    pub active: bool,
}

/// Capture pipeline for one session
pub struct Inspector {
    config: InspectorConfig,
    bus: EventBus<InspectorEvent>,
    network: Arc<BoundedRingStore<CapturedEvent>>,
    console: Arc<BoundedRingStore<CapturedEvent>>,
    errors: Arc<ErrorTracker>,
    performance: Arc<PerformanceAggregator>,
    ctx: CaptureContext,
    hooks: Mutex<HashMap<String, HookKind>>,
    listeners: Mutex<Vec<(&'static str, ListenerId)>>,
    shut_down: AtomicBool,
}

impl Inspector {
    /// Build an inspector on the system clock
    pub fn new(config: InspectorConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Build an inspector whose stores and trackers read `clock`
    pub fn with_clock(config: InspectorConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;

        let bus = EventBus::new(EventBusConfig::from(&config.bus));

        let network = Arc::new(
            BoundedRingStore::new(config.network.max_entries)?
                .with_name("network")
                .with_ttl(config.network.ttl_ms)
                .with_clock(Arc::clone(&clock))
                .with_on_evict(|entry| debug!(entry = %entry.id, "Network record evicted")),
        );
        let console = Arc::new(
            BoundedRingStore::new(config.console.max_entries)?
                .with_name("console")
                .with_ttl(config.console.ttl_ms)
                .with_clock(Arc::clone(&clock))
                .with_on_evict(|entry| debug!(entry = %entry.id, "Console record evicted")),
        );

        let errors = Arc::new(
            ErrorTracker::new(config.errors.clone(), bus.clone())?
                .with_clock(Arc::clone(&clock))
                .with_log_store(Arc::clone(&console)),
        );
        let performance = Arc::new(
            PerformanceAggregator::new(config.performance.clone(), bus.clone())?
                .with_clock(Arc::clone(&clock)),
        );

        let ctx = CaptureContext::new(
            bus.clone(),
            Arc::clone(&network),
            Arc::clone(&console),
            clock,
            CaptureSettings::from(&config),
        );

        let inspector = Self {
            config,
            bus,
            network,
            console,
            errors,
            performance,
            ctx,
            hooks: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        };
        inspector.connect_error_feeds();

        info!(
            network_capacity = inspector.config.network.max_entries,
            console_capacity = inspector.config.console.max_entries,
            "Inspector created"
        );
        Ok(inspector)
    }

    fn connect_error_feeds(&self) {
        let tracker = Arc::downgrade(&self.errors);
        let network = self.bus.subscribe(topics::NETWORK_ERROR, move |event| {
            forward_network_error(&tracker, event)
        });

        let tracker = Arc::downgrade(&self.errors);
        let console = self.bus.subscribe(topics::CONSOLE_LOG, move |event| {
            forward_console_error(&tracker, event)
        });

        let mut listeners = self.listeners.lock();
        listeners.push((topics::NETWORK_ERROR, network.id()));
        listeners.push((topics::CONSOLE_LOG, console.id()));
    }

    pub fn config(&self) -> &InspectorConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus<InspectorEvent> {
        &self.bus
    }

    /// Network, beacon and socket records
    pub fn network(&self) -> &Arc<BoundedRingStore<CapturedEvent>> {
        &self.network
    }

    /// Console records and grouped errors
    pub fn console(&self) -> &Arc<BoundedRingStore<CapturedEvent>> {
        &self.console
    }

    pub fn errors(&self) -> &Arc<ErrorTracker> {
        &self.errors
    }

    pub fn performance(&self) -> &Arc<PerformanceAggregator> {
        &self.performance
    }

    /// Context for hand-built wrappers
    pub fn capture_context(&self) -> &CaptureContext {
        &self.ctx
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Wrap an asynchronous network hook
    pub fn wrap_fetch<H: FetchHook>(&self, name: &str, hook: H) -> Result<InterceptedFetch<H>> {
        self.register(name, HookKind::Fetch)?;
        Ok(InterceptedFetch::new(hook, self.ctx.clone()))
    }

    /// Wrap a beacon hook
    pub fn wrap_beacon<H: BeaconHook>(&self, name: &str, hook: H) -> Result<InterceptedBeacon<H>> {
        self.register(name, HookKind::Beacon)?;
        Ok(InterceptedBeacon::new(hook, self.ctx.clone()))
    }

    /// Wrap a logging hook
    pub fn wrap_console<H: ConsoleHook>(
        &self,
        name: &str,
        hook: H,
    ) -> Result<InterceptedConsole<H>> {
        self.register(name, HookKind::Console)?;
        Ok(InterceptedConsole::new(hook, self.ctx.clone()))
    }

    /// Forget a registration so the name can be wrapped again
    pub fn release(&self, name: &str) -> bool {
        let released = self.hooks.lock().remove(name).is_some();
        if released {
            debug!(hook = %name, "Hook released");
        }
        released
    }

    /// Registered hook names, sorted
    pub fn hooks(&self) -> Vec<(String, HookKind)> {
        let mut hooks: Vec<_> = self
            .hooks
            .lock()
            .iter()
            .map(|(name, kind)| (name.clone(), *kind))
            .collect();
        hooks.sort();
        hooks
    }

    fn register(&self, name: &str, kind: HookKind) -> Result<()> {
        if self.is_shut_down() {
            return Err(InspectorError::ShutDown);
        }

        let mut hooks = self.hooks.lock();
        if hooks.contains_key(name) {
            warn!(hook = %name, "Hook registered twice");
            return Err(InspectorError::DuplicateRegistration(name.to_string()));
        }
        hooks.insert(name.to_string(), kind);
        debug!(hook = %name, ?kind, "Hook registered");
        Ok(())
    }

    /// New lifecycle (XHR-style) request
    pub fn tracked_request(&self) -> TrackedRequest {
        TrackedRequest::new(self.ctx.clone())
    }

    /// New socket record; the socket starts in `connecting`
    pub fn tracked_socket(&self, url: &str, protocols: &[&str]) -> TrackedSocket {
        TrackedSocket::connect(self.ctx.clone(), url, protocols)
    }

    /// Report an error from a global handler or an explicit capture call
    pub fn capture_error(&self, report: &Arc<ErrorReport>) -> TrackOutcome {
        if self.is_shut_down() {
            return TrackOutcome::Ignored;
        }
        self.errors.track(report)
    }

    /// Start background performance publishing
    pub fn start(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(InspectorError::ShutDown);
        }
        self.performance.start()
    }

    /// Render captured records
    ///
    /// HAR covers network records only; JSON includes console records too,
    /// ordered by timestamp.
    pub fn export(&self, format: ExportFormat) -> Result<String> {
        let mut events = self.network.get_all();
        if format == ExportFormat::Json {
            events.extend(self.console.get_all());
            events.sort_by_key(CapturedEvent::timestamp);
        }
        Exporter::new(format).export(&events)
    }

    pub fn summary(&self) -> InspectorSummary {
        InspectorSummary {
            bus: self.bus.stats(),
            network: self.network.stats(),
            console: self.console.stats(),
            errors: self.errors.stats(),
            performance: self.performance.slot_stats(),
            hooks: self.hooks(),
            active: self.ctx.is_active(),
        }
    }

    /// Stop capturing and release subscriptions
    ///
    /// Wrappers handed out earlier keep working but pass straight through.
    /// Stored records stay readable. Repeated calls are no-ops.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        self.ctx.set_active(false);
        self.performance.stop();
        self.performance.flush_pending();

        for (topic, id) in self.listeners.lock().drain(..) {
            self.bus.unsubscribe(topic, id);
        }
        self.bus.clear();

        let released = {
            let mut hooks = self.hooks.lock();
            let count = hooks.len();
            hooks.clear();
            count
        };

        info!(hooks = released, "Inspector shut down");
    }
}

impl Drop for Inspector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Inspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inspector")
            .field("network", &self.network.size())
            .field("console", &self.console.size())
            .field("hooks", &self.hooks.lock().len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

fn forward_network_error(tracker: &Weak<ErrorTracker>, event: &InspectorEvent) -> ListenerResult {
    let Some(tracker) = tracker.upgrade() else {
        return Ok(());
    };
    let Some(record) = event.as_captured().and_then(CapturedEvent::as_network) else {
        return Ok(());
    };
    let Some(failure) = &record.error else {
        return Ok(());
    };
    if failure.kind == FailureKind::Abort {
        return Ok(());
    }

    let location = record
        .request
        .url
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_string();
    let report = ErrorReport::new(
        "NetworkError",
        format!(
            "{} {} failed: {}",
            record.request.method, record.request.url, failure.message
        ),
    )
    .with_source(location, 0, 0)
    .with_origin(ErrorOrigin::Network);

    tracker.track_report(report);
    Ok(())
}

fn forward_console_error(tracker: &Weak<ErrorTracker>, event: &InspectorEvent) -> ListenerResult {
    let Some(tracker) = tracker.upgrade() else {
        return Ok(());
    };
    let Some(CapturedEvent::Log(record)) = event.as_captured() else {
        return Ok(());
    };
    if record.level != LogLevel::Error {
        return Ok(());
    }

    let described = record.args.iter().find_map(|arg| match arg {
        CapturedValue::Error { error } => Some(error),
        _ => None,
    });
    if let Some(shared) = described.and_then(|error| error.report.upgrade()) {
        tracker.track(&shared);
        return Ok(());
    }

    let report = match described {
        Some(error) => {
            let report = ErrorReport::new(error.name.clone(), error.message.clone());
            match &error.stack {
                Some(stack) => report.with_stack(stack.clone()),
                None => report,
            }
        }
        None => ErrorReport::new("ConsoleError", record.message.clone()),
    };

    tracker.track_report(report.with_origin(ErrorOrigin::Console));
    Ok(())
}
