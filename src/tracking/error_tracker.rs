// src/tracking/error_tracker.rs
//! Error grouping and forwarding
//!
//! Every report passes through four stages:
//!
//! 1. **Identity**: the same `Arc<ErrorReport>` is handled once, even when a
//!    global handler and an explicit call both see it
//! 2. **Ignore rules**: noisy messages are dropped before any grouping work
//! 3. **Grouping**: the fingerprint selects (or creates) an [`ErrorGroup`];
//!    the group keeps a bounded FIFO of samples
//! 4. **Forwarding**: the [`TrackedError`] is written to the error log and
//!    published on `error:tracked`, subject to a per-window rate limit

use crate::bus::EventBus;
use crate::events::{topics, InspectorEvent};
use crate::interception::record::CapturedEvent;
use crate::storage::BoundedRingStore;
use crate::tracking::fingerprint::{fingerprint, SourceLocation};
use crate::tracking::stack::{parse_stack, StackFrame};
use crate::utils::config::ErrorTrackerConfig;
use crate::utils::errors::{InspectorError, Result};
use crate::utils::ids::new_correlation_id;
use crate::utils::time::{SharedClock, SystemClock};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Number of individual errors returned by `recent_errors`
pub const RECENT_ERRORS: usize = 10;

/// Identity entries are pruned once the table grows past this
const IDENTITY_PRUNE_THRESHOLD: usize = 512;

/// Where an error was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorOrigin {
    /// Global uncaught-error handler
    Uncaught,
    /// Unhandled promise rejection
    UnhandledRejection,
    /// `console.error` call
    Console,
    /// Failed network request
    Network,
    /// Explicit capture call
    Manual,
}

/// Raw error occurrence
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
    pub error_type: String,
    pub message: String,
    pub stack: Option<String>,
    pub source: Option<SourceLocation>,
    pub origin: ErrorOrigin,
}

impl ErrorReport {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            stack: None,
            source: None,
            origin: ErrorOrigin::Manual,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_source(mut self, file: impl Into<String>, line: u32, column: u32) -> Self {
        self.source = Some(SourceLocation {
            file: file.into(),
            line,
            column,
        });
        self
    }

    pub fn with_origin(mut self, origin: ErrorOrigin) -> Self {
        self.origin = origin;
        self
    }

    fn has_stack(&self) -> bool {
        self.stack.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
    }
}

/// Non-owning reference to a shared [`ErrorReport`]
///
/// Travels with formatted error values so a report logged to the console
/// keeps its identity. Equality is pointer equality.
#[derive(Debug, Clone, Default)]
pub struct ReportHandle(Weak<ErrorReport>);

impl ReportHandle {
    pub fn upgrade(&self) -> Option<Arc<ErrorReport>> {
        self.0.upgrade()
    }
}

impl From<&Arc<ErrorReport>> for ReportHandle {
    fn from(report: &Arc<ErrorReport>) -> Self {
        Self(Arc::downgrade(report))
    }
}

impl PartialEq for ReportHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0.ptr_eq(&other.0)
    }
}

impl Eq for ReportHandle {}

/// Grouped error as forwarded to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedError {
    pub id: String,
    pub group_id: String,
    pub fingerprint: String,
    pub error_type: String,
    pub message: String,
    pub stack: Option<String>,
    pub frames: Vec<StackFrame>,
    pub source: Option<SourceLocation>,
    pub origin: ErrorOrigin,
    pub timestamp: i64,
}

/// Errors sharing a fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorGroup {
    pub id: String,
    pub fingerprint: String,
    pub error_type: String,

    /// Message of the first occurrence
    pub message: String,

    /// Occurrences since the group was created
    pub count: u64,
    pub first_seen: i64,
    pub last_seen: i64,

    /// Most recent samples, oldest first
    pub errors: VecDeque<TrackedError>,
}

/// Tracker counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorStats {
    /// Errors that reached grouping
    pub total: u64,

    /// Live groups
    pub groups: usize,

    /// Grouped errors per error type
    pub by_type: BTreeMap<String, u64>,

    /// Dropped by ignore rules
    pub ignored: u64,

    /// Dropped as repeated reports of the same instance
    pub duplicates: u64,

    /// Grouped but not forwarded because of the rate limit
    pub throttled: u64,

    /// Groups dropped to stay under `max_groups`
    pub evicted_groups: u64,
}

/// Result of [`ErrorTracker::track`]
#[derive(Debug, Clone, PartialEq)]
pub enum TrackOutcome {
    /// Grouped and forwarded
    Tracked(TrackedError),
    /// Grouped, forwarding suppressed by the rate limit
    Throttled(TrackedError),
    /// Matched an ignore rule
    Ignored,
    /// This report instance was already tracked
    Duplicate,
}

impl TrackOutcome {
    pub fn tracked(&self) -> Option<&TrackedError> {
        match self {
            TrackOutcome::Tracked(e) | TrackOutcome::Throttled(e) => Some(e),
            _ => None,
        }
    }
}

struct TrackerState {
    /// fingerprint → group
    groups: HashMap<String, ErrorGroup>,
    /// group id → fingerprint
    group_ids: HashMap<String, String>,
    seen: HashMap<usize, Weak<ErrorReport>>,
    stats: ErrorStats,
    window_start: i64,
    window_count: u32,
}

impl TrackerState {
    fn new() -> Self {
        Self {
            groups: HashMap::new(),
            group_ids: HashMap::new(),
            seen: HashMap::new(),
            stats: ErrorStats::default(),
            window_start: i64::MIN,
            window_count: 0,
        }
    }

    /// Record `report` as seen; `false` if this instance was seen before
    fn first_sighting(&mut self, report: &Arc<ErrorReport>) -> bool {
        let key = Arc::as_ptr(report) as usize;
        if let Some(existing) = self.seen.get(&key).and_then(Weak::upgrade) {
            if Arc::ptr_eq(&existing, report) {
                return false;
            }
        }

        if self.seen.len() >= IDENTITY_PRUNE_THRESHOLD {
            self.seen.retain(|_, weak| weak.strong_count() > 0);
        }
        self.seen.insert(key, Arc::downgrade(report));
        true
    }

    fn evict_stalest_group(&mut self) -> Option<ErrorGroup> {
        let stalest = self
            .groups
            .values()
            .min_by_key(|g| g.last_seen)
            .map(|g| g.fingerprint.clone())?;
        let group = self.groups.remove(&stalest)?;
        self.group_ids.remove(&group.id);
        self.stats.evicted_groups += 1;
        Some(group)
    }
}

/// Deduplicating, grouping error tracker
pub struct ErrorTracker {
    config: ErrorTrackerConfig,
    ignore: Vec<Regex>,
    bus: EventBus<InspectorEvent>,
    clock: SharedClock,
    log: BoundedRingStore<TrackedError>,
    sink: Option<Arc<BoundedRingStore<CapturedEvent>>>,
    state: Mutex<TrackerState>,
}

impl ErrorTracker {
    pub fn new(config: ErrorTrackerConfig, bus: EventBus<InspectorEvent>) -> Result<Self> {
        if config.max_groups == 0
            || config.max_samples_per_group == 0
            || config.max_forwards_per_window == 0
            || config.forward_window_ms == 0
        {
            return Err(InspectorError::InvalidConfig(
                "error tracker limits must be greater than 0".to_string(),
            ));
        }

        let ignore = config
            .ignore_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    InspectorError::InvalidConfig(format!("ignore pattern '{}': {}", pattern, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            patterns = ignore.len(),
            max_groups = config.max_groups,
            "Error tracker created"
        );

        Ok(Self {
            config,
            ignore,
            bus,
            clock: SystemClock::shared(),
            log: BoundedRingStore::new(RECENT_ERRORS)?.with_name("errors"),
            sink: None,
            state: Mutex::new(TrackerState::new()),
        })
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.log = self.log.with_clock(Arc::clone(&clock));
        self.clock = clock;
        self
    }

    /// Also write every grouped error into `store`
    pub fn with_log_store(mut self, store: Arc<BoundedRingStore<CapturedEvent>>) -> Self {
        self.sink = Some(store);
        self
    }

    /// Whether `message` matches an ignore rule
    pub fn is_ignored(&self, report: &ErrorReport) -> bool {
        if self.ignore.iter().any(|re| re.is_match(&report.message)) {
            return true;
        }
        let opaque = matches!(report.message.trim(), "Script error." | "Script error");
        opaque && !report.has_stack()
    }

    /// Convenience for reports without a shared instance
    pub fn track_report(&self, report: ErrorReport) -> TrackOutcome {
        self.track(&Arc::new(report))
    }

    /// Group and forward one error occurrence
    pub fn track(&self, report: &Arc<ErrorReport>) -> TrackOutcome {
        let now = self.clock.now_ms();

        let (tracked, forward) = {
            let mut state = self.state.lock();

            if !state.first_sighting(report) {
                state.stats.duplicates += 1;
                debug!(message = %report.message, "Error instance already tracked");
                return TrackOutcome::Duplicate;
            }

            if self.is_ignored(report) {
                state.stats.ignored += 1;
                debug!(message = %report.message, "Error ignored");
                return TrackOutcome::Ignored;
            }

            let frames = report.stack.as_deref().map(parse_stack).unwrap_or_default();
            let key = fingerprint(&report.error_type, &report.message, &frames, report.source.as_ref());

            if !state.groups.contains_key(&key) && state.groups.len() >= self.config.max_groups {
                if let Some(dropped) = state.evict_stalest_group() {
                    debug!(group = %dropped.id, count = dropped.count, "Error group evicted");
                }
            }

            let state = &mut *state;
            let group = state.groups.entry(key.clone()).or_insert_with(|| ErrorGroup {
                id: new_correlation_id(),
                fingerprint: key.clone(),
                error_type: report.error_type.clone(),
                message: report.message.clone(),
                count: 0,
                first_seen: now,
                last_seen: now,
                errors: VecDeque::new(),
            });
            if group.count == 0 {
                state.group_ids.insert(group.id.clone(), key.clone());
            }

            let tracked = TrackedError {
                id: new_correlation_id(),
                group_id: group.id.clone(),
                fingerprint: key,
                error_type: report.error_type.clone(),
                message: report.message.clone(),
                stack: report.stack.clone(),
                frames,
                source: report.source.clone(),
                origin: report.origin,
                timestamp: now,
            };

            group.count += 1;
            group.last_seen = now;
            group.errors.push_back(tracked.clone());
            while group.errors.len() > self.config.max_samples_per_group {
                group.errors.pop_front();
            }

            state.stats.total += 1;
            *state
                .stats
                .by_type
                .entry(report.error_type.clone())
                .or_insert(0) += 1;

            let window = self.config.forward_window_ms as i64;
            if now.saturating_sub(state.window_start) >= window {
                state.window_start = now;
                state.window_count = 0;
            }
            let forward = state.window_count < self.config.max_forwards_per_window;
            if forward {
                state.window_count += 1;
            } else {
                state.stats.throttled += 1;
            }

            (tracked, forward)
        };

        metrics::counter!("inspector_errors_tracked_total", "type" => tracked.error_type.clone())
            .increment(1);
        self.log.push(tracked.clone());
        if let Some(sink) = &self.sink {
            sink.push(CapturedEvent::Error(tracked.clone()));
        }

        if forward {
            self.bus.publish(
                topics::ERROR_TRACKED,
                InspectorEvent::ErrorTracked(tracked.clone()),
            );
            TrackOutcome::Tracked(tracked)
        } else {
            warn!(group = %tracked.group_id, "Error forwarding throttled");
            TrackOutcome::Throttled(tracked)
        }
    }

    /// All groups, most recently seen first
    pub fn groups(&self) -> Vec<ErrorGroup> {
        let mut groups: Vec<_> = self.state.lock().groups.values().cloned().collect();
        groups.sort_by(|a, b| {
            b.last_seen
                .cmp(&a.last_seen)
                .then_with(|| b.count.cmp(&a.count))
        });
        groups
    }

    pub fn group(&self, id: &str) -> Option<ErrorGroup> {
        let state = self.state.lock();
        let key = state.group_ids.get(id)?;
        state.groups.get(key).cloned()
    }

    pub fn stats(&self) -> ErrorStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.groups = state.groups.len();
        stats
    }

    /// The most recent grouped errors across all groups, newest first
    pub fn recent_errors(&self) -> Vec<TrackedError> {
        let mut recent = self.log.get_all();
        recent.reverse();
        recent
    }

    /// Drop all groups, counters and identity records
    pub fn clear(&self) {
        *self.state.lock() = TrackerState::new();
        self.log.clear();
        info!("Error tracker cleared");
    }
}

impl std::fmt::Debug for ErrorTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorTracker")
            .field("config", &self.config)
            .field("groups", &self.state.lock().groups.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ListenerResult;
    use crate::utils::time::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const POLL_STACK: &str = "Error: Timeout\n    at poll (https://app.test/poll.js:9:3)";

    fn tracker(config: ErrorTrackerConfig) -> (ErrorTracker, Arc<ManualClock>, EventBus<InspectorEvent>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let bus = EventBus::default();
        let tracker = ErrorTracker::new(config, bus.clone())
            .unwrap()
            .with_clock(clock.clone());
        (tracker, clock, bus)
    }

    fn timeout(ms: u32) -> ErrorReport {
        ErrorReport::new("Error", format!("Timeout after {}ms", ms)).with_stack(POLL_STACK)
    }

    #[test]
    fn test_dynamic_values_collapse_into_one_group() {
        let (tracker, clock, _) = tracker(ErrorTrackerConfig::default());
        tracker.track_report(timeout(123));
        clock.advance(10);
        tracker.track_report(timeout(987));

        let groups = tracker.groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].first_seen, 1_000);
        assert_eq!(groups[0].last_seen, 1_010);
        assert_eq!(groups[0].message, "Timeout after 123ms");
    }

    #[test]
    fn test_samples_are_bounded() {
        let (tracker, _, _) = tracker(ErrorTrackerConfig::default());
        for n in 0..25 {
            tracker.track_report(timeout(n));
        }

        let group = &tracker.groups()[0];
        assert_eq!(group.count, 25);
        assert_eq!(group.errors.len(), 10);
        assert_eq!(group.errors.front().unwrap().message, "Timeout after 15ms");
        assert_eq!(group.errors.back().unwrap().message, "Timeout after 24ms");
    }

    #[test]
    fn test_same_instance_tracked_once() {
        let (tracker, _, _) = tracker(ErrorTrackerConfig::default());
        let report = Arc::new(timeout(5));

        assert!(matches!(tracker.track(&report), TrackOutcome::Tracked(_)));
        assert_eq!(tracker.track(&report), TrackOutcome::Duplicate);

        // Equal value, different instance
        let twin = Arc::new(timeout(5));
        assert!(matches!(tracker.track(&twin), TrackOutcome::Tracked(_)));

        let stats = tracker.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.duplicates, 1);
    }

    #[test]
    fn test_ignore_rules() {
        let (tracker, _, _) = tracker(ErrorTrackerConfig::default());

        let outcomes = [
            tracker.track_report(ErrorReport::new("Error", "ResizeObserver loop limit exceeded")),
            tracker.track_report(ErrorReport::new("Error", "Script error.")),
            tracker.track_report(ErrorReport::new("TypeError", "Failed to fetch")),
        ];
        assert!(outcomes.iter().all(|o| *o == TrackOutcome::Ignored));
        assert_eq!(tracker.stats().ignored, 3);
        assert!(tracker.groups().is_empty());
    }

    #[test]
    fn test_opaque_message_without_stack_ignored_even_without_patterns() {
        let config = ErrorTrackerConfig {
            ignore_patterns: vec![],
            ..Default::default()
        };
        let (tracker, _, _) = tracker(config);

        assert_eq!(
            tracker.track_report(ErrorReport::new("Error", "Script error.")),
            TrackOutcome::Ignored
        );
        let with_stack = ErrorReport::new("Error", "Script error.").with_stack(POLL_STACK);
        assert!(tracker.track_report(with_stack).tracked().is_some());
    }

    #[test]
    fn test_group_id_attached_and_published() {
        let (tracker, _, bus) = tracker(ErrorTrackerConfig::default());
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let _sub = bus.subscribe(topics::ERROR_TRACKED, move |event: &InspectorEvent| -> ListenerResult {
            if let InspectorEvent::ErrorTracked(e) = event {
                sink.lock().push(e.clone());
            }
            Ok(())
        });

        let outcome = tracker.track_report(timeout(1));
        let tracked = outcome.tracked().unwrap();
        let group = tracker.group(&tracked.group_id).unwrap();
        assert_eq!(group.fingerprint, tracked.fingerprint);
        assert_eq!(received.lock().as_slice(), &[tracked.clone()]);
        assert_eq!(tracked.frames[0].function.as_deref(), Some("poll"));
    }

    #[test]
    fn test_rate_limit_still_groups() {
        let config = ErrorTrackerConfig {
            max_forwards_per_window: 2,
            forward_window_ms: 1_000,
            ..Default::default()
        };
        let (tracker, clock, bus) = tracker(config);
        let published = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&published);
        let _sub = bus.subscribe(topics::ERROR_TRACKED, move |_: &InspectorEvent| -> ListenerResult {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        for n in 0..4 {
            tracker.track_report(timeout(n));
        }
        assert_eq!(published.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.stats().throttled, 2);
        assert_eq!(tracker.groups()[0].count, 4);

        clock.advance(1_000);
        assert!(matches!(tracker.track_report(timeout(9)), TrackOutcome::Tracked(_)));
        assert_eq!(published.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_max_groups_drops_stalest() {
        let config = ErrorTrackerConfig {
            max_groups: 2,
            ..Default::default()
        };
        let (tracker, clock, _) = tracker(config);

        tracker.track_report(ErrorReport::new("A", "first").with_source("a.js", 1, 1));
        clock.advance(1);
        tracker.track_report(ErrorReport::new("B", "second").with_source("b.js", 1, 1));
        clock.advance(1);
        tracker.track_report(ErrorReport::new("A", "first").with_source("a.js", 1, 1));
        clock.advance(1);
        tracker.track_report(ErrorReport::new("C", "third").with_source("c.js", 1, 1));

        let types: Vec<_> = tracker.groups().into_iter().map(|g| g.error_type).collect();
        assert_eq!(types, vec!["C".to_string(), "A".to_string()]);
        assert_eq!(tracker.stats().evicted_groups, 1);
    }

    #[test]
    fn test_stats_and_recent_errors() {
        let (tracker, clock, _) = tracker(ErrorTrackerConfig::default());
        for n in 0..12 {
            clock.advance(1);
            let kind = if n % 3 == 0 { "TypeError" } else { "Error" };
            tracker.track_report(ErrorReport::new(kind, format!("e{}", n)).with_source("x.js", n, 0));
        }

        let stats = tracker.stats();
        assert_eq!(stats.by_type.get("TypeError"), Some(&4));
        assert_eq!(stats.by_type.get("Error"), Some(&8));

        let recent = tracker.recent_errors();
        assert_eq!(recent.len(), RECENT_ERRORS);
        assert_eq!(recent[0].message, "e11");
        assert_eq!(recent[9].message, "e2");

        tracker.clear();
        assert!(tracker.groups().is_empty());
        assert_eq!(tracker.stats(), ErrorStats::default());
        assert!(tracker.recent_errors().is_empty());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let config = ErrorTrackerConfig {
            ignore_patterns: vec!["(unclosed".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            ErrorTracker::new(config, EventBus::default()),
            Err(InspectorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_forward_budget_rejected() {
        let config = ErrorTrackerConfig {
            max_forwards_per_window: 0,
            ..Default::default()
        };
        assert!(matches!(
            ErrorTracker::new(config, EventBus::default()),
            Err(InspectorError::InvalidConfig(_))
        ));
    }
}
