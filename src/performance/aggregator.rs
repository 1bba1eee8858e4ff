// src/performance/aggregator.rs
//! Performance sampling and throttled fan-out
//!
//! Samples land in a [`BoundedIndexStore`] under fixed slot keys, one latest
//! value per slot. Every change asks for a publish; publishes are spaced at
//! least `publish_interval_ms` apart and changes inside the window are
//! coalesced into one trailing publish by [`PerformanceAggregator::flush_pending`].
//!
//! ```text
//! record_frame ─┐
//! record_memory ─┼─► slots { fps, memory, metrics, longTasks }
//! record_task  ─┤          │
//! record_vital ─┘          ▼
//!                 throttle (leading + trailing edge) ──► performance:update
//! ```

use crate::bus::EventBus;
use crate::events::{topics, InspectorEvent};
use crate::performance::vitals::{Rating, WebVital, WebVitals};
use crate::storage::{BoundedIndexStore, StoreStats};
use crate::utils::config::PerformanceConfig;
use crate::utils::errors::{InspectorError, Result};
use crate::utils::time::{SharedClock, SystemClock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Slot keys
pub mod slots {
    pub const FPS: &str = "fps";
    pub const MEMORY: &str = "memory";
    pub const METRICS: &str = "metrics";
    pub const LONG_TASKS: &str = "longTasks";
}

/// Frame rate over one reporting interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FpsSample {
    pub fps: f64,
    pub frames: u32,
    pub min_frame_ms: f64,
    pub max_frame_ms: f64,
    pub timestamp: i64,
}

/// Heap figures exposed by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub limit_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemorySample {
    pub info: MemoryInfo,

    /// `used / limit` as a percentage, 0 when the limit is unknown
    pub usage_percent: f64,
    pub timestamp: i64,
}

/// Host hook for memory figures
pub trait MemorySource: Send + Sync {
    /// `None` when the host exposes no memory information
    fn memory(&self) -> Option<MemoryInfo>;
}

impl<F> MemorySource for F
where
    F: Fn() -> Option<MemoryInfo> + Send + Sync,
{
    fn memory(&self) -> Option<MemoryInfo> {
        self()
    }
}

/// A unit of work over the long-task threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongTask {
    pub name: String,
    pub start_ms: f64,
    pub duration_ms: f64,

    /// Time past the threshold
    pub blocking_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LongTaskSummary {
    pub count: u64,
    pub total_blocking_ms: f64,

    /// Most recent tasks, oldest first
    pub recent: VecDeque<LongTask>,
}

/// Value stored in a slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "slot", content = "value", rename_all = "camelCase")]
pub enum PerfValue {
    Fps(FpsSample),
    Memory(MemorySample),
    Metrics(WebVitals),
    LongTasks(LongTaskSummary),
}

/// Latest value of every slot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub fps: Option<FpsSample>,
    pub memory: Option<MemorySample>,
    pub vitals: WebVitals,
    pub long_tasks: LongTaskSummary,
    pub timestamp: i64,
}

#[derive(Default)]
struct FrameWindow {
    last_frame: Option<f64>,
    elapsed: f64,
    frames: u32,
    min: f64,
    max: f64,
}

impl FrameWindow {
    fn reset(&mut self) {
        self.elapsed = 0.0;
        self.frames = 0;
        self.min = 0.0;
        self.max = 0.0;
    }
}

#[derive(Default)]
struct Throttle {
    last_publish: Option<i64>,
    pending: bool,
}

/// Frame, memory, long-task and vitals aggregator
pub struct PerformanceAggregator {
    config: PerformanceConfig,
    bus: EventBus<InspectorEvent>,
    clock: SharedClock,
    slots: BoundedIndexStore<String, PerfValue>,
    frames: Mutex<FrameWindow>,
    vitals: Mutex<WebVitals>,
    long_tasks: Mutex<LongTaskSummary>,
    throttle: Mutex<Throttle>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PerformanceAggregator {
    pub fn new(config: PerformanceConfig, bus: EventBus<InspectorEvent>) -> Result<Self> {
        if config.fps_interval_ms == 0 {
            return Err(InspectorError::InvalidConfig(
                "fps interval must be greater than 0".to_string(),
            ));
        }

        let slots = BoundedIndexStore::new(config.slot_capacity)?
            .with_name("performance")
            .with_ttl(config.slot_ttl_ms)
            .with_on_evict(|key: &String, _entry| debug!(slot = %key, "Performance slot evicted"));

        Ok(Self {
            config,
            bus,
            clock: SystemClock::shared(),
            slots,
            frames: Mutex::new(FrameWindow::default()),
            vitals: Mutex::new(WebVitals::default()),
            long_tasks: Mutex::new(LongTaskSummary::default()),
            throttle: Mutex::new(Throttle::default()),
            task: Mutex::new(None),
        })
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.slots.set_clock(Arc::clone(&clock));
        self.clock = clock;
        self
    }

    /// Animation-frame callback at `timestamp_ms` (high-resolution time)
    ///
    /// Returns the sample when a reporting interval completed.
    pub fn record_frame(&self, timestamp_ms: f64) -> Option<FpsSample> {
        if !timestamp_ms.is_finite() {
            return None;
        }
        let sample = {
            let mut window = self.frames.lock();
            let previous = window.last_frame.replace(timestamp_ms);
            let delta = timestamp_ms - previous?;
            if delta <= 0.0 {
                return None;
            }

            if window.frames == 0 {
                window.min = delta;
                window.max = delta;
            } else {
                window.min = window.min.min(delta);
                window.max = window.max.max(delta);
            }
            window.frames += 1;
            window.elapsed += delta;

            if window.elapsed < self.config.fps_interval_ms as f64 {
                return None;
            }

            let sample = FpsSample {
                fps: (window.frames as f64 * 1_000.0 / window.elapsed * 10.0).round() / 10.0,
                frames: window.frames,
                min_frame_ms: window.min,
                max_frame_ms: window.max,
                timestamp: self.clock.now_ms(),
            };
            window.reset();
            sample
        };

        self.slots.set(slots::FPS.to_string(), PerfValue::Fps(sample));
        self.changed();
        Some(sample)
    }

    pub fn record_memory(&self, info: MemoryInfo) -> MemorySample {
        let usage_percent = if info.limit_bytes > 0 {
            info.used_bytes as f64 / info.limit_bytes as f64 * 100.0
        } else {
            0.0
        };
        let sample = MemorySample {
            info,
            usage_percent,
            timestamp: self.clock.now_ms(),
        };

        self.slots.set(slots::MEMORY.to_string(), PerfValue::Memory(sample));
        self.changed();
        sample
    }

    /// Read memory from the host; a host without figures is skipped
    pub fn sample_memory(&self, source: &dyn MemorySource) -> Option<MemorySample> {
        source.memory().map(|info| self.record_memory(info))
    }

    /// Report a unit of work; returns `true` if it counted as a long task
    pub fn record_task(&self, name: &str, start_ms: f64, duration_ms: f64) -> bool {
        let threshold = self.config.long_task_threshold_ms;
        if !duration_ms.is_finite() || !start_ms.is_finite() || duration_ms <= threshold {
            return false;
        }

        let summary = {
            let mut summary = self.long_tasks.lock();
            let blocking_ms = duration_ms - threshold;
            summary.count += 1;
            summary.total_blocking_ms += blocking_ms;
            summary.recent.push_back(LongTask {
                name: name.to_string(),
                start_ms,
                duration_ms,
                blocking_ms,
            });
            while summary.recent.len() > self.config.max_long_tasks {
                summary.recent.pop_front();
            }
            summary.clone()
        };

        debug!(task = name, duration_ms, "Long task");
        metrics::counter!("inspector_long_tasks_total").increment(1);
        self.slots
            .set(slots::LONG_TASKS.to_string(), PerfValue::LongTasks(summary));
        self.changed();
        true
    }

    /// Apply a vitals measurement; returns its rating if it was stored
    pub fn record_vital(&self, vital: WebVital, value: f64) -> Option<Rating> {
        if !value.is_finite() {
            return None;
        }
        let now = self.clock.now_ms();
        let (stored, vitals) = {
            let mut vitals = self.vitals.lock();
            let stored = vitals.record(vital, value, now)?;
            (stored, vitals.clone())
        };

        debug!(metric = vital.name(), value = stored.value, rating = ?stored.rating, "Web vital");
        self.slots.set(slots::METRICS.to_string(), PerfValue::Metrics(vitals));
        self.changed();
        Some(stored.rating)
    }

    pub fn fps(&self) -> Option<FpsSample> {
        match self.slots.get(&slots::FPS.to_string()) {
            Some(PerfValue::Fps(sample)) => Some(sample),
            _ => None,
        }
    }

    pub fn memory(&self) -> Option<MemorySample> {
        match self.slots.get(&slots::MEMORY.to_string()) {
            Some(PerfValue::Memory(sample)) => Some(sample),
            _ => None,
        }
    }

    pub fn vitals(&self) -> WebVitals {
        match self.slots.get(&slots::METRICS.to_string()) {
            Some(PerfValue::Metrics(vitals)) => vitals,
            _ => WebVitals::default(),
        }
    }

    pub fn long_tasks(&self) -> LongTaskSummary {
        match self.slots.get(&slots::LONG_TASKS.to_string()) {
            Some(PerfValue::LongTasks(summary)) => summary,
            _ => LongTaskSummary::default(),
        }
    }

    /// Latest value of every live slot
    pub fn snapshot(&self) -> PerformanceSnapshot {
        PerformanceSnapshot {
            fps: self.fps(),
            memory: self.memory(),
            vitals: self.vitals(),
            long_tasks: self.long_tasks(),
            timestamp: self.clock.now_ms(),
        }
    }

    pub fn slot_stats(&self) -> StoreStats {
        self.slots.stats()
    }

    /// Publish a coalesced update if one is waiting and the window passed
    pub fn flush_pending(&self) -> bool {
        let now = self.clock.now_ms();
        {
            let mut throttle = self.throttle.lock();
            if !throttle.pending || !self.window_open(&throttle, now) {
                return false;
            }
            throttle.pending = false;
            throttle.last_publish = Some(now);
        }
        self.publish();
        true
    }

    /// Drive `flush_pending` and TTL sweeps from a tokio interval
    ///
    /// The task holds a weak reference and ends once the aggregator is
    /// dropped. Calling `start` again replaces the running task.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| InspectorError::NoRuntime(e.to_string()))?;

        let weak = Arc::downgrade(self);
        let period = Duration::from_millis(self.config.publish_interval_ms.max(1));
        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(aggregator) = weak.upgrade() else {
                    break;
                };
                aggregator.flush_pending();
                aggregator.slots.remove_expired();
            }
        });

        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }
        info!(interval_ms = period.as_millis() as u64, "Performance aggregator started");
        Ok(())
    }

    /// Stop the background task, if running
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            info!("Performance aggregator stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Drop all samples
    pub fn clear(&self) {
        self.slots.clear();
        *self.frames.lock() = FrameWindow::default();
        *self.vitals.lock() = WebVitals::default();
        *self.long_tasks.lock() = LongTaskSummary::default();
        *self.throttle.lock() = Throttle::default();
    }

    fn window_open(&self, throttle: &Throttle, now: i64) -> bool {
        match throttle.last_publish {
            Some(last) => now - last >= self.config.publish_interval_ms as i64,
            None => true,
        }
    }

    /// Leading edge publishes at once, later changes wait for `flush_pending`
    fn changed(&self) {
        let now = self.clock.now_ms();
        {
            let mut throttle = self.throttle.lock();
            if !self.window_open(&throttle, now) {
                throttle.pending = true;
                return;
            }
            throttle.pending = false;
            throttle.last_publish = Some(now);
        }
        self.publish();
    }

    fn publish(&self) {
        self.bus.publish(
            topics::PERFORMANCE_UPDATE,
            InspectorEvent::Performance(self.snapshot()),
        );
    }
}

impl Drop for PerformanceAggregator {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}
