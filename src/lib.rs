// src/lib.rs
//! Telemetry Inspector
//!
//! Capture pipeline behind an in-app debugging overlay: wraps network,
//! logging and error entry points, correlates multi-stage requests, keeps
//! bounded streams of structured records and fans them out to subscribers.
//!
//! # Architecture
//!
//! - **storage**: bounded ring store and keyed LRU store with lazy TTL
//! - **bus**: synchronous topic publish/subscribe with listener isolation
//! - **interception**: hook decorators and request/response correlation
//! - **tracking**: error fingerprinting, grouping and rate-limited forwarding
//! - **performance**: frame, memory, long-task and web-vitals aggregation
//! - **export**: JSON and HAR rendering of captured records
//! - **inspector**: the context object wiring everything together
//! - **observability**: tracing and Prometheus setup for host binaries
//! - **utils**: configuration, errors, clocks and identifiers

pub mod bus;
pub mod events;
pub mod export;
pub mod inspector;
pub mod interception;
pub mod observability;
pub mod performance;
pub mod storage;
pub mod tracking;
pub mod utils;

// Re-export commonly used types
pub use bus::{EventBus, EventBusConfig, Subscription};
pub use events::{topics, InspectorEvent};
pub use export::{ExportFormat, Exporter};
pub use inspector::{HookKind, Inspector, InspectorSummary};
pub use interception::{CapturedEvent, RawValue};
pub use storage::{BoundedIndexStore, BoundedRingStore, StorageEntry};
pub use tracking::{ErrorReport, ErrorTracker, TrackOutcome};
pub use utils::config::InspectorConfig;
pub use utils::errors::{InspectorError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
