// src/performance/mod.rs
//! Performance sampling
//!
//! - **vitals**: one-shot page metrics with good / needs-improvement / poor
//!   ratings
//! - **aggregator**: frame cadence, memory, long tasks and vitals written to
//!   fixed slots, with throttled publishing

pub mod aggregator;
pub mod vitals;

pub use aggregator::{
    slots, FpsSample, LongTask, LongTaskSummary, MemoryInfo, MemorySample, MemorySource,
    PerfValue, PerformanceAggregator, PerformanceSnapshot,
};
pub use vitals::{Rating, VitalValue, WebVital, WebVitals};
