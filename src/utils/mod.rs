// src/utils/mod.rs
//! Shared utilities
//!
//! - **errors**: crate-wide error type
//! - **config**: layered configuration loading
//! - **time**: injectable wall clock
//! - **ids**: entry and correlation identifiers

pub mod config;
pub mod errors;
pub mod ids;
pub mod time;

pub use config::InspectorConfig;
pub use errors::{InspectorError, Result};
pub use ids::{new_correlation_id, EntryIdGenerator};
pub use time::{Clock, ManualClock, SharedClock, SystemClock};
