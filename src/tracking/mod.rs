// src/tracking/mod.rs
//! Error tracking
//!
//! - **stack**: V8 and Gecko stack frame parsing
//! - **fingerprint**: message normalization and grouping keys
//! - **error_tracker**: identity suppression, ignore rules, grouping and
//!   rate-limited forwarding

pub mod error_tracker;
pub mod fingerprint;
pub mod stack;

pub use error_tracker::{
    ErrorGroup, ErrorOrigin, ErrorReport, ErrorStats, ErrorTracker, ReportHandle, TrackOutcome,
    TrackedError,
};
pub use fingerprint::{fingerprint, normalize_message, SourceLocation};
pub use stack::{parse_stack, StackFrame};
