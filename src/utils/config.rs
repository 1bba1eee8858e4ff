// src/utils/config.rs
//! Inspector configuration
//!
//! Values are layered with the `config` crate:
//!
//! 1. Built-in defaults (every field has one)
//! 2. Optional configuration file (TOML, YAML or JSON by extension)
//! 3. Environment overrides, e.g. `INSPECTOR__NETWORK__MAX_ENTRIES=500`

use crate::utils::errors::{InspectorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "INSPECTOR";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorConfig {
    /// Event bus settings
    pub bus: BusConfig,

    /// Network capture settings
    pub network: NetworkConfig,

    /// Console capture settings
    pub console: ConsoleConfig,

    /// Error tracking settings
    pub errors: ErrorTrackerConfig,

    /// Performance sampling settings
    pub performance: PerformanceConfig,
}

/// Event bus settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Listener count per topic above which a warning is logged
    pub max_listeners: usize,

    /// Re-publish listener failures on the `error` topic instead of logging
    pub capture_rejections: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_listeners: 10,
            capture_rejections: false,
        }
    }
}

/// Network capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Ring store capacity for network records
    pub max_entries: usize,

    /// Record time-to-live (milliseconds)
    pub ttl_ms: Option<u64>,

    /// Text bodies longer than this are replaced by a placeholder
    pub max_body_chars: usize,

    /// Responses faster than this are flagged as probably cached
    pub cache_threshold_ms: u64,

    /// Maximum frames retained per WebSocket record
    pub max_socket_messages: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            ttl_ms: None,
            max_body_chars: 10_000,
            cache_threshold_ms: 5,
            max_socket_messages: 100,
        }
    }
}

/// Console capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Ring store capacity for log records
    pub max_entries: usize,

    /// Record time-to-live (milliseconds)
    pub ttl_ms: Option<u64>,

    /// Maximum nesting depth when formatting arguments
    pub max_depth: usize,

    /// Maximum entries rendered per array or object
    pub max_entries_per_value: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            ttl_ms: None,
            max_depth: 5,
            max_entries_per_value: 100,
        }
    }
}

/// Error tracking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorTrackerConfig {
    /// Regex patterns for messages that are never tracked
    pub ignore_patterns: Vec<String>,

    /// Maximum number of distinct groups kept
    pub max_groups: usize,

    /// Sample errors retained per group
    pub max_samples_per_group: usize,

    /// Forwarded errors allowed per window
    pub max_forwards_per_window: u32,

    /// Forwarding window length (milliseconds)
    pub forward_window_ms: u64,
}

impl Default for ErrorTrackerConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: vec![
                "ResizeObserver loop".to_string(),
                r"^Script error\.?$".to_string(),
                "Failed to fetch".to_string(),
                "NetworkError when attempting to fetch resource".to_string(),
                "Network request failed".to_string(),
                "^Load failed$".to_string(),
            ],
            max_groups: 200,
            max_samples_per_group: 10,
            max_forwards_per_window: 100,
            forward_window_ms: 1_000,
        }
    }
}

/// Performance sampling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Accumulated frame time between FPS reports (milliseconds)
    pub fps_interval_ms: u64,

    /// Tasks longer than this are reported as long tasks (milliseconds)
    pub long_task_threshold_ms: f64,

    /// Long tasks kept in the recent list
    pub max_long_tasks: usize,

    /// Minimum spacing between published snapshots (milliseconds)
    pub publish_interval_ms: u64,

    /// Slot store capacity
    pub slot_capacity: usize,

    /// Slot time-to-live (milliseconds)
    pub slot_ttl_ms: Option<u64>,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            fps_interval_ms: 1_000,
            long_task_threshold_ms: 50.0,
            max_long_tasks: 20,
            publish_interval_ms: 100,
            slot_capacity: 8,
            slot_ttl_ms: None,
        }
    }
}

impl InspectorConfig {
    /// Load from defaults and environment overrides
    pub fn load() -> Result<Self> {
        Self::load_from(None::<&Path>)
    }

    /// Load from defaults, an optional file and environment overrides
    pub fn load_from<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            let path = path.as_ref();
            info!("Loading configuration from {:?}", path);
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: InspectorConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!("Configuration resolved: {:?}", config);
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let capacities = [
            ("network.max_entries", self.network.max_entries),
            ("console.max_entries", self.console.max_entries),
            ("errors.max_groups", self.errors.max_groups),
            ("errors.max_samples_per_group", self.errors.max_samples_per_group),
            ("performance.slot_capacity", self.performance.slot_capacity),
            ("performance.max_long_tasks", self.performance.max_long_tasks),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(InspectorError::InvalidConfig(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if self.errors.max_forwards_per_window == 0 || self.errors.forward_window_ms == 0 {
            return Err(InspectorError::InvalidConfig(
                "errors.max_forwards_per_window and errors.forward_window_ms must be greater than 0"
                    .to_string(),
            ));
        }

        if self.performance.fps_interval_ms == 0 {
            return Err(InspectorError::InvalidConfig(
                "performance.fps_interval_ms must be greater than 0".to_string(),
            ));
        }

        if !(self.performance.long_task_threshold_ms >= 0.0) {
            return Err(InspectorError::InvalidConfig(
                "performance.long_task_threshold_ms must be non-negative".to_string(),
            ));
        }

        for pattern in &self.errors.ignore_patterns {
            regex::Regex::new(pattern).map_err(|e| {
                InspectorError::InvalidConfig(format!(
                    "errors.ignore_patterns entry '{}': {}",
                    pattern, e
                ))
            })?;
        }

        Ok(())
    }
}
