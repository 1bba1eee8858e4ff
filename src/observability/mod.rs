// src/observability/mod.rs
//! Logging and metrics setup for binaries embedding the inspector
//!
//! The library itself only emits `tracing` events and `metrics` counters;
//! installing a subscriber or recorder is left to the host.
//!
//! # Log filter priority
//!
//! 1. `INSPECTOR_LOG` (per-target directives, e.g. `telemetry_inspector=debug`)
//! 2. `RUST_LOG`
//! 3. `info`
//!
//! `INSPECTOR_LOG_FORMAT=json` switches to one JSON object per line.

use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter directives variable
pub const LOG_ENV: &str = "INSPECTOR_LOG";

/// Output format variable (`json` or `compact`)
pub const LOG_FORMAT_ENV: &str = "INSPECTOR_LOG_FORMAT";

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match std::env::var(LOG_FORMAT_ENV) {
            Ok(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Install the global tracing subscriber
///
/// Fails if a subscriber is already installed.
pub fn init_tracing() -> anyhow::Result<()> {
    let filter = build_env_filter();

    match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_target(true).with_writer(std::io::stderr))
            .try_init(),
    }
    .context("failed to install tracing subscriber")
}

fn build_env_filter() -> EnvFilter {
    let inspector_log = std::env::var(LOG_ENV).ok();
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    filter_from(inspector_log.as_deref(), rust_log.as_deref())
}

/// First usable directive set in priority order, else `info`
///
/// Blank or unparseable values fall through to the next source.
fn filter_from(inspector_log: Option<&str>, rust_log: Option<&str>) -> EnvFilter {
    [inspector_log, rust_log]
        .into_iter()
        .flatten()
        .filter(|directives| !directives.trim().is_empty())
        .find_map(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Install the Prometheus recorder for the `inspector_*` counters
///
/// Render a scrape with [`PrometheusHandle::render`].
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_is_info() {
        assert_eq!(filter_from(None, None).to_string(), "info");
        assert_eq!(filter_from(Some("  "), None).to_string(), "info");
    }

    #[test]
    fn test_inspector_log_wins_over_rust_log() {
        assert_eq!(
            filter_from(Some("debug"), Some("warn")).to_string(),
            "debug"
        );
        assert_eq!(filter_from(None, Some("warn")).to_string(), "warn");
    }

    #[test]
    fn test_unparseable_directives_fall_through() {
        assert_eq!(
            filter_from(Some("=!bogus[["), Some("error")).to_string(),
            "error"
        );
        assert_eq!(filter_from(Some("=!bogus[["), None).to_string(), "info");
    }
}
