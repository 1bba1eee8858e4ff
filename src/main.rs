// src/main.rs
//! Telemetry Inspector demo
//!
//! Runs a synthetic session through every hook type, then prints the
//! component stats, the HAR export and a Prometheus scrape.

use anyhow::Result;
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use telemetry_inspector::interception::{
    fetch_fn, BeaconHook, Body, ErrorDescriptor, FetchHook, HookRequest, HookResponse, LogLevel, RawValue,
};
use telemetry_inspector::observability::{init_metrics, init_tracing};
use telemetry_inspector::performance::{MemoryInfo, WebVital};
use telemetry_inspector::{topics, ErrorReport, ExportFormat, Inspector, InspectorConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let metrics = init_metrics()?;

    info!("Starting Telemetry Inspector demo v{}", telemetry_inspector::VERSION);

    let config = match std::env::args().nth(1) {
        Some(path) => InspectorConfig::load_from(Some(path))?,
        None => InspectorConfig::load()?,
    };

    let inspector = Inspector::new(config)?;
    inspector.start()?;

    let published = Arc::new(AtomicU64::new(0));
    for topic in [
        topics::NETWORK_REQUEST,
        topics::NETWORK_RESPONSE,
        topics::NETWORK_ERROR,
        topics::ERROR_TRACKED,
        topics::PERFORMANCE_UPDATE,
    ] {
        let counter = Arc::clone(&published);
        inspector.bus().subscribe(topic, move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
    }

    let report = Arc::new(
        ErrorReport::new("TypeError", "Cannot read properties of undefined (reading 'id')")
            .with_stack("TypeError: Cannot read properties of undefined (reading 'id')\n    at render (https://app.test/main.js:120:17)"),
    );
    inspector.capture_error(&report);
    inspector.capture_error(&report);

    run_network(&inspector).await?;
    run_console(&inspector, &report)?;
    run_socket(&inspector);
    run_performance(&inspector).await;

    info!(
        events = published.load(Ordering::Relaxed),
        "Synthetic session finished"
    );

    println!("{}", serde_json::to_string_pretty(&inspector.summary())?);
    println!("{}", inspector.export(ExportFormat::Har)?);
    println!("{}", metrics.render());

    inspector.shutdown();
    Ok(())
}

async fn run_network(inspector: &Inspector) -> Result<()> {
    let backend = fetch_fn(|request: HookRequest| async move {
        tokio::time::sleep(Duration::from_millis(8)).await;
        match request.url.as_str() {
            url if url.ends_with("/missing") => Ok(HookResponse::new(404, "not found")),
            url if url.contains("offline") => Err(format!("connect ECONNREFUSED {}", url)),
            _ => Ok(HookResponse::new(200, r#"{"items":[1,2,3]}"#)
                .with_headers([("content-type", "application/json")])),
        }
    });
    let fetch = inspector.wrap_fetch("fetch", backend)?;

    let urls = [
        "https://api.test/items?page=1",
        "https://api.test/missing",
        "https://offline.test/health",
    ];
    let results = join_all(urls.iter().map(|url| fetch.fetch(HookRequest::get(*url)))).await;
    for (url, result) in urls.iter().zip(results) {
        match result {
            Ok(response) => info!(%url, status = response.status, "Fetched"),
            Err(e) => warn!(%url, error = %e, "Fetch failed"),
        }
    }

    let beacon = inspector.wrap_beacon("beacon", |_: &str, _: &Body| true)?;
    beacon.send_beacon(
        "https://collect.test/events",
        &Body::from(r#"{"event":"pageview"}"#),
    );

    let mut xhr = inspector.tracked_request();
    xhr.open("post", "https://api.test/upload");
    xhr.set_request_header("Content-Type", "text/plain");
    xhr.send(&Body::from("payload"));
    xhr.progress(7, Some(7));
    xhr.load(&HookResponse::new(201, "created"));

    let mut slow = inspector.tracked_request();
    slow.open("get", "https://api.test/slow");
    slow.send(&Body::Empty);
    slow.timeout();

    Ok(())
}

fn run_console(inspector: &Inspector, report: &Arc<ErrorReport>) -> Result<()> {
    let console = inspector.wrap_console("console", |level: LogLevel, args: &[RawValue]| {
        info!(level = level.as_str(), args = args.len(), "console");
    })?;

    console.log(&[RawValue::from("app booted"), RawValue::from(42.0)]);
    console.warn(&[RawValue::from("deprecated API")]);
    console.error(&[
        RawValue::from("render failed"),
        RawValue::Error(
            ErrorDescriptor::new("RangeError", "Maximum call stack size exceeded")
                .with_stack("RangeError: Maximum call stack size exceeded\n    at loop (https://app.test/main.js:9:3)"),
        ),
    ]);
    console.error(&[RawValue::from("unhandled"), RawValue::from(report)]);
    Ok(())
}

fn run_socket(inspector: &Inspector) {
    let mut socket = inspector.tracked_socket("wss://live.test/feed", &["json"]);
    socket.opened();
    socket.sent(&Body::from(r#"{"subscribe":"prices"}"#));
    socket.received(&Body::from(r#"{"price":101.5}"#));
    socket.close(1000, "done");
}

async fn run_performance(inspector: &Inspector) {
    let perf = inspector.performance();
    for frame in 0..=60 {
        perf.record_frame(frame as f64 * 16.0);
    }
    perf.record_memory(MemoryInfo {
        used_bytes: 48 * 1024 * 1024,
        total_bytes: 64 * 1024 * 1024,
        limit_bytes: 2048 * 1024 * 1024,
    });
    perf.record_task("parse-json", 120.0, 85.0);
    perf.record_vital(WebVital::Fcp, 900.0);
    perf.record_vital(WebVital::Lcp, 2_100.0);
    perf.record_vital(WebVital::Cls, 0.04);

    // let the interval task flush the trailing update
    tokio::time::sleep(Duration::from_millis(250)).await;
}
