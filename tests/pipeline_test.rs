// tests/pipeline_test.rs
//! End-to-end capture pipeline tests

use parking_lot::Mutex;
use std::sync::Arc;
use telemetry_inspector::interception::record::{NetworkKind, RequestState};
use telemetry_inspector::interception::{
    fetch_fn, Body, CapturedEvent, FetchHook, Headers, HookRequest, HookResponse,
};
use telemetry_inspector::utils::ManualClock;
use telemetry_inspector::{topics, ErrorReport, Inspector, InspectorConfig, InspectorError, InspectorEvent};

fn inspector_with(config: InspectorConfig) -> (Inspector, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(10_000));
    let inspector = Inspector::with_clock(config, clock.clone()).unwrap();
    (inspector, clock)
}

fn record_topics(inspector: &Inspector) -> Arc<Mutex<Vec<(String, String)>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for topic in [
        topics::NETWORK_REQUEST,
        topics::NETWORK_RESPONSE,
        topics::NETWORK_ERROR,
    ] {
        let seen = Arc::clone(&seen);
        inspector.bus().subscribe(topic, move |event: &InspectorEvent| {
            if let Some(captured) = event.as_captured() {
                seen.lock().push((topic.to_string(), captured.id().to_string()));
            }
            Ok(())
        });
    }
    seen
}

#[tokio::test]
async fn test_begin_is_stored_before_hook_runs() {
    let (inspector, _) = inspector_with(InspectorConfig::default());
    let seen = record_topics(&inspector);

    let store = Arc::clone(inspector.network());
    let observed = Arc::new(Mutex::new(None));
    let observed_in_hook = Arc::clone(&observed);
    let hook = fetch_fn(move |_req: HookRequest| {
        let pending = store
            .get_all()
            .iter()
            .filter_map(CapturedEvent::as_network)
            .map(|record| record.state)
            .collect::<Vec<_>>();
        *observed_in_hook.lock() = Some(pending);
        async { Ok::<_, String>(HookResponse::new(200, "ok")) }
    });

    let fetch = inspector.wrap_fetch("fetch", hook).unwrap();
    let response = fetch.fetch(HookRequest::get("https://api.test/a")).await.unwrap();
    assert_eq!(response, HookResponse::new(200, "ok"));

    assert_eq!(*observed.lock(), Some(vec![RequestState::Pending]));

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, topics::NETWORK_REQUEST);
    assert_eq!(seen[1].0, topics::NETWORK_RESPONSE);
    assert_eq!(seen[0].1, seen[1].1);
}

#[tokio::test]
async fn test_failure_preserves_error_and_groups() {
    let (inspector, clock) = inspector_with(InspectorConfig::default());
    let seen = record_topics(&inspector);

    let fetch = inspector
        .wrap_fetch(
            "fetch",
            fetch_fn(|req: HookRequest| async move {
                Err::<HookResponse, _>(format!("Timeout after {}ms", req.url.len() * 3))
            }),
        )
        .unwrap();

    let first = fetch.fetch(HookRequest::get("https://api.test/x")).await.unwrap_err();
    clock.advance(50);
    let second = fetch
        .fetch(HookRequest::get("https://api.test/longer-path"))
        .await
        .unwrap_err();
    assert_eq!(first, "Timeout after 54ms");
    assert!(second.starts_with("Timeout after"));

    assert_eq!(
        seen.lock().iter().map(|(t, _)| t.as_str()).collect::<Vec<_>>(),
        vec![
            topics::NETWORK_REQUEST,
            topics::NETWORK_ERROR,
            topics::NETWORK_REQUEST,
            topics::NETWORK_ERROR,
        ]
    );

    // different urls and durations still produce two groups: the url is part
    // of the source location
    assert_eq!(inspector.errors().stats().total, 2);
}

#[test]
fn test_timeout_messages_share_a_group() {
    let (inspector, _) = inspector_with(InspectorConfig::default());
    let stack = "Error: x\n    at poll (https://app.test/client.js:40:9)";

    let a = Arc::new(ErrorReport::new("Error", "Timeout after 123ms").with_stack(stack));
    let b = Arc::new(ErrorReport::new("Error", "Timeout after 987ms").with_stack(stack));
    assert!(inspector.capture_error(&a).tracked().is_some());
    assert!(inspector.capture_error(&b).tracked().is_some());

    let groups = inspector.errors().groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].count, 2);
    assert_eq!(groups[0].errors.len(), 2);
}

#[test]
fn test_update_after_eviction_is_silent() {
    let mut config = InspectorConfig::default();
    config.network.max_entries = 1;
    let (inspector, _) = inspector_with(config);
    let seen = record_topics(&inspector);

    let ctx = inspector.capture_context();
    let first = ctx
        .begin(NetworkKind::Fetch, "GET", "/a", Headers::new(), &Body::Empty)
        .unwrap();
    let second = ctx
        .begin(NetworkKind::Fetch, "GET", "/b", Headers::new(), &Body::Empty)
        .unwrap();

    let failure = telemetry_inspector::interception::record::FailureInfo::new(
        telemetry_inspector::interception::FailureKind::Error,
        "late",
    );
    assert!(!ctx.fail(&first, failure));
    assert_eq!(seen.lock().len(), 2);

    assert_eq!(inspector.network().size(), 1);
    let stored = inspector.network().get(&second.entry_id).unwrap();
    assert_eq!(stored.id(), second.correlation_id);
    assert_eq!(errors_total(&inspector), 0);
}

fn errors_total(inspector: &Inspector) -> u64 {
    inspector.errors().stats().total
}

#[test]
fn test_ring_keeps_latest_records() {
    let mut config = InspectorConfig::default();
    config.console.max_entries = 3;
    let (inspector, _) = inspector_with(config);
    let console = inspector
        .wrap_console(
            "console",
            |_: telemetry_inspector::interception::LogLevel, _: &[telemetry_inspector::RawValue]| {},
        )
        .unwrap();

    for message in ["A", "B", "C", "D"] {
        console.log(&[message.into()]);
    }

    let messages: Vec<_> = inspector
        .console()
        .get_all()
        .into_iter()
        .filter_map(|event| match event {
            CapturedEvent::Log(record) => Some(record.message),
            _ => None,
        })
        .collect();
    assert_eq!(messages, vec!["B", "C", "D"]);
    assert_eq!(inspector.console().stats().evictions, 1);
}

#[test]
fn test_shutdown_rejects_registration_and_stops_capture() {
    let (inspector, _) = inspector_with(InspectorConfig::default());
    let beacon = inspector
        .wrap_beacon("beacon", |_: &str, _: &Body| true)
        .unwrap();
    assert!(matches!(
        inspector.wrap_beacon("beacon", |_: &str, _: &Body| false),
        Err(InspectorError::DuplicateRegistration(_))
    ));

    inspector.shutdown();
    assert!(telemetry_inspector::interception::BeaconHook::send_beacon(
        &beacon,
        "/after",
        &Body::Empty
    ));
    assert!(inspector.network().is_empty());
    assert!(matches!(
        inspector.wrap_fetch(
            "fetch",
            fetch_fn(|_req: HookRequest| async { Ok::<_, String>(HookResponse::new(204, Body::Empty)) })
        ),
        Err(InspectorError::ShutDown)
    ));
}

#[tokio::test]
async fn test_concurrent_requests_keep_their_correlation() {
    let (inspector, _) = inspector_with(InspectorConfig::default());
    let seen = record_topics(&inspector);

    let fetch = inspector
        .wrap_fetch(
            "fetch",
            fetch_fn(|req: HookRequest| async move {
                // later urls settle first
                for _ in 0..(10 - req.url.len() % 10) {
                    tokio::task::yield_now().await;
                }
                Ok::<_, String>(HookResponse::new(200, req.url))
            }),
        )
        .unwrap();

    let urls = ["/a", "/bb", "/ccc", "/dddd"];
    let results =
        futures::future::join_all(urls.iter().map(|url| fetch.fetch(HookRequest::get(*url)))).await;

    for (url, result) in urls.iter().zip(results) {
        assert_eq!(result.unwrap(), HookResponse::new(200, *url));
    }

    let seen = seen.lock();
    assert_eq!(seen.len(), 8);
    for (topic, id) in seen.iter().filter(|(t, _)| t == topics::NETWORK_RESPONSE) {
        let begin = seen
            .iter()
            .position(|(t, i)| t == topics::NETWORK_REQUEST && i == id)
            .unwrap();
        let end = seen.iter().position(|(t, i)| t == topic && i == id).unwrap();
        assert!(begin < end);
    }

    for event in inspector.network().get_all() {
        let record = event.as_network().unwrap();
        assert_eq!(record.state, RequestState::Resolved);
        let body = record.response.as_ref().and_then(|r| r.body.as_text());
        assert_eq!(body.as_deref(), Some(record.request.url.as_str()));
    }
}
