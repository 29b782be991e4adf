//! Tests for metrics integration.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter.

use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use switchyard::cache::{CacheConfig, CacheKey, CacheRecord, KeyParts, ResponseCache};
use switchyard::providers::{BackendDescriptor, FallbackDispatcher};
use switchyard::telemetry;
use switchyard::types::{GenerateRequest, RequestLimits};

// ============================================================================
// Snapshot type alias for readability
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

// ============================================================================
// Helpers
// ============================================================================

/// Sum all counter values matching a given metric name.
fn counter_total(snapshot: &SnapshotVec, name: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Sum counter values for a metric carrying `label = value`.
fn counter_with_label(snapshot: &SnapshotVec, name: &str, label: &str, value: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| {
            key.kind() == MetricKind::Counter
                && key.key().name() == name
                && key
                    .key()
                    .labels()
                    .any(|l| l.key() == label && l.value() == value)
        })
        .map(|(_, _, _, v)| match v {
            DebugValue::Counter(c) => *c,
            _ => 0,
        })
        .sum()
}

fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

fn key() -> CacheKey {
    CacheKey::from_parts(&KeyParts {
        prompt: "hello",
        system_prompt: "sys",
        model: "m",
        temperature: 0.7,
        top_p: 0.9,
        max_length: 100,
        scope: None,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn cache_lookups_record_hits_and_misses() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        let cache = ResponseCache::in_memory(&CacheConfig::default()).unwrap();
        cache.lookup(&key(), None);
        cache.store(
            &key(),
            &CacheRecord {
                prompt: "hello".into(),
                system_prompt: "sys".into(),
                model: "m".into(),
                response: "world".into(),
                temperature: 0.7,
                top_p: 0.9,
                max_length: 100,
                owner_scope: None,
            },
        );
        cache.lookup(&key(), None);
        cache.lookup(&key(), None);
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL), 2);
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_MISSES_TOTAL), 1);
}

/// Runs async code within a local recorder scope on the multi-thread runtime.
///
/// `block_in_place` ensures the sync `with_local_recorder` closure stays
/// on the current thread while `block_on` drives the inner async work.
#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn backend_calls_record_status_and_duration() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bad"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "ok"})))
        .mount(&server)
        .await;

    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let mut bad = BackendDescriptor::ollama(format!("{}/bad", server.uri()));
    bad.name = "bad".into();
    let mut good = BackendDescriptor::ollama(format!("{}/good", server.uri()));
    good.name = "good".into();
    let dispatcher = FallbackDispatcher::new(vec![bad, good], RequestLimits::default()).unwrap();

    let outcome = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current()
                .block_on(async { dispatcher.dispatch(&GenerateRequest::new("hello")).await })
        })
    });
    assert!(outcome.is_completed());

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::BACKEND_REQUESTS_TOTAL), 2);
    assert_eq!(
        counter_with_label(&snapshot, telemetry::BACKEND_REQUESTS_TOTAL, "status", "error"),
        1
    );
    assert_eq!(
        counter_with_label(&snapshot, telemetry::BACKEND_REQUESTS_TOTAL, "backend", "good"),
        1
    );
    assert!(has_histogram(&snapshot, telemetry::BACKEND_DURATION_SECONDS));
    assert_eq!(counter_total(&snapshot, telemetry::DISPATCH_EXHAUSTED_TOTAL), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn exhausted_chain_records_exhaustion() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let dispatcher = FallbackDispatcher::new(vec![], RequestLimits::default()).unwrap();

    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current()
                .block_on(async { dispatcher.dispatch(&GenerateRequest::new("hello")).await })
        })
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::DISPATCH_EXHAUSTED_TOTAL), 1);
}
