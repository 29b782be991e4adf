//! End-to-end routing tests: cache, local generator, remote chain.

use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use switchyard::cache::{CacheConfig, CacheKey, ResponseCache};
use switchyard::capability::{ResourceSnapshot, StaticProbe};
use switchyard::model::{DownloadHandle, DownloadProgress};
use switchyard::providers::{BackendDescriptor, LocalGenerator, ModelDownloads};
use switchyard::types::{
    GenerateRequest, GenerationSource, NO_RESULT_TEXT, PreparedRequest, RequestLimits,
};
use switchyard::{ExecutionMode, RouteState, Switchyard, SwitchyardError};

const GIB: u64 = 1 << 30;

// ============================================================================
// Fakes
// ============================================================================

struct FakeLocal {
    calls: AtomicUsize,
    fail: bool,
}

impl FakeLocal {
    fn ok() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalGenerator for FakeLocal {
    fn name(&self) -> &str {
        "fake-local"
    }

    fn model(&self) -> &str {
        "org/local-model"
    }

    async fn generate(&self, request: &PreparedRequest) -> switchyard::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(SwitchyardError::LocalGeneration("out of memory".into()))
        } else {
            Ok(format!("local: {}", request.prompt))
        }
    }
}

struct NothingCached;

impl ModelDownloads for NothingCached {
    fn is_cached(&self, _model: &str) -> bool {
        false
    }

    fn begin_download(&self, _model: &str) -> switchyard::Result<DownloadHandle> {
        Ok(DownloadHandle::default())
    }

    fn progress(&self) -> DownloadProgress {
        DownloadProgress::default()
    }
}

/// Records which thread each call ran on.
#[derive(Default)]
struct RecordingDownloads {
    threads: Mutex<Vec<ThreadId>>,
    started: AtomicUsize,
}

impl RecordingDownloads {
    fn threads(&self) -> Vec<ThreadId> {
        self.threads.lock().unwrap().clone()
    }
}

impl ModelDownloads for RecordingDownloads {
    fn is_cached(&self, _model: &str) -> bool {
        self.threads.lock().unwrap().push(thread::current().id());
        false
    }

    fn begin_download(&self, _model: &str) -> switchyard::Result<DownloadHandle> {
        self.threads.lock().unwrap().push(thread::current().id());
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(DownloadHandle::default())
    }

    fn progress(&self) -> DownloadProgress {
        DownloadProgress::default()
    }
}

fn roomy() -> Arc<StaticProbe> {
    Arc::new(StaticProbe(ResourceSnapshot {
        cpu_busy_fraction: Some(0.1),
        memory_available_bytes: Some(16 * GIB),
        memory_used_fraction: Some(0.2),
        gpu_present: true,
    }))
}

fn cramped() -> Arc<StaticProbe> {
    Arc::new(StaticProbe(ResourceSnapshot {
        cpu_busy_fraction: Some(0.1),
        memory_available_bytes: Some(GIB),
        memory_used_fraction: Some(0.9),
        gpu_present: false,
    }))
}

async fn remote_server(text: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": text})))
        .mount(&server)
        .await;
    server
}

fn backend(server: &MockServer) -> BackendDescriptor {
    let mut b = BackendDescriptor::ollama(format!("{}/api/generate", server.uri()));
    b.name = "mock".into();
    b
}

fn cache() -> ResponseCache {
    ResponseCache::in_memory(&CacheConfig::default()).unwrap()
}

fn hello() -> GenerateRequest {
    GenerateRequest::new("hello")
        .temperature(0.7)
        .top_p(0.9)
        .max_length(100)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn repeated_request_is_served_from_cache() {
    let server = remote_server("remote text").await;
    let cache = cache();
    let router = Switchyard::builder()
        .backend(backend(&server))
        .cache(cache.clone())
        .build()
        .unwrap();

    let first = router.generate(&hello()).await.unwrap();
    assert!(!first.cached);
    router.flush().await;
    let hits_before = cache.stats().unwrap().hits;

    let second = router.generate(&hello()).await.unwrap();
    assert!(second.cached);
    assert_eq!(second.generated_text, "remote text");
    assert_eq!(second.source, GenerationSource::Cache);
    assert_eq!(cache.stats().unwrap().hits, hits_before + 1);
}

#[tokio::test]
async fn cache_hit_skips_attempt_and_write_states() {
    let server = remote_server("remote text").await;
    let router = Switchyard::builder()
        .backend(backend(&server))
        .cache(cache())
        .build()
        .unwrap();

    let first = router.route(&hello()).await.unwrap();
    assert_eq!(
        first.context.trail(),
        &[
            RouteState::Received,
            RouteState::CacheCheck,
            RouteState::RemoteAttempt,
            RouteState::CacheWrite,
            RouteState::Done,
        ]
    );
    router.flush().await;

    let second = router.route(&hello()).await.unwrap();
    assert_eq!(
        second.context.trail(),
        &[RouteState::Received, RouteState::CacheCheck, RouteState::Done]
    );
}

#[tokio::test]
async fn cramped_host_never_invokes_local() {
    let server = remote_server("remote text").await;
    let local = FakeLocal::ok();
    let router = Switchyard::builder()
        .backend(backend(&server))
        .local(local.clone())
        .probe(cramped())
        .build()
        .unwrap();

    let routed = router.route(&hello()).await.unwrap();
    assert_eq!(local.calls(), 0);
    assert_eq!(routed.response.generated_text, "remote text");
    assert_eq!(routed.context.local_viable(), Some(false));
    assert!(!routed.context.visited(RouteState::LocalAttempt));
}

#[tokio::test]
async fn local_failure_matches_dispatch_and_caches_under_original_key() {
    let server = remote_server("remote text").await;
    let local = FakeLocal::failing();
    let cache = cache();
    let router = Switchyard::builder()
        .backend(backend(&server))
        .local(local.clone())
        .probe(roomy())
        .cache(cache.clone())
        .build()
        .unwrap();

    let routed = router.route(&hello()).await.unwrap();
    router.flush().await;
    assert_eq!(local.calls(), 1);

    let direct = router.dispatcher().dispatch(&hello()).await;
    assert_eq!(routed.response.generated_text, direct.text());
    assert!(routed.response.fallback);
    assert!(!routed.response.cached);
    assert!(routed.context.visited(RouteState::LocalFailed));

    let prepared = RequestLimits::default().prepare(&hello()).unwrap();
    let key = CacheKey::for_request(&prepared, router.model());
    let entry = cache.entry(&key).unwrap().expect("entry under the request key");
    assert_eq!(entry.response, "remote text");
    assert_eq!(cache.stats().unwrap().entries, 1);
}

#[tokio::test]
async fn empty_prompt_is_rejected_without_cache_lookup() {
    let server = remote_server("remote text").await;
    let cache = cache();
    let router = Switchyard::builder()
        .backend(backend(&server))
        .cache(cache.clone())
        .build()
        .unwrap();

    let err = router.generate(&GenerateRequest::new("")).await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(cache.stats().unwrap().misses, 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ============================================================================
// Additional routing rules
// ============================================================================

#[tokio::test]
async fn viable_host_uses_local_generator() {
    let server = remote_server("remote text").await;
    let local = FakeLocal::ok();
    let router = Switchyard::builder()
        .backend(backend(&server))
        .local(local.clone())
        .probe(roomy())
        .build()
        .unwrap();

    let response = router.generate(&hello()).await.unwrap();
    assert_eq!(response.generated_text, "local: hello");
    assert_eq!(response.source, GenerationSource::Local);
    assert!(!response.fallback);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn remote_mode_skips_local() {
    let server = remote_server("remote text").await;
    let local = FakeLocal::ok();
    let router = Switchyard::builder()
        .backend(backend(&server))
        .local(local.clone())
        .probe(roomy())
        .mode(ExecutionMode::Remote)
        .build()
        .unwrap();

    let routed = router.route(&hello()).await.unwrap();
    assert_eq!(local.calls(), 0);
    assert_eq!(routed.context.local_viable(), None);
    assert_eq!(
        routed.response.source,
        GenerationSource::Remote {
            backend: "mock".into()
        }
    );
}

#[tokio::test]
async fn uncached_model_is_not_viable() {
    let server = remote_server("remote text").await;
    let local = FakeLocal::ok();
    let router = Switchyard::builder()
        .backend(backend(&server))
        .local(local.clone())
        .probe(roomy())
        .downloads(Arc::new(NothingCached))
        .build()
        .unwrap();

    let routed = router.route(&hello()).await.unwrap();
    assert_eq!(local.calls(), 0);
    assert_eq!(routed.context.local_viable(), Some(false));
    assert_eq!(routed.response.generated_text, "remote text");
}

#[tokio::test]
async fn model_check_runs_off_the_async_thread() {
    let server = remote_server("remote text").await;
    let downloads = Arc::new(RecordingDownloads::default());
    let router = Switchyard::builder()
        .backend(backend(&server))
        .local(FakeLocal::ok())
        .probe(roomy())
        .downloads(downloads.clone())
        .download_missing(true)
        .build()
        .unwrap();

    let routed = router.route(&hello()).await.unwrap();
    assert_eq!(routed.context.local_viable(), Some(false));
    assert_eq!(downloads.started.load(Ordering::SeqCst), 1);

    // The default test runtime is single-threaded, so any call made on
    // the test thread would have blocked the runtime.
    let threads = downloads.threads();
    assert_eq!(threads.len(), 2);
    assert!(threads.iter().all(|id| *id != thread::current().id()));
}

#[tokio::test]
async fn missing_model_is_not_fetched_unless_enabled() {
    let server = remote_server("remote text").await;
    let downloads = Arc::new(RecordingDownloads::default());
    let router = Switchyard::builder()
        .backend(backend(&server))
        .local(FakeLocal::ok())
        .probe(roomy())
        .downloads(downloads.clone())
        .build()
        .unwrap();

    router.generate(&hello()).await.unwrap();
    assert_eq!(downloads.started.load(Ordering::SeqCst), 0);
    assert_eq!(downloads.threads().len(), 1);
}

#[tokio::test]
async fn local_failure_with_dead_chain_is_not_a_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let local = FakeLocal::failing();
    let cache = cache();
    let router = Switchyard::builder()
        .backend(backend(&server))
        .local(local.clone())
        .probe(roomy())
        .cache(cache.clone())
        .build()
        .unwrap();

    let routed = router.route(&hello()).await.unwrap();
    router.flush().await;
    assert_eq!(local.calls(), 1);
    assert!(routed.context.visited(RouteState::LocalFailed));
    assert!(routed.response.is_unavailable());
    assert_eq!(routed.response.generated_text, NO_RESULT_TEXT);
    assert!(!routed.response.fallback);
    assert!(!routed.context.fallback());
    assert_eq!(cache.stats().unwrap().entries, 0);
}

#[tokio::test]
async fn exhausted_chain_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let cache = cache();
    let router = Switchyard::builder()
        .backend(backend(&server))
        .cache(cache.clone())
        .build()
        .unwrap();

    let routed = router.route(&hello()).await.unwrap();
    router.flush().await;
    assert_eq!(routed.response.generated_text, NO_RESULT_TEXT);
    assert!(routed.response.is_unavailable());
    assert!(!routed.context.visited(RouteState::CacheWrite));
    assert_eq!(cache.stats().unwrap().entries, 0);
}

#[tokio::test]
async fn scopes_do_not_share_entries() {
    let server = remote_server("remote text").await;
    let cache = cache();
    let router = Switchyard::builder()
        .backend(backend(&server))
        .cache(cache.clone())
        .build()
        .unwrap();

    router.generate(&hello().scope("alice")).await.unwrap();
    router.flush().await;

    let bob = router.generate(&hello().scope("bob")).await.unwrap();
    assert!(!bob.cached);
    let alice = router.generate(&hello().scope("alice")).await.unwrap();
    assert!(alice.cached);
}

#[tokio::test]
async fn model_defaults_to_local_generator_model() {
    let router = Switchyard::builder()
        .local(FakeLocal::ok())
        .probe(roomy())
        .build()
        .unwrap();
    assert_eq!(router.model(), "org/local-model");
    assert!(router.local_configured());
}
