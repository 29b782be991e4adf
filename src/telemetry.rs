//! Telemetry metric name constants.
//!
//! Centralised metric names for switchyard operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `switchyard_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `backend`: backend name from its descriptor (e.g. "ollama")
//! - `status`: "ok" or "error"
//! - `route`: how a request was served: "cache", "local", "remote", "fallback"

/// Total cache lookups that returned a live entry.
pub const CACHE_HITS_TOTAL: &str = "switchyard_cache_hits_total";

/// Total cache lookups that found nothing (or an unreadable entry).
pub const CACHE_MISSES_TOTAL: &str = "switchyard_cache_misses_total";

/// Total calls issued to remote backends.
///
/// Labels: `backend`, `status` ("ok" | "error").
pub const BACKEND_REQUESTS_TOTAL: &str = "switchyard_backend_requests_total";

/// Backend call duration in seconds.
///
/// Labels: `backend`.
pub const BACKEND_DURATION_SECONDS: &str = "switchyard_backend_duration_seconds";

/// Routing decisions taken by the inference router.
///
/// Labels: `route`.
pub const ROUTE_DECISIONS_TOTAL: &str = "switchyard_route_decisions_total";

/// Local generation attempts that failed and were handed to the backend chain.
pub const LOCAL_FAILURES_TOTAL: &str = "switchyard_local_failures_total";

/// Dispatches where every backend in the chain failed.
pub const DISPATCH_EXHAUSTED_TOTAL: &str = "switchyard_dispatch_exhausted_total";
