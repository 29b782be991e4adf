//! Ordered fallback over remote backends.
//!
//! ```text
//! dispatch(request)
//!   ├─ validate once ──────────────► Rejected(message)     (no backend queried)
//!   ├─ backend[0] ─ ok ────────────► Completed
//!   │      └─ timeout / HTTP / non-2xx / bad shape: warn, next
//!   ├─ backend[1] ─ ok ────────────► Completed
//!   │      └─ ...
//!   └─ chain exhausted ────────────► Exhausted             (sentinel text)
//! ```
//!
//! No backend is retried; moving to the next backend is the only recovery.
//! Each call runs under its own descriptor's timeout, so a hung backend never
//! delays the next one by more than that.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::backend::BackendDescriptor;
use crate::telemetry;
use crate::types::{GenerateRequest, NO_RESULT_TEXT, PreparedRequest, RequestLimits};
use crate::{Result, SwitchyardError};

/// Result of running the chain.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// A backend produced text.
    Completed { backend: String, text: String },
    /// Every backend failed.
    Exhausted,
    /// The request failed validation; no backend was queried.
    Rejected(String),
}

impl DispatchOutcome {
    /// Text to hand back to the caller.
    pub fn text(&self) -> String {
        match self {
            Self::Completed { text, .. } => text.clone(),
            Self::Exhausted => NO_RESULT_TEXT.to_string(),
            Self::Rejected(message) => format!("Error: {message}"),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Tries an ordered list of [`BackendDescriptor`]s until one answers.
#[derive(Debug, Clone)]
pub struct FallbackDispatcher {
    http: Client,
    backends: Vec<BackendDescriptor>,
    limits: RequestLimits,
}

impl FallbackDispatcher {
    /// Create a dispatcher over `backends`, tried in order.
    pub fn new(backends: Vec<BackendDescriptor>, limits: RequestLimits) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("switchyard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SwitchyardError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            backends,
            limits,
        })
    }

    pub fn backends(&self) -> &[BackendDescriptor] {
        &self.backends
    }

    pub fn limits(&self) -> &RequestLimits {
        &self.limits
    }

    /// Validate `request` and run the chain.
    pub async fn dispatch(&self, request: &GenerateRequest) -> DispatchOutcome {
        match self.limits.prepare(request) {
            Ok(prepared) => self.dispatch_prepared(&prepared).await,
            Err(e) => {
                debug!(error = %e, "request rejected before dispatch");
                DispatchOutcome::Rejected(e.to_string())
            }
        }
    }

    /// Run the chain for an already-validated request.
    #[instrument(skip(self, request), fields(backends = self.backends.len()))]
    pub async fn dispatch_prepared(&self, request: &PreparedRequest) -> DispatchOutcome {
        for backend in &self.backends {
            let start = Instant::now();
            match self.call(backend, request).await {
                Ok(text) => {
                    Self::record_request(&backend.name, start, true);
                    debug!(backend = %backend.name, "backend produced a result");
                    return DispatchOutcome::Completed {
                        backend: backend.name.clone(),
                        text,
                    };
                }
                Err(e) => {
                    Self::record_request(&backend.name, start, false);
                    warn!(backend = %backend.name, error = %e, "backend failed, trying next");
                }
            }
        }
        metrics::counter!(telemetry::DISPATCH_EXHAUSTED_TOTAL).increment(1);
        warn!("all backends failed");
        DispatchOutcome::Exhausted
    }

    async fn call(&self, backend: &BackendDescriptor, request: &PreparedRequest) -> Result<String> {
        let body = backend.template.render(request);
        let mut builder = self
            .http
            .post(&backend.endpoint)
            .header("X-Request-ID", request_id())
            .json(&body);
        if let Some(key) = &backend.api_key {
            builder = builder.bearer_auth(key);
        }

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(SwitchyardError::Api {
                    status: status.as_u16(),
                    message,
                });
            }
            let bytes = response.bytes().await?;
            let json: Value = serde_json::from_slice(&bytes)?;
            backend.extract(&json)
        };

        match tokio::time::timeout(backend.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(SwitchyardError::Timeout {
                backend: backend.name.clone(),
                after: backend.timeout,
            }),
        }
    }

    fn record_request(backend: &str, start: Instant, ok: bool) {
        let status = if ok { "ok" } else { "error" };
        metrics::counter!(telemetry::BACKEND_REQUESTS_TOTAL,
            "backend" => backend.to_owned(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::BACKEND_DURATION_SECONDS,
            "backend" => backend.to_owned(),
        )
        .record(start.elapsed().as_secs_f64());
    }
}

/// Per-call request id: wall-clock nanoseconds plus a process-wide sequence.
fn request_id() -> String {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{nanos:x}-{:x}", SEQ.fetch_add(1, Ordering::Relaxed))
}
