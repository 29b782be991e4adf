//! Per-request routing between the cache, local compute, and remote backends.
//!
//! ```text
//! RECEIVED ─► CACHE_CHECK ─ hit ─────────────────────────────────► DONE
//!                  │ miss
//!                  ├─ local viable ─► LOCAL_ATTEMPT ─ ok ─┐
//!                  │                       │ error        │
//!                  │                  LOCAL_FAILED        │
//!                  │                       ▼              ▼
//!                  └─ otherwise ───► REMOTE_ATTEMPT ─► CACHE_WRITE ─► DONE
//! ```
//!
//! Validation happens before `CACHE_CHECK`; an invalid request is returned
//! as an error without touching the cache or any generator.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::context::{RouteContext, RouteState};
use crate::cache::{CacheKey, CacheRecord, ResponseCache};
use crate::capability::{Assessment, CapabilityAssessor};
use crate::providers::{DispatchOutcome, FallbackDispatcher, LocalGenerator, ModelDownloads};
use crate::telemetry;
use crate::types::{
    GenerateRequest, GenerateResponse, GenerationSource, NO_RESULT_TEXT, PreparedRequest,
};
use crate::{Result, SwitchyardError};

/// Whether local execution may be attempted at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Try local compute when the host can take it.
    #[default]
    Auto,
    /// Always use the remote chain.
    Remote,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Remote => "remote",
        }
    }
}

/// A routed response together with the path it took.
#[derive(Debug, Clone)]
pub struct Routed {
    pub response: GenerateResponse,
    pub context: RouteContext,
}

/// Chooses how each request is served and memoizes the result.
///
/// Built with [`Switchyard::builder()`](crate::Switchyard::builder).
pub struct InferenceRouter {
    pub(crate) model: String,
    pub(crate) mode: ExecutionMode,
    pub(crate) cache: Option<ResponseCache>,
    pub(crate) local: Option<Arc<dyn LocalGenerator>>,
    pub(crate) assessor: CapabilityAssessor,
    pub(crate) downloads: Option<Arc<dyn ModelDownloads>>,
    pub(crate) download_missing: bool,
    pub(crate) dispatcher: FallbackDispatcher,
    pub(crate) pending: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for InferenceRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceRouter")
            .field("model", &self.model)
            .field("mode", &self.mode)
            .field("cache", &self.cache)
            .field("local", &self.local.as_ref().map(|l| l.name().to_string()))
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl InferenceRouter {
    /// Generate text for `request`.
    ///
    /// Only validation failures are returned as errors. Local and backend
    /// failures are recovered internally; if nothing can answer, the
    /// response carries [`NO_RESULT_TEXT`].
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        self.route(request).await.map(|routed| routed.response)
    }

    /// Like [`generate`](Self::generate), also returning the route taken.
    #[instrument(skip(self, request), fields(model = %self.model, mode = self.mode.as_str()))]
    pub async fn route(&self, request: &GenerateRequest) -> Result<Routed> {
        let mut ctx = RouteContext::new();
        let prepared = self.dispatcher.limits().prepare(request)?;
        let key = CacheKey::for_request(&prepared, &self.model);

        ctx.advance(RouteState::CacheCheck);
        if let Some(text) = self.lookup(&key, prepared.scope.clone()).await {
            ctx.advance(RouteState::Done);
            Self::record_route("cache");
            return Ok(Routed {
                response: GenerateResponse::from_cache(text),
                context: ctx,
            });
        }

        let (text, source) = match self.local_candidate(&mut ctx).await {
            Some(local) => {
                ctx.advance(RouteState::LocalAttempt);
                match Self::run_local(local.as_ref(), &prepared).await {
                    Ok(text) => {
                        Self::record_route("local");
                        (text, GenerationSource::Local)
                    }
                    Err(e) => {
                        error!(generator = local.name(), error = %e, "local generation failed, falling back to remote chain");
                        metrics::counter!(telemetry::LOCAL_FAILURES_TOTAL).increment(1);
                        ctx.advance(RouteState::LocalFailed);
                        Self::record_route("fallback");
                        let (text, source) = self.remote(&mut ctx, &prepared).await;
                        if matches!(source, GenerationSource::Remote { .. }) {
                            ctx.mark_fallback();
                        }
                        (text, source)
                    }
                }
            }
            None => {
                Self::record_route("remote");
                self.remote(&mut ctx, &prepared).await
            }
        };

        if source != GenerationSource::Unavailable {
            ctx.advance(RouteState::CacheWrite);
            self.store(key, &prepared, &text);
        }
        ctx.advance(RouteState::Done);

        Ok(Routed {
            response: GenerateResponse {
                generated_text: text,
                cached: false,
                fallback: ctx.fallback(),
                source,
            },
            context: ctx,
        })
    }

    /// Wait for every background cache write started so far.
    pub async fn flush(&self) {
        let handles: Vec<_> = match self.pending.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => return,
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "background cache write did not finish");
            }
        }
    }

    // ========================================================================
    // Accessors (used by the HTTP surface)
    // ========================================================================

    /// Model identifier used in cache keys.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    pub fn assessor(&self) -> &CapabilityAssessor {
        &self.assessor
    }

    pub fn downloads(&self) -> Option<&Arc<dyn ModelDownloads>> {
        self.downloads.as_ref()
    }

    pub fn dispatcher(&self) -> &FallbackDispatcher {
        &self.dispatcher
    }

    /// Whether a local generator is configured and the mode allows it.
    pub fn local_configured(&self) -> bool {
        self.mode == ExecutionMode::Auto && self.local.is_some()
    }

    /// Sample and score the host now.
    pub async fn assess(&self) -> Assessment {
        self.assessor.assess_async().await
    }

    // ========================================================================
    // Steps
    // ========================================================================

    async fn lookup(&self, key: &CacheKey, scope: Option<String>) -> Option<String> {
        let cache = self.cache.clone()?;
        let key = key.clone();
        match tokio::task::spawn_blocking(move || cache.lookup(&key, scope.as_deref())).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "cache lookup task failed, treating as miss");
                None
            }
        }
    }

    /// Pick the local generator if this request may use it.
    async fn local_candidate(&self, ctx: &mut RouteContext) -> Option<Arc<dyn LocalGenerator>> {
        if self.mode == ExecutionMode::Remote {
            debug!("remote mode, skipping local generation");
            return None;
        }
        let local = self.local.clone()?;

        if let Err(e) = self.ensure_model(local.model()).await {
            debug!(error = %e, "local generation not viable");
            ctx.set_local_viable(false);
            return None;
        }

        let verdict = self.assessor.assess_async().await.verdict;
        ctx.set_local_viable(verdict.can_run_local);
        if verdict.can_run_local {
            Some(local)
        } else {
            debug!(score = verdict.score, "host cannot take local generation");
            None
        }
    }

    /// Check that `model` is downloaded, off the async workers.
    ///
    /// A missing model is [`SwitchyardError::ModelNotCached`]; with
    /// `download_missing` set, a background download is started first.
    async fn ensure_model(&self, model: &str) -> Result<()> {
        let Some(downloads) = self.downloads.clone() else {
            return Ok(());
        };
        let model = model.to_string();
        let download_missing = self.download_missing;
        let checked = tokio::task::spawn_blocking(move || {
            if downloads.is_cached(&model) {
                return Ok(());
            }
            if download_missing {
                match downloads.begin_download(&model) {
                    Ok(_) => info!(model = %model, "download of missing model started"),
                    Err(e) => warn!(model = %model, error = %e, "could not start model download"),
                }
            }
            Err(SwitchyardError::ModelNotCached(model))
        })
        .await;
        checked.unwrap_or_else(|e| {
            Err(SwitchyardError::LocalGeneration(format!(
                "model check task failed: {e}"
            )))
        })
    }

    async fn run_local(local: &dyn LocalGenerator, request: &PreparedRequest) -> Result<String> {
        let text = local.generate(request).await?;
        if text.trim().is_empty() {
            return Err(SwitchyardError::LocalGeneration(
                "generator returned empty text".to_string(),
            ));
        }
        Ok(text)
    }

    async fn remote(
        &self,
        ctx: &mut RouteContext,
        request: &PreparedRequest,
    ) -> (String, GenerationSource) {
        ctx.advance(RouteState::RemoteAttempt);
        match self.dispatcher.dispatch_prepared(request).await {
            DispatchOutcome::Completed { backend, text } => {
                (text, GenerationSource::Remote { backend })
            }
            DispatchOutcome::Exhausted | DispatchOutcome::Rejected(_) => {
                (NO_RESULT_TEXT.to_string(), GenerationSource::Unavailable)
            }
        }
    }

    fn store(&self, key: CacheKey, request: &PreparedRequest, text: &str) {
        let Some(cache) = self.cache.clone() else {
            return;
        };
        let record = CacheRecord {
            prompt: request.prompt.clone(),
            system_prompt: request.system_prompt.clone(),
            model: self.model.clone(),
            response: text.to_string(),
            temperature: request.temperature,
            top_p: request.top_p,
            max_length: request.max_length,
            owner_scope: request.scope.clone(),
        };
        let handle = tokio::task::spawn_blocking(move || cache.store(&key, &record));
        if let Ok(mut pending) = self.pending.lock() {
            pending.retain(|h| !h.is_finished());
            pending.push(handle);
        }
    }

    fn record_route(route: &'static str) {
        metrics::counter!(telemetry::ROUTE_DECISIONS_TOTAL, "route" => route).increment(1);
    }
}
