//! HTTP surface over [`InferenceRouter`].
//!
//! | Method | Path                         | Body                        |
//! |--------|------------------------------|-----------------------------|
//! | POST   | `/generate`                  | [`GenerateRequest`]         |
//! | GET    | `/cache-stats`               |                             |
//! | POST   | `/cache/purge`               |                             |
//! | POST   | `/cache/set-ttl`             | `{ttl_seconds}`             |
//! | POST   | `/cache/toggle-compression`  | `{enabled}`                 |
//! | POST   | `/cache/clean`               |                             |
//! | GET    | `/health`                    |                             |
//! | GET    | `/system-info`               |                             |
//! | GET    | `/download-progress`         |                             |
//! | POST   | `/download-model`            | `{model?, consent}`         |

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};

use crate::cache::{CacheStats, ResponseCache};
use crate::gateway::InferenceRouter;
use crate::model::DownloadProgress;
use crate::types::GenerateRequest;
use crate::{PKG_VERSION, Result, SwitchyardError};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    router: Arc<InferenceRouter>,
}

/// Build the application with CORS for `allowed_origins` (empty allows any).
pub fn app(router: Arc<InferenceRouter>, allowed_origins: &[String]) -> Router {
    let origins = if allowed_origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    Router::new()
        .route("/generate", post(generate_handler))
        .route("/cache-stats", get(cache_stats_handler))
        .route("/cache/purge", post(purge_handler))
        .route("/cache/set-ttl", post(set_ttl_handler))
        .route("/cache/toggle-compression", post(toggle_compression_handler))
        .route("/cache/clean", post(clean_handler))
        .route("/health", get(health_handler))
        .route("/system-info", get(system_info_handler))
        .route("/download-progress", get(download_progress_handler))
        .route("/download-model", post(download_model_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(AppState { router })
}

/// Bind `address` and serve until Ctrl-C.
pub async fn serve(app: Router, address: &str) -> Result<()> {
    let addr: SocketAddr = address
        .parse()
        .map_err(|e| SwitchyardError::Configuration(format!("invalid address {address}: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| SwitchyardError::Configuration(format!("cannot bind {addr}: {e}")))?;
    info!(%addr, "yardd listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
            }
        })
        .await
        .map_err(|e| SwitchyardError::Configuration(format!("server error: {e}")))
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "status": "error", "detail": message.into() })),
    )
        .into_response()
}

fn cache_disabled() -> Response {
    error_response(StatusCode::SERVICE_UNAVAILABLE, "response cache is disabled")
}

/// Run a blocking cache operation off the async workers.
async fn with_cache<T, F>(cache: &ResponseCache, op: F) -> Option<T>
where
    F: FnOnce(&ResponseCache) -> T + Send + 'static,
    T: Send + 'static,
{
    let cache = cache.clone();
    match tokio::task::spawn_blocking(move || op(&cache)).await {
        Ok(value) => Some(value),
        Err(e) => {
            error!(error = %e, "cache task failed");
            None
        }
    }
}

// ============================================================================
// Generation
// ============================================================================

async fn generate_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    match state.router.generate(&request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) if e.is_validation() => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => {
            error!(error = %e, "generation failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// ============================================================================
// Cache administration
// ============================================================================

async fn cache_stats_handler(State(state): State<AppState>) -> Response {
    let Some(cache) = state.router.cache() else {
        return Json(CacheStats::disabled()).into_response();
    };
    match with_cache(cache, |c| c.stats()).await {
        Some(Ok(stats)) => Json(stats).into_response(),
        Some(Err(e)) => {
            warn!(error = %e, "cache stats unavailable");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        None => error_response(StatusCode::INTERNAL_SERVER_ERROR, "cache task failed"),
    }
}

async fn purge_handler(State(state): State<AppState>) -> Response {
    let Some(cache) = state.router.cache() else {
        return cache_disabled();
    };
    match with_cache(cache, |c| c.purge()).await {
        Some(true) => Json(json!({ "status": "ok" })).into_response(),
        _ => error_response(StatusCode::INTERNAL_SERVER_ERROR, "purge failed"),
    }
}

#[derive(Deserialize)]
struct SetTtlBody {
    ttl_seconds: i64,
}

async fn set_ttl_handler(State(state): State<AppState>, Json(body): Json<SetTtlBody>) -> Response {
    if body.ttl_seconds <= 0 {
        return error_response(StatusCode::BAD_REQUEST, "ttl_seconds must be positive");
    }
    let Some(cache) = state.router.cache() else {
        return cache_disabled();
    };
    let seconds = body.ttl_seconds;
    match with_cache(cache, move |c| c.set_ttl(seconds)).await {
        Some(true) => Json(json!({ "status": "ok", "ttl_seconds": seconds })).into_response(),
        _ => error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to update TTL"),
    }
}

#[derive(Deserialize)]
struct ToggleCompressionBody {
    enabled: bool,
}

async fn toggle_compression_handler(
    State(state): State<AppState>,
    Json(body): Json<ToggleCompressionBody>,
) -> Response {
    let Some(cache) = state.router.cache() else {
        return cache_disabled();
    };
    let enabled = body.enabled;
    match with_cache(cache, move |c| c.set_compression(enabled)).await {
        Some(true) => {
            Json(json!({ "status": "ok", "compression_enabled": enabled })).into_response()
        }
        _ => error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to update compression"),
    }
}

async fn clean_handler(State(state): State<AppState>) -> Response {
    let Some(cache) = state.router.cache().cloned() else {
        return cache_disabled();
    };
    tokio::task::spawn_blocking(move || cache.sweep_expired());
    Json(json!({ "status": "cleaning" })).into_response()
}

// ============================================================================
// Host and model status
// ============================================================================

async fn health_handler(State(state): State<AppState>) -> Response {
    let router = &state.router;
    let local_available = if router.local_configured() {
        router.assess().await.verdict.can_run_local
    } else {
        false
    };
    Json(json!({
        "status": "ok",
        "version": PKG_VERSION,
        "model": router.model(),
        "mode": router.mode(),
        "local_available": local_available,
    }))
    .into_response()
}

async fn system_info_handler(State(state): State<AppState>) -> Response {
    let assessment = state.router.assess().await;
    Json(json!({
        "resources": assessment.snapshot,
        "verdict": assessment.verdict,
        "local_configured": state.router.local_configured(),
        "backends": state
            .router
            .dispatcher()
            .backends()
            .iter()
            .map(|b| b.name.as_str())
            .collect::<Vec<_>>(),
    }))
    .into_response()
}

async fn download_progress_handler(State(state): State<AppState>) -> Response {
    let progress = state
        .router
        .downloads()
        .map(|d| d.progress())
        .unwrap_or_else(DownloadProgress::default);
    Json(progress).into_response()
}

#[derive(Deserialize)]
struct DownloadModelBody {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    consent: bool,
}

async fn download_model_handler(
    State(state): State<AppState>,
    Json(body): Json<DownloadModelBody>,
) -> Response {
    if !body.consent {
        return error_response(
            StatusCode::BAD_REQUEST,
            "explicit consent is required to download a model",
        );
    }
    let Some(downloads) = state.router.downloads().cloned() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "model downloads are not configured");
    };
    let model = body.model.unwrap_or_else(|| state.router.model().to_string());

    let result = tokio::task::spawn_blocking(move || {
        if downloads.is_cached(&model) {
            return Ok(None);
        }
        downloads.begin_download(&model).map(|h| Some(h.snapshot()))
    })
    .await;

    match result {
        Ok(Ok(None)) => Json(json!({ "status": "already_cached" })).into_response(),
        Ok(Ok(Some(progress))) => {
            Json(json!({ "status": "started", "progress": progress })).into_response()
        }
        Ok(Err(e @ SwitchyardError::DownloadInProgress { .. })) => {
            error_response(StatusCode::CONFLICT, e.to_string())
        }
        Ok(Err(e)) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
