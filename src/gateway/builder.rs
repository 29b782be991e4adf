//! Builder for configuring router instances

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::warn;

use super::router::{ExecutionMode, InferenceRouter};
use crate::cache::{CacheConfig, ResponseCache};
use crate::capability::{CapabilityAssessor, CapabilityScorer, ResourceProbe, SystemProbe};
use crate::model::DEFAULT_MODEL;
use crate::providers::{BackendDescriptor, FallbackDispatcher, LocalGenerator, ModelDownloads};
use crate::types::RequestLimits;
use crate::{Result, SwitchyardError};

/// Main entry point for creating router instances.
pub struct Switchyard;

impl Switchyard {
    /// Create a new builder for configuring the router.
    pub fn builder() -> SwitchyardBuilder {
        SwitchyardBuilder::new()
    }
}

enum CacheSetup {
    None,
    Ready(ResponseCache),
    Open(PathBuf, CacheConfig),
}

/// Builder for configuring router instances.
pub struct SwitchyardBuilder {
    model: Option<String>,
    mode: ExecutionMode,
    cache: CacheSetup,
    backends: Vec<BackendDescriptor>,
    limits: RequestLimits,
    local: Option<Arc<dyn LocalGenerator>>,
    probe: Option<Arc<dyn ResourceProbe>>,
    scorer: CapabilityScorer,
    assessment_window: Duration,
    downloads: Option<Arc<dyn ModelDownloads>>,
    download_missing: bool,
}

impl SwitchyardBuilder {
    pub fn new() -> Self {
        Self {
            model: None,
            mode: ExecutionMode::default(),
            cache: CacheSetup::None,
            backends: Vec::new(),
            limits: RequestLimits::default(),
            local: None,
            probe: None,
            scorer: CapabilityScorer::default(),
            assessment_window: Duration::ZERO,
            downloads: None,
            download_missing: false,
        }
    }

    /// Model identifier used in cache keys.
    ///
    /// Defaults to the local generator's model, else [`DEFAULT_MODEL`].
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the execution mode (default: [`ExecutionMode::Auto`]).
    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Use an already-open response cache.
    pub fn cache(mut self, cache: ResponseCache) -> Self {
        self.cache = CacheSetup::Ready(cache);
        self
    }

    /// Open (or create) the response cache at `path` when building.
    ///
    /// If the database cannot be opened the router runs without a cache.
    pub fn cache_at(mut self, path: impl Into<PathBuf>, config: CacheConfig) -> Self {
        self.cache = CacheSetup::Open(path.into(), config);
        self
    }

    /// Append a remote backend (first added = tried first).
    pub fn backend(mut self, backend: BackendDescriptor) -> Self {
        self.backends.push(backend);
        self
    }

    /// Append several remote backends in order.
    pub fn backends(mut self, backends: impl IntoIterator<Item = BackendDescriptor>) -> Self {
        self.backends.extend(backends);
        self
    }

    /// Append the default chain: local Ollama, then the HuggingFace Inference API.
    pub fn default_backends(self) -> Self {
        self.backends(BackendDescriptor::default_chain())
    }

    /// Set request validation limits.
    pub fn limits(mut self, limits: RequestLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Enable local generation through `generator`.
    pub fn local(mut self, generator: Arc<dyn LocalGenerator>) -> Self {
        self.local = Some(generator);
        self
    }

    /// Replace the host probe (default: [`SystemProbe`]).
    pub fn probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Set the capability thresholds.
    pub fn scorer(mut self, scorer: CapabilityScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Reuse a capability assessment for up to `window` (default: none).
    pub fn assessment_window(mut self, window: Duration) -> Self {
        self.assessment_window = window;
        self
    }

    /// Treat "model not downloaded" as "local not viable".
    pub fn downloads(mut self, downloads: Arc<dyn ModelDownloads>) -> Self {
        self.downloads = Some(downloads);
        self
    }

    /// Start downloading the local model when a request finds it missing.
    pub fn download_missing(mut self, enabled: bool) -> Self {
        self.download_missing = enabled;
        self
    }

    /// Build the router.
    ///
    /// Fails with [`SwitchyardError::NoBackend`] when neither a remote
    /// backend nor a local generator is configured.
    pub fn build(self) -> Result<InferenceRouter> {
        if self.backends.is_empty() && self.local.is_none() {
            return Err(SwitchyardError::NoBackend);
        }

        let cache = match self.cache {
            CacheSetup::None => None,
            CacheSetup::Ready(cache) => Some(cache),
            CacheSetup::Open(path, config) => match ResponseCache::open(&path, &config) {
                Ok(cache) => Some(cache),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "response cache unavailable, continuing without it");
                    None
                }
            },
        };

        let model = self
            .model
            .or_else(|| self.local.as_ref().map(|l| l.model().to_string()))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(SystemProbe::new()));
        let assessor =
            CapabilityAssessor::new(probe, self.scorer).with_window(self.assessment_window);

        Ok(InferenceRouter {
            model,
            mode: self.mode,
            cache,
            local: self.local,
            assessor,
            downloads: self.downloads,
            download_missing: self.download_missing,
            dispatcher: FallbackDispatcher::new(self.backends, self.limits)?,
            pending: Mutex::new(Vec::new()),
        })
    }
}

impl Default for SwitchyardBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_without_any_generator_fails() {
        assert!(matches!(
            Switchyard::builder().build(),
            Err(SwitchyardError::NoBackend)
        ));
    }

    #[test]
    fn build_with_default_backends() {
        let router = Switchyard::builder().default_backends().build().unwrap();
        assert_eq!(router.dispatcher().backends().len(), 2);
        assert_eq!(router.model(), DEFAULT_MODEL);
        assert!(router.cache().is_none());
        assert!(!router.local_configured());
    }

    #[test]
    fn unopenable_cache_degrades_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let router = Switchyard::builder()
            .default_backends()
            .cache_at(blocker.join("cache.db"), CacheConfig::default())
            .build()
            .unwrap();
        assert!(router.cache().is_none());
    }
}
