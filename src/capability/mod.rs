//! Local-execution capability assessment.
//!
//! A [`ResourceProbe`] samples the host, a [`CapabilityScorer`] turns the
//! sample into a [`CapabilityVerdict`], and [`CapabilityAssessor`] ties the
//! two together with an optional short reuse window so a burst of requests
//! does not sample the host once per request.

mod probe;
mod scorer;

pub use probe::{ResourceProbe, ResourceSnapshot, StaticProbe, SystemProbe};
pub use scorer::{CapabilityScorer, CapabilityVerdict};

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

/// A snapshot together with the verdict derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Assessment {
    pub snapshot: ResourceSnapshot,
    pub verdict: CapabilityVerdict,
}

/// Samples and scores the host.
#[derive(Clone)]
pub struct CapabilityAssessor {
    probe: Arc<dyn ResourceProbe>,
    scorer: CapabilityScorer,
    window: Option<moka::sync::Cache<(), Assessment>>,
}

impl CapabilityAssessor {
    /// Assess with a fresh sample on every call.
    pub fn new(probe: Arc<dyn ResourceProbe>, scorer: CapabilityScorer) -> Self {
        Self {
            probe,
            scorer,
            window: None,
        }
    }

    /// Reuse an assessment for up to `window`. A zero window disables reuse.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = (!window.is_zero()).then(|| {
            moka::sync::Cache::builder()
                .max_capacity(1)
                .time_to_live(window)
                .build()
        });
        self
    }

    pub fn scorer(&self) -> &CapabilityScorer {
        &self.scorer
    }

    /// Sample (or reuse a recent sample) and score it. Blocking.
    pub fn assess(&self) -> Assessment {
        match &self.window {
            Some(window) => window.get_with((), || self.fresh()),
            None => self.fresh(),
        }
    }

    /// [`assess`](Self::assess) on the blocking pool.
    ///
    /// If the blocking task fails, local execution is assumed viable; the
    /// fallback chain covers a wrong guess.
    pub async fn assess_async(&self) -> Assessment {
        let this = self.clone();
        match tokio::task::spawn_blocking(move || this.assess()).await {
            Ok(assessment) => assessment,
            Err(e) => {
                warn!(error = %e, "capability assessment task failed");
                let snapshot = ResourceSnapshot::default();
                Assessment {
                    snapshot,
                    verdict: self.scorer.score(&snapshot),
                }
            }
        }
    }

    fn fresh(&self) -> Assessment {
        let snapshot = self.probe.sample();
        let verdict = self.scorer.score(&snapshot);
        debug!(score = verdict.score, can_run_local = verdict.can_run_local, "assessed host capability");
        Assessment { snapshot, verdict }
    }
}

impl std::fmt::Debug for CapabilityAssessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityAssessor")
            .field("scorer", &self.scorer)
            .field("windowed", &self.window.is_some())
            .finish()
    }
}
