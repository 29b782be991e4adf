//! Converts a [`ResourceSnapshot`] into a local-execution verdict.

use serde::{Deserialize, Serialize};

use super::probe::ResourceSnapshot;

/// Outcome of scoring a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapabilityVerdict {
    /// Normalized capability score, `0.0..=1.0`.
    pub score: f64,
    /// Whether local execution should be attempted.
    pub can_run_local: bool,
}

/// Neutral sub-score for an unknown CPU or memory reading.
const UNKNOWN_SCORE: f64 = 0.5;
const GPU_SCORE: f64 = 0.8;
const NO_GPU_SCORE: f64 = 0.3;

/// Thresholds for the local-execution verdict.
///
/// [`score`](Self::score) is pure: the same snapshot always produces the
/// same verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityScorer {
    /// Available memory must exceed this. Default: 2 GiB.
    pub min_available_memory_bytes: u64,
    /// CPU busy fraction must stay below this. Default: 0.80.
    pub max_cpu_busy: f64,
    /// Score must exceed this. Default: 0.3.
    pub min_score: f64,
}

impl Default for CapabilityScorer {
    fn default() -> Self {
        Self {
            min_available_memory_bytes: 2 * (1 << 30),
            max_cpu_busy: 0.80,
            min_score: 0.3,
        }
    }
}

impl CapabilityScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the available-memory floor in bytes.
    pub fn min_available_memory_bytes(mut self, bytes: u64) -> Self {
        self.min_available_memory_bytes = bytes;
        self
    }

    /// Set the CPU busy ceiling.
    pub fn max_cpu_busy(mut self, fraction: f64) -> Self {
        self.max_cpu_busy = fraction;
        self
    }

    /// Score a snapshot.
    ///
    /// Unknown CPU or memory readings score a neutral 0.5, and a predicate
    /// whose input is unknown passes.
    pub fn score(&self, snapshot: &ResourceSnapshot) -> CapabilityVerdict {
        let cpu_score = snapshot
            .cpu_busy_fraction
            .map_or(UNKNOWN_SCORE, |busy| 1.0 - busy.clamp(0.0, 1.0));
        let memory_score = snapshot
            .memory_used_fraction
            .map_or(UNKNOWN_SCORE, |used| 1.0 - used.clamp(0.0, 1.0));
        let gpu_score = if snapshot.gpu_present {
            GPU_SCORE
        } else {
            NO_GPU_SCORE
        };
        let score = (cpu_score + memory_score + gpu_score) / 3.0;

        let memory_ok = snapshot
            .memory_available_bytes
            .is_none_or(|avail| avail > self.min_available_memory_bytes);
        let cpu_ok = snapshot
            .cpu_busy_fraction
            .is_none_or(|busy| busy < self.max_cpu_busy);

        CapabilityVerdict {
            score,
            can_run_local: memory_ok && cpu_ok && score > self.min_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1 << 30;

    fn snapshot(cpu: Option<f64>, avail: Option<u64>, used: Option<f64>, gpu: bool) -> ResourceSnapshot {
        ResourceSnapshot {
            cpu_busy_fraction: cpu,
            memory_available_bytes: avail,
            memory_used_fraction: used,
            gpu_present: gpu,
        }
    }

    #[test]
    fn idle_host_with_gpu_runs_local() {
        let v = CapabilityScorer::new().score(&snapshot(Some(0.1), Some(8 * GIB), Some(0.5), true));
        assert!(v.can_run_local);
        assert!((v.score - (0.9 + 0.5 + 0.8) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn busy_cpu_blocks_local() {
        let v = CapabilityScorer::new().score(&snapshot(Some(0.85), Some(8 * GIB), Some(0.2), true));
        assert!(!v.can_run_local);
    }

    #[test]
    fn cpu_threshold_is_strict() {
        let v = CapabilityScorer::new().score(&snapshot(Some(0.80), Some(8 * GIB), Some(0.2), true));
        assert!(!v.can_run_local);
    }

    #[test]
    fn low_memory_blocks_local() {
        let v = CapabilityScorer::new().score(&snapshot(Some(0.1), Some(GIB), Some(0.2), true));
        assert!(!v.can_run_local);
        let exactly = CapabilityScorer::new().score(&snapshot(Some(0.1), Some(2 * GIB), Some(0.2), true));
        assert!(!exactly.can_run_local);
    }

    #[test]
    fn unknown_inputs_are_permissive() {
        let v = CapabilityScorer::new().score(&ResourceSnapshot::default());
        assert!((v.score - (0.5 + 0.5 + 0.3) / 3.0).abs() < 1e-9);
        assert!(v.can_run_local);
    }

    #[test]
    fn low_score_blocks_local() {
        // cpu 0.79 busy, memory 99% used, no GPU: (0.21 + 0.01 + 0.3) / 3 < 0.3
        let v = CapabilityScorer::new().score(&snapshot(Some(0.79), Some(4 * GIB), Some(0.99), false));
        assert!(v.score < 0.3);
        assert!(!v.can_run_local);
    }

    #[test]
    fn scoring_is_deterministic() {
        let s = snapshot(Some(0.3), Some(3 * GIB), Some(0.6), false);
        let scorer = CapabilityScorer::new();
        let first = scorer.score(&s);
        for _ in 0..10 {
            assert_eq!(scorer.score(&s), first);
        }
    }
}
