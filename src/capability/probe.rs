//! Host resource sampling.

use std::path::Path;
use std::process::Command;
use std::sync::{Mutex, OnceLock};

use serde::Serialize;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tracing::debug;

/// Point-in-time view of host resources.
///
/// Every numeric field may be unknown. The scorer rates an unknown reading
/// a neutral 0.5 and lets its threshold check pass.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ResourceSnapshot {
    /// Fraction of CPU time in use across all cores, `0.0..=1.0`.
    pub cpu_busy_fraction: Option<f64>,
    /// Memory available for new allocations, in bytes.
    pub memory_available_bytes: Option<u64>,
    /// Fraction of total memory in use, `0.0..=1.0`.
    pub memory_used_fraction: Option<f64>,
    /// Whether a usable accelerator was detected.
    pub gpu_present: bool,
}

/// Source of [`ResourceSnapshot`]s.
///
/// Sampling performs blocking syscalls; call from `spawn_blocking` when on
/// an async runtime.
pub trait ResourceProbe: Send + Sync {
    fn sample(&self) -> ResourceSnapshot;
}

/// Probe backed by `sysinfo` plus an NVIDIA device check.
pub struct SystemProbe {
    sys: Mutex<Option<System>>,
    gpu: OnceLock<bool>,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(None),
            gpu: OnceLock::new(),
        }
    }

    fn gpu_present(&self) -> bool {
        *self.gpu.get_or_init(detect_gpu)
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SystemProbe {
    fn sample(&self) -> ResourceSnapshot {
        let gpu_present = self.gpu_present();
        let mut guard = match self.sys.lock() {
            Ok(guard) => guard,
            Err(_) => {
                return ResourceSnapshot {
                    gpu_present,
                    ..ResourceSnapshot::default()
                };
            }
        };

        let sys = match guard.as_mut() {
            Some(sys) => {
                sys.refresh_cpu_usage();
                sys.refresh_memory();
                sys
            }
            None => {
                // CPU usage is a delta between two refreshes.
                let mut sys = System::new_with_specifics(
                    RefreshKind::new()
                        .with_memory(MemoryRefreshKind::everything())
                        .with_cpu(CpuRefreshKind::new().with_cpu_usage()),
                );
                std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
                sys.refresh_cpu_usage();
                guard.insert(sys)
            }
        };

        let total = sys.total_memory();
        let available = sys.available_memory();
        let cpu = f64::from(sys.global_cpu_usage()) / 100.0;

        let snapshot = ResourceSnapshot {
            cpu_busy_fraction: cpu.is_finite().then(|| cpu.clamp(0.0, 1.0)),
            memory_available_bytes: (total > 0).then_some(available),
            memory_used_fraction: (total > 0)
                .then(|| (1.0 - available as f64 / total as f64).clamp(0.0, 1.0)),
            gpu_present,
        };
        debug!(?snapshot, "sampled host resources");
        snapshot
    }
}

/// Probe returning a fixed snapshot.
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub ResourceSnapshot);

impl ResourceProbe for StaticProbe {
    fn sample(&self) -> ResourceSnapshot {
        self.0
    }
}

fn detect_gpu() -> bool {
    if Path::new("/proc/driver/nvidia/gpus").is_dir() || Path::new("/dev/nvidia0").exists() {
        return true;
    }
    let output = Command::new("nvidia-smi")
        .arg("--query-gpu=count")
        .arg("--format=csv,noheader")
        .output();
    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
            .lines()
            .next()
            .and_then(|l| l.trim().parse::<u32>().ok())
            .is_some_and(|n| n > 0),
        _ => false,
    }
}
