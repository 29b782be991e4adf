//! Model downloads from the HuggingFace Hub.
//!
//! [`HubDownloads`] answers "is this model on disk?" by looking at the hub
//! cache layout (`models--{org}--{name}/snapshots/...`) and fetches missing
//! models on a background thread. Only one download runs at a time; its
//! progress is shared through a [`DownloadHandle`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::providers::ModelDownloads;
use crate::{Result, SwitchyardError};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.1";

/// Download lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    #[default]
    Idle,
    Downloading,
    Completed,
    Error,
}

/// Progress of the current (or last) download.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub status: DownloadStatus,
    pub model: Option<String>,
    /// Percent complete, `0..=100`.
    pub progress: u8,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub error: Option<String>,
    /// Estimated total size in MB.
    pub size_mb: u64,
    pub downloaded_mb: u64,
}

/// Shared, updatable view of one download.
#[derive(Debug, Clone, Default)]
pub struct DownloadHandle(Arc<Mutex<DownloadProgress>>);

impl DownloadHandle {
    /// Current progress.
    pub fn snapshot(&self) -> DownloadProgress {
        self.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock().status == DownloadStatus::Downloading
    }

    fn lock(&self) -> MutexGuard<'_, DownloadProgress> {
        // Progress is plain data; a writer that panicked leaves it readable.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update(&self, f: impl FnOnce(&mut DownloadProgress)) {
        f(&mut self.lock());
    }

    fn fail(&self, message: String) {
        self.update(|p| {
            p.status = DownloadStatus::Error;
            p.error = Some(message);
            p.completed_at = Some(now_secs());
        });
    }
}

/// Estimated on-disk size of a model in MB.
///
/// Known models use measured sizes; otherwise the parameter count in the
/// name decides, with 15 000 MB when nothing matches.
pub fn estimate_model_size(model: &str) -> u64 {
    const KNOWN: &[(&str, u64)] = &[
        ("mistralai/Mistral-7B-Instruct-v0.1", 13_000),
        ("mistralai/Mixtral-8x7B-Instruct-v0.1", 26_000),
        ("meta-llama/Llama-2-7b-chat-hf", 13_500),
    ];
    if let Some((_, size)) = KNOWN.iter().find(|(name, _)| *name == model) {
        return *size;
    }
    let lower = model.to_lowercase();
    if lower.contains("7b") {
        14_000
    } else if lower.contains("13b") {
        25_000
    } else if lower.contains("70b") {
        140_000
    } else {
        15_000
    }
}

/// Directory name the hub cache uses for a model repository.
pub fn hub_repo_dir(model: &str) -> String {
    format!("models--{}", model.replace('/', "--"))
}

/// Default hub cache: `$HF_HUB_CACHE`, else `$HF_HOME/hub`, else
/// `~/.cache/huggingface/hub`.
pub fn default_hub_cache() -> PathBuf {
    if let Ok(dir) = std::env::var("HF_HUB_CACHE") {
        return PathBuf::from(dir);
    }
    if let Ok(home) = std::env::var("HF_HOME") {
        return PathBuf::from(home).join("hub");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cache")
        .join("huggingface")
        .join("hub")
}

/// [`ModelDownloads`] backed by the HuggingFace hub cache.
#[derive(Debug, Clone)]
pub struct HubDownloads {
    cache_dir: PathBuf,
    current: Arc<Mutex<DownloadHandle>>,
}

impl HubDownloads {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            current: Arc::new(Mutex::new(DownloadHandle::default())),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn current(&self) -> Result<MutexGuard<'_, DownloadHandle>> {
        self.current
            .lock()
            .map_err(|e| SwitchyardError::Configuration(format!("download state poisoned: {e}")))
    }
}

impl Default for HubDownloads {
    fn default() -> Self {
        Self::new(default_hub_cache())
    }
}

impl ModelDownloads for HubDownloads {
    fn is_cached(&self, model: &str) -> bool {
        let snapshots = self.cache_dir.join(hub_repo_dir(model)).join("snapshots");
        std::fs::read_dir(&snapshots)
            .map(|mut entries| entries.any(|e| e.is_ok()))
            .unwrap_or(false)
    }

    fn begin_download(&self, model: &str) -> Result<DownloadHandle> {
        let mut current = self.current()?;
        if current.is_running() {
            let running = current.snapshot().model.unwrap_or_default();
            if running == model {
                return Ok(current.clone());
            }
            return Err(SwitchyardError::DownloadInProgress { running });
        }

        let handle = DownloadHandle(Arc::new(Mutex::new(DownloadProgress {
            status: DownloadStatus::Downloading,
            model: Some(model.to_string()),
            started_at: Some(now_secs()),
            size_mb: estimate_model_size(model),
            ..DownloadProgress::default()
        })));
        *current = handle.clone();
        drop(current);

        info!(model, cache_dir = %self.cache_dir.display(), "starting model download");
        let worker = handle.clone();
        let cache_dir = self.cache_dir.clone();
        let repo = model.to_string();
        std::thread::Builder::new()
            .name("switchyard-download".into())
            .spawn(move || fetch(&cache_dir, &repo, &worker))
            .map_err(|e| {
                handle.fail(e.to_string());
                SwitchyardError::Configuration(format!("cannot spawn download thread: {e}"))
            })?;
        Ok(handle)
    }

    fn progress(&self) -> DownloadProgress {
        match self.current() {
            Ok(current) => current.snapshot(),
            Err(_) => DownloadProgress::default(),
        }
    }
}

#[cfg(feature = "hub")]
fn fetch(cache_dir: &Path, model: &str, handle: &DownloadHandle) {
    match fetch_files(cache_dir, model, handle) {
        Ok(()) => {
            info!(model, "model download completed");
            handle.update(|p| {
                p.status = DownloadStatus::Completed;
                p.progress = 100;
                p.completed_at = Some(now_secs());
            });
        }
        Err(e) => {
            error!(model, error = %e, "model download failed");
            handle.fail(e.to_string());
        }
    }
}

#[cfg(feature = "hub")]
fn fetch_files(cache_dir: &Path, model: &str, handle: &DownloadHandle) -> Result<()> {
    let api = hf_hub::api::sync::ApiBuilder::new()
        .with_cache_dir(cache_dir.to_path_buf())
        .build()
        .map_err(|e| SwitchyardError::Configuration(format!("Failed to initialize HF API: {e}")))?;
    let repo = api.model(model.to_string());
    let info = repo
        .info()
        .map_err(|e| SwitchyardError::Configuration(format!("Failed to list {model}: {e}")))?;

    let total = info.siblings.len().max(1);
    let mut downloaded_bytes = 0u64;
    for (done, file) in info.siblings.iter().enumerate() {
        let path = repo.get(&file.rfilename).map_err(|e| {
            SwitchyardError::Configuration(format!(
                "Failed to download {} from {model}: {e}",
                file.rfilename
            ))
        })?;
        downloaded_bytes += std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        handle.update(|p| {
            p.progress = ((done + 1) * 100 / total).min(99) as u8;
            p.downloaded_mb = downloaded_bytes / (1024 * 1024);
        });
    }
    Ok(())
}

#[cfg(not(feature = "hub"))]
fn fetch(_cache_dir: &Path, model: &str, handle: &DownloadHandle) {
    error!(model, "model downloads require the `hub` feature");
    handle.fail("model downloads require the `hub` feature".to_string());
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
