//! Configuration loading for yardd.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.switchyard/config.toml` (user)
//! 3. `/etc/switchyard/config.toml` (system)
//!
//! With no file at all the daemon runs on defaults. API keys never live in
//! the config file: each backend names the environment variable to read.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::capability::CapabilityScorer;
use crate::gateway::{ExecutionMode, Switchyard, SwitchyardBuilder};
use crate::model::{DEFAULT_MODEL, HubDownloads, default_hub_cache};
use crate::providers::{BackendDescriptor, RequestTemplate, ResponseShape};
use crate::types::RequestLimits;
use crate::{Result, SwitchyardError};

/// Daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub local: LocalSection,
    #[serde(default)]
    pub limits: RequestLimits,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

/// Server network configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:8000).
    #[serde(default = "default_address")]
    pub address: String,
    /// CORS origins; empty allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:8000".to_string()
}

/// Response cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Database path (default: `<cache dir>/switchyard/response_cache.db`).
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default)]
    pub compression: bool,
    /// Period of the background expiry sweep; 0 disables it.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            ttl_secs: default_ttl_secs(),
            compression: false,
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl CacheSection {
    /// Configured path, or the platform cache directory.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("switchyard")
                .join("response_cache.db")
        })
    }
}

fn default_true() -> bool {
    true
}

fn default_ttl_secs() -> u64 {
    86_400
}

fn default_sweep_interval() -> u64 {
    3_600
}

/// Local execution settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalSection {
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Model identifier used in cache keys and download checks.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_min_memory_mb")]
    pub min_available_memory_mb: u64,
    #[serde(default = "default_window")]
    pub assessment_window_secs: u64,
    #[serde(default)]
    pub download_missing: bool,
    /// HuggingFace hub cache (default: `$HF_HUB_CACHE` or `~/.cache/huggingface/hub`).
    #[serde(default)]
    pub hub_cache_dir: Option<PathBuf>,
}

impl Default for LocalSection {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            model: default_model(),
            min_available_memory_mb: default_min_memory_mb(),
            assessment_window_secs: default_window(),
            download_missing: false,
            hub_cache_dir: None,
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_min_memory_mb() -> u64 {
    2_048
}

fn default_window() -> u64 {
    30
}

/// One `[[backends]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    pub endpoint: String,
    pub template: RequestTemplate,
    pub result_field: String,
    #[serde(default)]
    pub shape: ResponseShape,
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
    /// Environment variable holding the bearer token.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_backend_timeout() -> u64 {
    30
}

impl BackendConfig {
    /// Resolve into a descriptor, reading the API key from the environment.
    pub fn to_descriptor(&self) -> BackendDescriptor {
        let mut descriptor = BackendDescriptor::new(
            &self.name,
            &self.endpoint,
            self.template.clone(),
            &self.result_field,
        )
        .shape(self.shape)
        .timeout(Duration::from_secs(self.timeout_secs));
        if let Some(key) = self
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
        {
            descriptor = descriptor.api_key(key);
        }
        descriptor
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided; must exist)
    /// 2. `~/.switchyard/config.toml`
    /// 3. `/etc/switchyard/config.toml`
    ///
    /// Returns defaults when no file is found.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SwitchyardError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::parse(&content).map_err(|e| {
            SwitchyardError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| SwitchyardError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.cache.ttl_secs == 0 || i64::try_from(self.cache.ttl_secs).is_err() {
            return Err(SwitchyardError::Configuration(format!(
                "cache.ttl_secs must be between 1 and {}",
                i64::MAX
            )));
        }
        if self.limits.max_length_min > self.limits.max_length_max {
            return Err(SwitchyardError::Configuration(
                "limits.max_length_min exceeds limits.max_length_max".to_string(),
            ));
        }
        for backend in &self.backends {
            if backend.timeout_secs == 0 {
                return Err(SwitchyardError::Configuration(format!(
                    "backend '{}' needs a positive timeout_secs",
                    backend.name
                )));
            }
        }
        Ok(())
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(SwitchyardError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".switchyard").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/switchyard/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Backend chain: the configured list, or the default chain when empty.
    pub fn backend_descriptors(&self) -> Vec<BackendDescriptor> {
        if self.backends.is_empty() {
            BackendDescriptor::default_chain()
        } else {
            self.backends.iter().map(BackendConfig::to_descriptor).collect()
        }
    }

    /// A router builder populated from this configuration.
    pub fn router_builder(&self) -> SwitchyardBuilder {
        let hub_dir = self
            .local
            .hub_cache_dir
            .clone()
            .unwrap_or_else(default_hub_cache);
        let scorer = CapabilityScorer::default()
            .min_available_memory_bytes(self.local.min_available_memory_mb * 1024 * 1024);

        let mut builder = Switchyard::builder()
            .model(&self.local.model)
            .mode(self.local.mode)
            .limits(self.limits)
            .scorer(scorer)
            .assessment_window(Duration::from_secs(self.local.assessment_window_secs))
            .downloads(Arc::new(HubDownloads::new(hub_dir)))
            .download_missing(self.local.download_missing)
            .backends(self.backend_descriptors());

        if self.cache.enabled {
            builder = builder.cache_at(
                self.cache.resolved_path(),
                CacheConfig::new()
                    .ttl(Duration::from_secs(self.cache.ttl_secs))
                    .compression(self.cache.compression),
            );
        }
        builder
    }
}
