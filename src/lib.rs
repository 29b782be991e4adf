//! switchyard - local-or-remote text generation with a persistent response cache
//!
//! Each request is answered by the first of:
//!
//! 1. the response cache (SQLite, TTL expiry, optional zstd compression),
//! 2. a local generator, when one is configured and the host has the
//!    headroom to run it,
//! 3. an ordered chain of remote backends, each under its own timeout.
//!
//! Local failure always falls back to the remote chain, and an exhausted
//! chain yields a clearly-marked "no result" response instead of an error.
//!
//! # Example
//!
//! ```rust,no_run
//! use switchyard::{CacheConfig, GenerateRequest, Switchyard};
//!
//! #[tokio::main]
//! async fn main() -> switchyard::Result<()> {
//!     let router = Switchyard::builder()
//!         .default_backends()
//!         .cache_at("response_cache.db", CacheConfig::default())
//!         .build()?;
//!
//!     let response = router
//!         .generate(&GenerateRequest::new("What is the capital of France?").temperature(0.2))
//!         .await?;
//!
//!     println!("{} (cached: {})", response.generated_text, response.cached);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod capability;
pub mod error;
pub mod gateway;
pub mod model;
pub mod providers;
#[cfg(feature = "server")]
pub mod server;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use cache::{CacheConfig, CacheKey, CacheStats, ResponseCache};
pub use capability::{
    Assessment, CapabilityAssessor, CapabilityScorer, CapabilityVerdict, ResourceProbe,
    ResourceSnapshot, SystemProbe,
};
pub use error::{Result, SwitchyardError};
pub use gateway::{ExecutionMode, InferenceRouter, RouteContext, RouteState, Switchyard, SwitchyardBuilder};
pub use model::{DownloadHandle, DownloadProgress, DownloadStatus, HubDownloads};
pub use providers::{
    BackendDescriptor, DispatchOutcome, FallbackDispatcher, LocalGenerator, ModelDownloads,
    RequestTemplate, ResponseShape,
};
pub use types::{GenerateRequest, GenerateResponse, GenerationSource, PreparedRequest, RequestLimits};

/// Crate version.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
