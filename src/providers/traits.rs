//! Collaborator traits consumed by the router.
//!
//! The router never runs a model itself. Local generation and model
//! downloads are external collaborators behind these traits, so the
//! routing logic can be tested with in-process fakes.
//!
//! # Failure semantics
//!
//! A [`LocalGenerator`] may fail for any reason (weights missing, out of
//! memory, device error). Every such error is recoverable: the router logs
//! it and hands the request to the remote backend chain.

use async_trait::async_trait;

use crate::Result;
use crate::model::{DownloadHandle, DownloadProgress};
use crate::types::PreparedRequest;

// ============================================================================
// Local generation
// ============================================================================

/// Runs inference on local compute.
#[async_trait]
pub trait LocalGenerator: Send + Sync {
    /// Generator name for logging.
    fn name(&self) -> &str;

    /// Model identifier this generator serves; part of the cache key.
    fn model(&self) -> &str;

    /// Generate text for a validated request.
    async fn generate(&self, request: &PreparedRequest) -> Result<String>;
}

// ============================================================================
// Model downloads
// ============================================================================

/// Tracks which models are available on disk and fetches missing ones.
pub trait ModelDownloads: Send + Sync {
    /// Whether `model` is fully present in the local model cache.
    fn is_cached(&self, model: &str) -> bool;

    /// Start fetching `model` in the background.
    ///
    /// Returns the handle of the already-running download if one is in
    /// progress for the same model, and an error if a different model is
    /// being fetched.
    fn begin_download(&self, model: &str) -> Result<DownloadHandle>;

    /// Snapshot of the current (or last) download.
    fn progress(&self) -> DownloadProgress;
}
