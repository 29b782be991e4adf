//! Model download collaborator.

pub mod download;

pub use download::{
    DEFAULT_MODEL, DownloadHandle, DownloadProgress, DownloadStatus, HubDownloads,
    default_hub_cache, estimate_model_size,
};
