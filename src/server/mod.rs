//! HTTP daemon support.
//!
//! This module provides:
//! - Configuration types and file loading (`config`)
//! - The axum application and its handlers (`http`)

pub mod config;
pub mod http;

pub use config::Config;
pub use http::{AppState, app, serve};
