//! Generation providers.
//!
//! - [`traits`]: collaborator seams, [`LocalGenerator`] and [`ModelDownloads`].
//! - [`backend`]: [`BackendDescriptor`], one remote endpoint and how to talk to it.
//! - [`dispatcher`]: [`FallbackDispatcher`], the ordered remote chain.

pub mod backend;
pub mod dispatcher;
pub mod traits;

pub use backend::{BackendDescriptor, RequestTemplate, ResponseShape};
pub use dispatcher::{DispatchOutcome, FallbackDispatcher};
pub use traits::{LocalGenerator, ModelDownloads};
