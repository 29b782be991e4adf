//! Request routing: cache, local compute, remote chain.

mod builder;
mod context;
mod router;

pub use builder::{Switchyard, SwitchyardBuilder};
pub use context::{RouteContext, RouteState};
pub use router::{ExecutionMode, InferenceRouter, Routed};
