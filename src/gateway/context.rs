//! Per-request routing state.

use tracing::debug;

/// Where a request is in its routing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Received,
    CacheCheck,
    LocalAttempt,
    LocalFailed,
    RemoteAttempt,
    CacheWrite,
    Done,
}

/// State owned by one request while it is routed.
///
/// Nothing here is shared between requests; each call to
/// [`InferenceRouter::route`](super::InferenceRouter::route) gets its own.
#[derive(Debug, Clone)]
pub struct RouteContext {
    trail: Vec<RouteState>,
    fallback: bool,
    local_viable: Option<bool>,
}

impl RouteContext {
    pub(crate) fn new() -> Self {
        Self {
            trail: vec![RouteState::Received],
            fallback: false,
            local_viable: None,
        }
    }

    pub(crate) fn advance(&mut self, next: RouteState) {
        debug!(from = ?self.state(), to = ?next, "route transition");
        self.trail.push(next);
    }

    pub(crate) fn mark_fallback(&mut self) {
        self.fallback = true;
    }

    pub(crate) fn set_local_viable(&mut self, viable: bool) {
        self.local_viable = Some(viable);
    }

    /// Current state.
    pub fn state(&self) -> RouteState {
        self.trail.last().copied().unwrap_or(RouteState::Received)
    }

    /// Every state visited, in order.
    pub fn trail(&self) -> &[RouteState] {
        &self.trail
    }

    /// Whether `state` was visited.
    pub fn visited(&self, state: RouteState) -> bool {
        self.trail.contains(&state)
    }

    /// Whether local generation failed and the remote chain answered.
    pub fn fallback(&self) -> bool {
        self.fallback
    }

    /// Local viability decided for this request, if it was assessed.
    pub fn local_viable(&self) -> Option<bool> {
        self.local_viable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_received_and_records_transitions() {
        let mut ctx = RouteContext::new();
        assert_eq!(ctx.state(), RouteState::Received);
        ctx.advance(RouteState::CacheCheck);
        ctx.advance(RouteState::Done);
        assert_eq!(
            ctx.trail(),
            &[RouteState::Received, RouteState::CacheCheck, RouteState::Done]
        );
        assert!(!ctx.visited(RouteState::LocalAttempt));
        assert!(!ctx.fallback());
    }
}
