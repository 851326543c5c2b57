//! Per-call context: identity, cancellation, deadline, and route path.

use std::time::Duration;

use agent_primitives::CallId;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ActionError, ActionResult};

/// Context threaded through one call and every action it routes to.
///
/// Routed calls share the parent's [`CallId`], cancellation token and
/// deadline; only the route path grows.
#[derive(Debug, Clone)]
pub struct CallContext {
    call_id: CallId,
    token: CancellationToken,
    deadline: Option<Instant>,
    route: Vec<String>,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CallContext {
    /// Creates a context with a fresh call id and no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            call_id: CallId::random(),
            token: CancellationToken::new(),
            deadline: None,
            route: Vec::new(),
        }
    }

    /// Uses the supplied token, typically a child of the caller's token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Sets an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline relative to now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns the call identifier.
    #[must_use]
    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancels the call and everything routed from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` once the call was cancelled or its deadline passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|at| Instant::now() >= at)
    }

    /// Fails with [`ActionError::Cancelled`] when the call is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Cancelled`] after cancellation or the deadline.
    pub fn check(&self) -> ActionResult<()> {
        if self.is_cancelled() {
            Err(ActionError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Completes when the call is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Returns the actions routed through so far, oldest first.
    #[must_use]
    pub fn route_path(&self) -> &[String] {
        &self.route
    }

    /// Returns how many route hops this call has taken.
    #[must_use]
    pub fn route_depth(&self) -> usize {
        self.route.len()
    }

    /// Returns `true` if the route path already contains `action`.
    #[must_use]
    pub fn has_visited(&self, action: &str) -> bool {
        self.route.iter().any(|entry| entry == action)
    }

    /// Derives the context for a hop from `from` to another action.
    #[must_use]
    pub fn routed_from(&self, from: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.route.push(from.into());
        next
    }
}
