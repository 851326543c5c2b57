//! Per-call supervisor state machine and retry bookkeeping.

use std::fmt::{self, Display, Formatter};
use std::num::NonZeroU32;

use agent_primitives::CallId;
use tracing::{debug, warn};

/// States a supervised call moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Assessing the inbound envelope.
    PreCheck,
    /// Running the wrapped action.
    Invoking,
    /// Assessing the outbound envelope.
    PostCheck,
    /// Feedback recorded; the next attempt starts at pre-check.
    Retrying,
    /// Call returned the outbound envelope.
    Done,
    /// Call ended with a policy violation.
    Halted,
    /// Call was handed to another action.
    Routed,
    /// Call ended with an execution, engine or cancellation error.
    Failed,
}

impl SupervisorState {
    /// Returns `true` once the call has ended.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Halted | Self::Routed | Self::Failed)
    }
}

impl Display for SupervisorState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PreCheck => "pre_check",
            Self::Invoking => "invoking",
            Self::PostCheck => "post_check",
            Self::Retrying => "retrying",
            Self::Done => "done",
            Self::Halted => "halted",
            Self::Routed => "routed",
            Self::Failed => "failed",
        })
    }
}

/// Events driving [`SupervisorState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// Pre-check allowed the call.
    Allowed,
    /// The wrapped action returned an envelope.
    Invoked,
    /// Post-check allowed the output.
    Accepted,
    /// Post-check asked for another attempt within budget.
    RetryRequested,
    /// The next attempt begins.
    Resume,
    /// A halt decision, or a retry with no budget left.
    Blocked,
    /// A route decision was followed.
    Redirected,
    /// Execution, engine or cancellation failure.
    Aborted,
}

/// Tracks the state of one supervised call.
#[derive(Debug, Clone)]
pub struct CallLifecycle {
    call_id: CallId,
    state: SupervisorState,
}

impl CallLifecycle {
    /// Starts a call at pre-check.
    #[must_use]
    pub const fn new(call_id: CallId) -> Self {
        Self {
            call_id,
            state: SupervisorState::PreCheck,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> SupervisorState {
        self.state
    }

    /// Applies an event, returning the resulting state.
    ///
    /// Events that do not apply to the current state leave it unchanged.
    pub fn transition(&mut self, event: SupervisorEvent) -> SupervisorState {
        use SupervisorEvent as E;
        use SupervisorState as S;

        let next = match (self.state, event) {
            (S::PreCheck, E::Allowed) => Some(S::Invoking),
            (S::Invoking, E::Invoked) => Some(S::PostCheck),
            (S::PostCheck, E::Accepted) => Some(S::Done),
            (S::PostCheck, E::RetryRequested) => Some(S::Retrying),
            (S::Retrying, E::Resume) => Some(S::PreCheck),
            (S::PreCheck | S::PostCheck, E::Blocked) => Some(S::Halted),
            (S::PreCheck | S::PostCheck, E::Redirected) => Some(S::Routed),
            (state, E::Aborted) if !state.is_terminal() => Some(S::Failed),
            _ => None,
        };

        match next {
            Some(next_state) => {
                debug!(
                    call_id = %self.call_id,
                    from = %self.state,
                    to = %next_state,
                    ?event,
                    "supervisor transition"
                );
                self.state = next_state;
            }
            None => {
                warn!(
                    call_id = %self.call_id,
                    state = %self.state,
                    ?event,
                    "ignored supervisor transition"
                );
            }
        }
        self.state
    }
}

/// Retry bookkeeping for one supervised call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryContext {
    attempt: u32,
    max_attempts: NonZeroU32,
    feedback: Option<String>,
}

impl RetryContext {
    /// Creates a context with no attempts made.
    #[must_use]
    pub const fn new(max_attempts: NonZeroU32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            feedback: None,
        }
    }

    /// Returns how many invocations have started.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the invocation budget.
    #[must_use]
    pub const fn max_attempts(&self) -> NonZeroU32 {
        self.max_attempts
    }

    /// Returns the most recent feedback, if any.
    #[must_use]
    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    /// Returns `true` while another invocation fits in the budget.
    #[must_use]
    pub const fn has_remaining(&self) -> bool {
        self.attempt < self.max_attempts.get()
    }

    /// Starts the next invocation and returns its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Records feedback for the next attempt.
    pub fn record_feedback(&mut self, feedback: impl Into<String>) {
        self.feedback = Some(feedback.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_loop_flow() {
        let mut lifecycle = CallLifecycle::new(CallId::random());

        assert_eq!(lifecycle.transition(SupervisorEvent::Allowed), SupervisorState::Invoking);
        lifecycle.transition(SupervisorEvent::Invoked);
        assert_eq!(
            lifecycle.transition(SupervisorEvent::RetryRequested),
            SupervisorState::Retrying
        );
        assert_eq!(lifecycle.transition(SupervisorEvent::Resume), SupervisorState::PreCheck);
        lifecycle.transition(SupervisorEvent::Allowed);
        lifecycle.transition(SupervisorEvent::Invoked);
        assert_eq!(lifecycle.transition(SupervisorEvent::Accepted), SupervisorState::Done);
        assert!(lifecycle.state().is_terminal());
    }

    #[test]
    fn terminal_states_ignore_events() {
        let mut lifecycle = CallLifecycle::new(CallId::random());
        assert_eq!(lifecycle.transition(SupervisorEvent::Blocked), SupervisorState::Halted);
        assert_eq!(lifecycle.transition(SupervisorEvent::Aborted), SupervisorState::Halted);
        assert_eq!(lifecycle.transition(SupervisorEvent::Allowed), SupervisorState::Halted);
    }

    #[test]
    fn invoking_cannot_be_blocked() {
        let mut lifecycle = CallLifecycle::new(CallId::random());
        lifecycle.transition(SupervisorEvent::Allowed);
        assert_eq!(lifecycle.transition(SupervisorEvent::Blocked), SupervisorState::Invoking);
        assert_eq!(lifecycle.transition(SupervisorEvent::Aborted), SupervisorState::Failed);
    }

    #[test]
    fn retry_budget_is_bounded() {
        let mut retry = RetryContext::new(NonZeroU32::new(2).unwrap());
        assert!(retry.has_remaining());
        assert_eq!(retry.begin_attempt(), 1);
        retry.record_feedback("Do not use DROP");
        assert_eq!(retry.begin_attempt(), 2);
        assert!(!retry.has_remaining());
        assert_eq!(retry.feedback(), Some("Do not use DROP"));
    }
}
