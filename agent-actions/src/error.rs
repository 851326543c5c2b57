//! Error surface shared by every action, supervised or not.

use std::fmt::{self, Display, Formatter};

use agent_policy::{Phase, PolicyError};
use thiserror::Error;

/// Result alias for action operations.
pub type ActionResult<T> = Result<T, ActionError>;

/// Kind of policy violation that terminated a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// A rule explicitly blocked the call.
    Halt,
    /// The retry budget ran out without an allow.
    RetryExhausted,
}

impl Display for ViolationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Halt => "halted",
            Self::RetryExhausted => "retry exhausted",
        })
    }
}

/// Policy decision that ended a supervised call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("action `{action}` {kind} at {phase}-check after {attempts} attempt(s): {message}")]
pub struct PolicyViolation {
    kind: ViolationKind,
    action: String,
    phase: Phase,
    message: String,
    attempts: u32,
}

impl PolicyViolation {
    /// Creates a halt violation.
    #[must_use]
    pub fn halt(
        action: impl Into<String>,
        phase: Phase,
        reason: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            kind: ViolationKind::Halt,
            action: action.into(),
            phase,
            message: reason.into(),
            attempts,
        }
    }

    /// Creates a retry-exhausted violation carrying the last feedback.
    #[must_use]
    pub fn retry_exhausted(
        action: impl Into<String>,
        phase: Phase,
        feedback: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            kind: ViolationKind::RetryExhausted,
            action: action.into(),
            phase,
            message: feedback.into(),
            attempts,
        }
    }

    /// Returns the violation kind.
    #[must_use]
    pub fn kind(&self) -> ViolationKind {
        self.kind
    }

    /// Returns the supervised action's name.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Returns the checkpoint that produced the decision.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the halt reason or the last retry feedback.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns how many invocations of the action took place.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Why a route decision could not be followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteFailure {
    /// No action is registered under the target name.
    Unregistered,
    /// The route chain exceeded its depth limit or revisited an action.
    DepthExceeded {
        /// Route depth at the point of failure.
        depth: usize,
    },
    /// The supervisor has no registry to resolve targets against.
    RegistryUnavailable,
}

impl Display for RouteFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unregistered => f.write_str("target is not registered"),
            Self::DepthExceeded { depth } => write!(f, "route depth {depth} exceeded"),
            Self::RegistryUnavailable => f.write_str("no action registry available"),
        }
    }
}

/// Errors produced by action registration and invocation.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The action itself failed.
    #[error("action execution failed: {reason}")]
    Execution {
        /// Human-readable error returned by the action implementation.
        reason: String,
    },

    /// A policy decision terminated the call.
    #[error(transparent)]
    Policy(#[from] PolicyViolation),

    /// A route decision could not be followed.
    #[error("cannot route to `{target}`: {reason}")]
    Route {
        /// Requested route target.
        target: String,
        /// Failure classification.
        reason: RouteFailure,
    },

    /// The caller cancelled the call or its deadline passed.
    #[error("call cancelled")]
    Cancelled,

    /// The policy engine failed and the supervisor runs fail-closed.
    #[error("policy engine failure: {0}")]
    Engine(#[from] PolicyError),

    /// Action metadata failed validation.
    #[error("invalid action metadata: {0}")]
    InvalidMetadata(#[from] agent_primitives::Error),

    /// Action name collided with an existing registration.
    #[error("action `{name}` is already registered")]
    DuplicateAction {
        /// Name of the offending action.
        name: String,
    },

    /// Requested action does not exist.
    #[error("action `{name}` is not registered")]
    UnknownAction {
        /// Name of the missing action.
        name: String,
    },

    /// A typed action could not decode or encode its payload.
    #[error("invalid payload: {reason}")]
    Payload {
        /// Human-readable decoding failure.
        reason: String,
    },
}

impl ActionError {
    /// Creates an execution error from the supplied reason.
    #[must_use]
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }

    /// Creates a payload error from the supplied reason.
    #[must_use]
    pub fn payload(reason: impl Into<String>) -> Self {
        Self::Payload {
            reason: reason.into(),
        }
    }

    /// Creates a route error.
    #[must_use]
    pub fn route(target: impl Into<String>, reason: RouteFailure) -> Self {
        Self::Route {
            target: target.into(),
            reason,
        }
    }

    /// Returns the policy violation when the call was blocked by policy.
    #[must_use]
    pub fn policy_violation(&self) -> Option<&PolicyViolation> {
        match self {
            Self::Policy(violation) => Some(violation),
            _ => None,
        }
    }

    /// Returns `true` when the call was blocked by policy rather than failing.
    #[must_use]
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, Self::Policy(_))
    }
}
