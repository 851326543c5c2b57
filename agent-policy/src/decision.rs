//! Policy decisions returned by rule assessment.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Discriminant of a [`Decision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Action is permitted without further intervention.
    Allow,
    /// Action is blocked outright.
    Halt,
    /// Action should be re-invoked with corrective feedback.
    Retry,
    /// Request should be redirected to another registered action.
    Route,
}

impl DecisionKind {
    /// Returns the lowercase name used in rule heads and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Halt => "halt",
            Self::Retry => "retry",
            Self::Route => "route",
        }
    }
}

impl Display for DecisionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one assessment. The variants are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    /// Proceed.
    #[default]
    Allow,
    /// Block, with a human-readable reason.
    Halt {
        /// Why the request was blocked.
        reason: String,
    },
    /// Re-invoke with feedback for the next attempt.
    Retry {
        /// Corrective feedback made visible to the next attempt.
        feedback: String,
    },
    /// Redirect to another action.
    Route {
        /// Registered name of the target action.
        target: String,
    },
}

impl Decision {
    /// Returns an allow decision.
    #[must_use]
    pub fn allow() -> Self {
        Self::Allow
    }

    /// Returns a halt decision with an explanatory reason.
    #[must_use]
    pub fn halt(reason: impl Into<String>) -> Self {
        Self::Halt {
            reason: reason.into(),
        }
    }

    /// Returns a retry decision carrying feedback.
    #[must_use]
    pub fn retry(feedback: impl Into<String>) -> Self {
        Self::Retry {
            feedback: feedback.into(),
        }
    }

    /// Returns a route decision targeting the named action.
    #[must_use]
    pub fn route(target: impl Into<String>) -> Self {
        Self::Route {
            target: target.into(),
        }
    }

    /// Returns the decision kind.
    #[must_use]
    pub fn kind(&self) -> DecisionKind {
        match self {
            Self::Allow => DecisionKind::Allow,
            Self::Halt { .. } => DecisionKind::Halt,
            Self::Retry { .. } => DecisionKind::Retry,
            Self::Route { .. } => DecisionKind::Route,
        }
    }

    /// Returns true when the decision allows the action to proceed.
    #[must_use]
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Returns true when the decision blocks the action.
    #[must_use]
    pub fn is_halt(&self) -> bool {
        matches!(self, Self::Halt { .. })
    }

    /// Returns true when the decision requests a retry.
    #[must_use]
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry { .. })
    }

    /// Returns true when the decision redirects the request.
    #[must_use]
    pub fn is_route(&self) -> bool {
        matches!(self, Self::Route { .. })
    }

    /// Returns the reason, feedback, or target carried by the decision.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Allow => None,
            Self::Halt { reason } => Some(reason),
            Self::Retry { feedback } => Some(feedback),
            Self::Route { target } => Some(target),
        }
    }
}

impl Display for Decision {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{}({detail:?})", self.kind()),
            None => f.write_str(self.kind().as_str()),
        }
    }
}
