//! Supervisor configuration.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// What the supervisor does when the policy engine itself fails.
///
/// Policy decisions are unaffected; this only covers engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailMode {
    /// Surface the engine failure to the caller.
    #[default]
    Closed,
    /// Log the failure and treat the assessment as allow.
    Open,
}

/// Limits and failure behavior applied to every supervised call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    max_attempts: NonZeroU32,
    max_route_depth: usize,
    fail_mode: FailMode,
}

impl SupervisorConfig {
    /// Creates a configuration with the supplied attempt budget.
    #[must_use]
    pub const fn new(max_attempts: NonZeroU32) -> Self {
        Self {
            max_attempts,
            max_route_depth: 4,
            fail_mode: FailMode::Closed,
        }
    }

    /// Sets the maximum number of invocations per call.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: NonZeroU32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets how many route hops one call may take.
    #[must_use]
    pub const fn with_max_route_depth(mut self, depth: usize) -> Self {
        self.max_route_depth = depth;
        self
    }

    /// Sets the engine failure behavior.
    #[must_use]
    pub const fn with_fail_mode(mut self, fail_mode: FailMode) -> Self {
        self.fail_mode = fail_mode;
        self
    }

    /// Returns the maximum number of invocations per call.
    #[must_use]
    pub const fn max_attempts(self) -> NonZeroU32 {
        self.max_attempts
    }

    /// Returns the route hop limit.
    #[must_use]
    pub const fn max_route_depth(self) -> usize {
        self.max_route_depth
    }

    /// Returns the engine failure behavior.
    #[must_use]
    pub const fn fail_mode(self) -> FailMode {
        self.fail_mode
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::new(NonZeroU32::new(3).expect("non-zero"))
    }
}
