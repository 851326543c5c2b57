//! Governance layer for MXP actions.
//!
//! Depend on this crate via `cargo add mxp-guard`. It bundles the internal
//! crates behind feature flags: `policy` for the rule engine and scenario
//! compiler, `actions` for the action contract and registry, and `kernel`
//! for supervised execution.
//!
//! ```no_run
//! use mxp_guard::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let kernel = GovernanceKernel::default();
//! kernel.load_rules_str("guard.dl", r#"halt("Data Leakage Blocked") :- label("pii")."#)?;
//! kernel.register_action(FnAction::new(
//!     ActionMetadata::new("llm_generate", "llm")?,
//!     |envelope: Envelope| async move { Ok(envelope) },
//! ))?;
//!
//! let envelope = Envelope::new("summarize this").with_label("pii")?;
//! let result = kernel
//!     .execute_by_name(&CallContext::new(), "llm_generate", envelope)
//!     .await;
//! assert!(result.is_err_and(|err| err.is_policy_violation()));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use agent_primitives as primitives;

/// Rule engine, scenario compiler and fact extraction (enabled by `policy` feature).
#[cfg(feature = "policy")]
pub use agent_policy as policy;

/// Action contract and registry (enabled by `actions` feature).
#[cfg(feature = "actions")]
pub use agent_actions as actions;

/// Supervisor and governance kernel (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use agent_kernel as kernel;

/// Types most governed applications need.
pub mod prelude {
    pub use agent_primitives::{ActionMetadata, ContentType, Envelope, FEEDBACK_KEY, Payload};

    #[cfg(feature = "policy")]
    pub use agent_policy::{Decision, FieldMapping, Phase, RuleEngine};

    #[cfg(feature = "actions")]
    pub use agent_actions::{
        Action, ActionError, ActionResult, CallContext, FnAction, PolicyViolation, ViolationKind,
    };

    #[cfg(feature = "kernel")]
    pub use agent_kernel::{FailMode, GovernanceKernel, Supervisor, SupervisorConfig};
}
