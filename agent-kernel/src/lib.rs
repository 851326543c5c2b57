//! Supervision kernel for governed actions.
//!
//! A [`Supervisor`] wraps an action so every call is assessed against the
//! rule engine before and after it runs, with bounded self-correction on
//! retry decisions and registry-backed dispatch on route decisions. The
//! [`GovernanceKernel`] owns the engine and registry and is the surface most
//! callers use.

#![warn(missing_docs, clippy::pedantic)]

mod config;
mod kernel;
mod observer;
mod state;
mod supervisor;

pub use config::{FailMode, SupervisorConfig};
pub use kernel::GovernanceKernel;
pub use observer::{CompositePolicyObserver, PolicyObserver, TracingPolicyObserver};
pub use state::{CallLifecycle, RetryContext, SupervisorEvent, SupervisorState};
pub use supervisor::{SupervisedAction, Supervisor};
