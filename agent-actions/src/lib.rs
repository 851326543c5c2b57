//! Action contract and registry for governed calls.
//!
//! Every unit of work the governance layer supervises implements [`Action`]:
//! it receives an [`Envelope`](agent_primitives::Envelope) and a
//! [`CallContext`], and returns an envelope or a single [`ActionError`] that
//! tells policy violations apart from ordinary failures.

#![warn(missing_docs, clippy::pedantic)]

pub mod action;
pub mod context;
pub mod error;
pub mod function;
pub mod registry;

pub use action::Action;
pub use context::CallContext;
pub use error::{ActionError, ActionResult, PolicyViolation, RouteFailure, ViolationKind};
pub use function::{ActionFuture, FnAction};
pub use registry::ActionRegistry;
