//! Core shared types for governed MXP actions.

#![warn(missing_docs, clippy::pedantic)]

mod action;
mod envelope;
mod error;
mod fact;
mod ids;

/// Static identity of a registered action.
pub use action::ActionMetadata;
/// Data unit exchanged with actions, plus its payload variants.
pub use envelope::{ATTEMPT_KEY, ContentType, Envelope, FEEDBACK_KEY, Payload};
/// Error type and result alias shared across the SDK.
pub use error::{Error, Result};
/// Governance facts and ordered fact collections.
pub use fact::{Fact, FactSet};
/// Unique identifier for one supervised call.
pub use ids::CallId;
