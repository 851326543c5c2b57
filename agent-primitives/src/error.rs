//! Shared error definitions for agent primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the governance runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided call identifier could not be parsed.
    #[error("invalid call id: {source}")]
    InvalidCallId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// Fact failed validation.
    #[error("invalid fact `{predicate}`: {reason}")]
    InvalidFact {
        /// The offending predicate.
        predicate: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Action metadata failed validation.
    #[error("invalid action metadata: {reason}")]
    InvalidActionMetadata {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Label failed validation.
    #[error("invalid label: {reason}")]
    InvalidLabel {
        /// Human-readable reason for rejection.
        reason: String,
    },
}
