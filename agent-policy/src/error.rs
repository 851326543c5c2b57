//! Errors surfaced while loading and evaluating policies.

use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use thiserror::Error;

/// Malformed rule or unrecognized scenario step.
///
/// Compile errors are fatal at load time; the rule set they were part of is
/// never installed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct CompileError {
    origin: String,
    line: Option<usize>,
    step: Option<String>,
    message: String,
}

impl CompileError {
    /// Creates an error for the named source.
    #[must_use]
    pub fn new(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            line: None,
            step: None,
            message: message.into(),
        }
    }

    /// Attaches the 1-based line number of the offending clause or step.
    #[must_use]
    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    /// Attaches the offending step or clause text.
    #[must_use]
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    /// Returns the source name (file path, document name, or rule name).
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Returns the line number, when known.
    #[must_use]
    pub fn line(&self) -> Option<usize> {
        self.line
    }

    /// Returns the offending step or clause text, when known.
    #[must_use]
    pub fn step(&self) -> Option<&str> {
        self.step.as_deref()
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for CompileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.origin)?;
        if let Some(line) = self.line {
            write!(f, ":{line}")?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(step) = &self.step {
            write!(f, " (`{step}`)")?;
        }
        Ok(())
    }
}

/// Errors surfaced by policy engines.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Rule or scenario source failed to compile.
    #[error("policy compile error: {0}")]
    Compile(#[from] CompileError),
    /// Rule source could not be read.
    #[error("failed to read policy source `{}`: {source}", .path.display())]
    Io {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Field mapping declared an unusable path.
    #[error("invalid field path `{path}`: {reason}")]
    InvalidFieldPath {
        /// The offending path.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// Backend integration returned an error.
    #[error("policy backend failure: {reason}")]
    Backend {
        /// Human-readable explanation for logging and operators.
        reason: String,
    },
}

impl PolicyError {
    /// Creates a backend failure from the supplied reason.
    #[must_use]
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }
}

/// Result alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_display_includes_location() {
        let err = CompileError::new("policy.feature", "unrecognized step")
            .at_line(4)
            .with_step("Given the moon is full");
        assert_eq!(
            err.to_string(),
            "policy.feature:4: unrecognized step (`Given the moon is full`)"
        );
        assert_eq!(err.line(), Some(4));
    }
}
