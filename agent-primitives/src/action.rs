//! Static identity of registered actions.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Metadata describing a registered action.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionMetadata {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output_type: Option<String>,
}

impl ActionMetadata {
    /// Creates metadata for the supplied name and action type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidActionMetadata`] if either field is empty.
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidActionMetadata {
                reason: "action name cannot be empty".into(),
            });
        }

        let kind = kind.into();
        if kind.trim().is_empty() {
            return Err(Error::InvalidActionMetadata {
                reason: "action type cannot be empty".into(),
            });
        }

        Ok(Self {
            name,
            kind,
            output_type: None,
        })
    }

    /// Declares the shape of the payload the action produces.
    #[must_use]
    pub fn with_output_type(mut self, output_type: impl Into<String>) -> Self {
        self.output_type = Some(output_type.into());
        self
    }

    /// Returns the action name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the action type (e.g. `generator`, `router`, `agent`).
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the declared output type, if any.
    #[must_use]
    pub fn output_type(&self) -> Option<&str> {
        self.output_type.as_deref()
    }
}
