//! Envelope exchanged between callers and actions.

use std::collections::BTreeSet;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Reserved metadata key carrying feedback from the previous attempt.
pub const FEEDBACK_KEY: &str = "prev_feedback";

/// Reserved metadata key carrying the 1-based attempt number.
pub const ATTEMPT_KEY: &str = "attempt";

/// Declares how a payload should be interpreted for fact extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Free-form text or an opaque structure that is not flattened.
    #[default]
    Plain,
    /// Structured payload whose top-level entries become `field` facts.
    Json,
    /// Raw bytes.
    Binary,
}

/// Payload variants supported by the runtime.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Payload {
    /// No payload.
    #[default]
    Empty,
    /// UTF-8 text.
    Text(String),
    /// Key/value structure.
    Structured(Map<String, Value>),
    /// Raw bytes.
    Bytes(Bytes),
}

impl Payload {
    /// Returns the text payload, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the structured payload, if any.
    #[must_use]
    pub fn as_structured(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Structured(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the raw bytes payload, if any.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns `true` for [`Payload::Empty`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Converts the payload into a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Text(text) => Value::from(text.clone()),
            Self::Structured(map) => Value::Object(map.clone()),
            Self::Bytes(bytes) => Value::from(bytes.to_vec()),
        }
    }

    fn default_content_type(&self) -> ContentType {
        match self {
            Self::Bytes(_) => ContentType::Binary,
            _ => ContentType::Plain,
        }
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(value: Map<String, Value>) -> Self {
        Self::Structured(value)
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

/// Unit passed to and returned from every action.
///
/// Labels are append-only: the envelope offers no way to remove one once it
/// has been attached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    payload: Payload,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default)]
    content_type: ContentType,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    labels: BTreeSet<String>,
}

impl Envelope {
    /// Creates an envelope around the supplied payload.
    ///
    /// Byte payloads default to [`ContentType::Binary`]; everything else to
    /// [`ContentType::Plain`].
    #[must_use]
    pub fn new(payload: impl Into<Payload>) -> Self {
        let payload = payload.into();
        let content_type = payload.default_content_type();
        Self {
            payload,
            metadata: Map::new(),
            content_type,
            labels: BTreeSet::new(),
        }
    }

    /// Creates an envelope with no payload.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a JSON-typed envelope around a structured payload.
    #[must_use]
    pub fn json(map: Map<String, Value>) -> Self {
        Self::new(Payload::Structured(map)).with_content_type(ContentType::Json)
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Replaces the payload, keeping metadata and labels.
    pub fn set_payload(&mut self, payload: impl Into<Payload>) {
        self.payload = payload.into();
    }

    /// Consumes the envelope and returns its payload.
    #[must_use]
    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Returns the metadata map.
    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Returns a metadata value by key.
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Inserts metadata, replacing any previous value for the key.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Adds metadata and returns the updated envelope.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert_metadata(key, value);
        self
    }

    /// Returns feedback left by a previous attempt under [`FEEDBACK_KEY`].
    #[must_use]
    pub fn feedback(&self) -> Option<&str> {
        self.metadata.get(FEEDBACK_KEY).and_then(Value::as_str)
    }

    /// Returns the content type.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// Sets the content type.
    pub fn set_content_type(&mut self, content_type: ContentType) {
        self.content_type = content_type;
    }

    /// Sets the content type and returns the updated envelope.
    #[must_use]
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Returns the labels attached to the envelope.
    #[must_use]
    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    /// Returns `true` if the label is attached.
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// Attaches a label.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLabel`] for empty or whitespace-only labels.
    pub fn add_label(&mut self, label: impl Into<String>) -> Result<()> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(Error::InvalidLabel {
                reason: "label cannot be empty".into(),
            });
        }
        self.labels.insert(label);
        Ok(())
    }

    /// Attaches a label and returns the updated envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLabel`] for empty or whitespace-only labels.
    pub fn with_label(mut self, label: impl Into<String>) -> Result<Self> {
        self.add_label(label)?;
        Ok(self)
    }

    /// Attaches every label from the iterator.
    ///
    /// Nothing is attached unless every label is valid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLabel`] if any label is empty or whitespace-only.
    pub fn extend_labels<I, S>(&mut self, labels: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels = labels
            .into_iter()
            .map(Into::into)
            .map(|label: String| {
                if label.trim().is_empty() {
                    Err(Error::InvalidLabel {
                        reason: "label cannot be empty".into(),
                    })
                } else {
                    Ok(label)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        self.labels.extend(labels);
        Ok(())
    }
}
