//! Fact extraction from envelopes and action identity.

use std::fmt::{self, Display, Formatter};

use agent_primitives::{ActionMetadata, ContentType, Envelope, Fact, FactSet, Payload};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PolicyError, PolicyResult};

/// Checkpoint at which facts are assessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Before the action runs, over the inbound envelope.
    Pre,
    /// After the action runs, over the outbound envelope.
    Post,
}

impl Phase {
    /// Returns the value asserted as `phase(..)`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pre => "pre",
            Self::Post => "post",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Root {
    Payload,
    Metadata,
}

/// One declared `path -> predicate` mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    path: String,
    predicate: String,
}

impl FieldRule {
    /// Returns the dot-separated source path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the predicate asserted for each value found at the path.
    #[must_use]
    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    fn split(&self) -> (Root, Vec<&str>) {
        let mut segments = self.path.split('.');
        let root = match segments.next() {
            Some("metadata") => Root::Metadata,
            _ => Root::Payload,
        };
        (root, segments.collect())
    }
}

/// Declared table mapping envelope field paths to predicates.
///
/// Paths are rooted at `payload` or `metadata`, e.g. `payload.tier` maps the
/// `tier` entry of a structured payload to `tier(Value)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FieldRule>", into = "Vec<FieldRule>")]
pub struct FieldMapping {
    rules: Vec<FieldRule>,
}

impl FieldMapping {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mapping and returns the updated table.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidFieldPath`] when the path is not rooted
    /// at `payload` or `metadata`, has empty segments, or the predicate is
    /// empty.
    pub fn map(
        mut self,
        path: impl Into<String>,
        predicate: impl Into<String>,
    ) -> PolicyResult<Self> {
        self.insert(path, predicate)?;
        Ok(self)
    }

    /// Adds a mapping in place.
    ///
    /// # Errors
    ///
    /// See [`FieldMapping::map`].
    pub fn insert(
        &mut self,
        path: impl Into<String>,
        predicate: impl Into<String>,
    ) -> PolicyResult<()> {
        let rule = FieldRule {
            path: path.into(),
            predicate: predicate.into(),
        };
        validate(&rule)?;
        self.rules.push(rule);
        Ok(())
    }

    /// Returns the declared mappings in order.
    #[must_use]
    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    /// Returns `true` when nothing is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl TryFrom<Vec<FieldRule>> for FieldMapping {
    type Error = PolicyError;

    fn try_from(rules: Vec<FieldRule>) -> Result<Self, Self::Error> {
        for rule in &rules {
            validate(rule)?;
        }
        Ok(Self { rules })
    }
}

impl From<FieldMapping> for Vec<FieldRule> {
    fn from(mapping: FieldMapping) -> Self {
        mapping.rules
    }
}

fn validate(rule: &FieldRule) -> PolicyResult<()> {
    let invalid = |reason| PolicyError::InvalidFieldPath {
        path: rule.path.clone(),
        reason,
    };

    if rule.predicate.trim().is_empty() || rule.predicate.contains(char::is_whitespace) {
        return Err(invalid("predicate must be a non-empty identifier"));
    }
    let mut segments = rule.path.split('.');
    match segments.next() {
        Some("payload") => {}
        Some("metadata") => {
            if !rule.path.contains('.') {
                return Err(invalid("metadata paths must name a key"));
            }
        }
        _ => return Err(invalid("path must start with `payload` or `metadata`")),
    }
    if segments.any(str::is_empty) {
        return Err(invalid("path segments cannot be empty"));
    }
    Ok(())
}

/// Derives the fact base for one assessment.
///
/// Facts are produced in a fixed order: action identity, phase, labels,
/// metadata, flattened JSON fields, then declared mappings.
#[derive(Debug, Clone, Default)]
pub struct FactExtractor {
    mapping: FieldMapping,
}

impl FactExtractor {
    /// Creates an extractor applying the supplied mapping.
    #[must_use]
    pub fn new(mapping: FieldMapping) -> Self {
        Self { mapping }
    }

    /// Returns the configured mapping.
    #[must_use]
    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    /// Extracts facts from the envelope for the given action and phase.
    #[must_use]
    pub fn extract(&self, envelope: &Envelope, action: &ActionMetadata, phase: Phase) -> FactSet {
        let mut facts = FactSet::new();

        facts.insert(Fact::known("action_operation", [action.name()]));
        facts.insert(Fact::known("action_type", [action.kind()]));
        if let Some(output_type) = action.output_type() {
            facts.insert(Fact::known("action_output_type", [output_type]));
        }
        facts.insert(Fact::known("phase", [phase.as_str()]));

        for label in envelope.labels() {
            facts.insert(Fact::known("label", [label.as_str()]));
        }

        for (key, value) in envelope.metadata() {
            for text in scalar_strings(value) {
                facts.insert(Fact::known("metadata", [key.clone(), text]));
            }
        }

        if envelope.content_type() == ContentType::Json {
            if let Some(map) = envelope.payload().as_structured() {
                for (key, value) in map {
                    for text in scalar_strings(value) {
                        facts.insert(Fact::known("field", [key.clone(), text]));
                    }
                }
            }
        }

        for rule in self.mapping.rules() {
            for text in resolve(envelope, rule) {
                // Predicates were validated when the mapping was declared.
                if let Ok(fact) = Fact::new(rule.predicate(), [text]) {
                    facts.insert(fact);
                }
            }
        }

        facts
    }
}

fn resolve(envelope: &Envelope, rule: &FieldRule) -> Vec<String> {
    let (root, segments) = rule.split();
    match root {
        Root::Metadata => walk(envelope.metadata(), &segments),
        Root::Payload => match (envelope.payload(), segments.is_empty()) {
            (Payload::Text(text), true) => vec![text.clone()],
            (Payload::Structured(map), false) => walk(map, &segments),
            _ => Vec::new(),
        },
    }
}

fn walk(map: &Map<String, Value>, segments: &[&str]) -> Vec<String> {
    let Some((first, rest)) = segments.split_first() else {
        return Vec::new();
    };
    let Some(mut current) = map.get(*first) else {
        return Vec::new();
    };
    for segment in rest {
        match current.get(*segment) {
            Some(next) => current = next,
            None => return Vec::new(),
        }
    }
    scalar_strings(current)
}

/// Stringifies a JSON value for matching; arrays yield one entry per scalar
/// element, objects and null yield nothing.
fn scalar_strings(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_string).collect(),
        other => scalar_string(other).into_iter().collect(),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
