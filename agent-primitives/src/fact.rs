//! Governance facts consumed by rule evaluation.

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Atomic, named tuple of string values.
///
/// Equality is structural: two facts are the same when their predicate and
/// every argument match in order.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Fact {
    predicate: String,
    #[serde(default)]
    args: Vec<String>,
}

impl Fact {
    /// Creates a fact after validating its predicate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFact`] when the predicate is empty or contains
    /// whitespace.
    pub fn new<I, S>(predicate: impl Into<String>, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let predicate = predicate.into();
        if predicate.trim().is_empty() {
            return Err(Error::InvalidFact {
                predicate,
                reason: "predicate cannot be empty".into(),
            });
        }
        if predicate.chars().any(char::is_whitespace) {
            return Err(Error::InvalidFact {
                predicate,
                reason: "predicate cannot contain whitespace".into(),
            });
        }

        Ok(Self {
            predicate,
            args: args.into_iter().map(Into::into).collect(),
        })
    }

    /// Builds a fact for an internally known predicate.
    ///
    /// Callers must pass a non-empty predicate without whitespace; this is
    /// intended for the fixed predicates produced by fact extraction.
    #[must_use]
    pub fn known<I, S>(predicate: &'static str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        debug_assert!(!predicate.is_empty() && !predicate.contains(char::is_whitespace));
        Self {
            predicate: predicate.to_owned(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the predicate name.
    #[must_use]
    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    /// Returns the ordered arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the number of arguments.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

impl Display for Fact {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.predicate)?;
        for (idx, arg) in self.args.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg:?}")?;
        }
        f.write_str(")")
    }
}

/// Ordered, de-duplicated collection of facts.
///
/// Insertion order is preserved so that evaluation and logging stay
/// deterministic across runs.
#[derive(Clone, Debug, Default)]
pub struct FactSet {
    ordered: Vec<Fact>,
    seen: HashSet<Fact>,
}

impl FactSet {
    /// Creates an empty fact set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fact, returning `true` when it was not already present.
    pub fn insert(&mut self, fact: Fact) -> bool {
        if self.seen.contains(&fact) {
            return false;
        }
        self.seen.insert(fact.clone());
        self.ordered.push(fact);
        true
    }

    /// Returns `true` if the fact is present.
    #[must_use]
    pub fn contains(&self, fact: &Fact) -> bool {
        self.seen.contains(fact)
    }

    /// Returns the number of distinct facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Returns `true` when no facts are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Iterates facts in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Fact> {
        self.ordered.iter()
    }

    /// Returns the facts as a slice in insertion order.
    #[must_use]
    pub fn as_slice(&self) -> &[Fact] {
        &self.ordered
    }

    /// Returns a new set holding the facts of `self` followed by `other`.
    #[must_use]
    pub fn merged(&self, other: &FactSet) -> FactSet {
        let mut merged = self.clone();
        merged.extend(other.iter().cloned());
        merged
    }

    /// Removes every fact.
    pub fn clear(&mut self) {
        self.ordered.clear();
        self.seen.clear();
    }
}

impl Extend<Fact> for FactSet {
    fn extend<T: IntoIterator<Item = Fact>>(&mut self, iter: T) {
        for fact in iter {
            self.insert(fact);
        }
    }
}

impl FromIterator<Fact> for FactSet {
    fn from_iter<T: IntoIterator<Item = Fact>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<'a> IntoIterator for &'a FactSet {
    type Item = &'a Fact;
    type IntoIter = std::slice::Iter<'a, Fact>;

    fn into_iter(self) -> Self::IntoIter {
        self.ordered.iter()
    }
}

impl PartialEq for FactSet {
    fn eq(&self, other: &Self) -> bool {
        self.ordered == other.ordered
    }
}

impl Eq for FactSet {}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(value: &str) -> Fact {
        Fact::new("label", [value]).unwrap()
    }

    #[test]
    fn asserting_same_fact_twice_is_idempotent() {
        let mut once = FactSet::new();
        once.insert(label("pii"));

        let mut twice = FactSet::new();
        assert!(twice.insert(label("pii")));
        assert!(!twice.insert(label("pii")));

        assert_eq!(once, twice);
        assert_eq!(twice.len(), 1);
    }

    #[test]
    fn preserves_insertion_order() {
        let set: FactSet = [label("b"), label("a"), label("b"), label("c")]
            .into_iter()
            .collect();
        let values: Vec<_> = set.iter().map(|fact| fact.args()[0].as_str()).collect();
        assert_eq!(values, ["b", "a", "c"]);
    }

    #[test]
    fn rejects_invalid_predicates() {
        let err = Fact::new(" ", ["x"]).expect_err("empty predicate");
        assert!(matches!(err, Error::InvalidFact { .. }));

        let err = Fact::new("has label", ["x"]).expect_err("whitespace");
        assert!(matches!(err, Error::InvalidFact { .. }));
    }

    #[test]
    fn display_uses_rule_syntax() {
        let fact = Fact::new("metadata", ["user", "alice"]).unwrap();
        assert_eq!(fact.to_string(), r#"metadata("user", "alice")"#);
    }

    #[test]
    fn merged_keeps_left_facts_first() {
        let left: FactSet = [label("a")].into_iter().collect();
        let right: FactSet = [label("b"), label("a")].into_iter().collect();
        let merged = left.merged(&right);
        assert_eq!(merged.as_slice(), [label("a"), label("b")]);
    }
}
