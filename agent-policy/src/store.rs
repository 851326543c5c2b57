//! Session-scoped fact storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use agent_primitives::{Fact, FactSet};

/// Context holding static facts loaded at startup.
pub const GLOBAL_CONTEXT: &str = "global";

/// Named fact contexts with copy-on-write snapshots.
///
/// Readers receive an [`Arc`] snapshot and never observe a bulk assertion
/// half-applied.
#[derive(Debug, Default)]
pub struct FactStore {
    contexts: RwLock<HashMap<String, Arc<FactSet>>>,
}

impl FactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asserts a fact, returning `true` if it was new to the context.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned.
    pub fn assert(&self, context: &str, fact: Fact) -> bool {
        self.assert_all(context, [fact]) == 1
    }

    /// Asserts every fact atomically, returning how many were new.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned.
    pub fn assert_all<I>(&self, context: &str, facts: I) -> usize
    where
        I: IntoIterator<Item = Fact>,
    {
        let mut guard = self.contexts.write().expect("fact store poisoned");
        let set = Arc::make_mut(guard.entry(context.to_owned()).or_default());
        facts
            .into_iter()
            .map(|fact| set.insert(fact))
            .filter(|inserted| *inserted)
            .count()
    }

    /// Returns a snapshot of the context; empty when it does not exist.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned.
    #[must_use]
    pub fn facts(&self, context: &str) -> Arc<FactSet> {
        let guard = self.contexts.read().expect("fact store poisoned");
        guard.get(context).cloned().unwrap_or_default()
    }

    /// Removes every fact from the context.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned.
    pub fn clear(&self, context: &str) {
        let mut guard = self.contexts.write().expect("fact store poisoned");
        guard.remove(context);
    }

    /// Lists the contexts that currently hold facts.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned.
    #[must_use]
    pub fn contexts(&self) -> Vec<String> {
        let guard = self.contexts.read().expect("fact store poisoned");
        let mut names: Vec<_> = guard.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(value: &str) -> Fact {
        Fact::new("label", [value]).unwrap()
    }

    #[test]
    fn assertion_is_idempotent() {
        let store = FactStore::new();
        assert!(store.assert(GLOBAL_CONTEXT, fact("a")));
        assert!(!store.assert(GLOBAL_CONTEXT, fact("a")));
        assert_eq!(store.facts(GLOBAL_CONTEXT).len(), 1);
    }

    #[test]
    fn snapshots_are_isolated_from_later_writes() {
        let store = FactStore::new();
        store.assert("session", fact("a"));
        let snapshot = store.facts("session");

        assert_eq!(store.assert_all("session", [fact("b"), fact("c"), fact("a")]), 2);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.facts("session").len(), 3);
    }

    #[test]
    fn clear_only_affects_one_context() {
        let store = FactStore::new();
        store.assert("one", fact("a"));
        store.assert("two", fact("b"));
        store.clear("one");

        assert!(store.facts("one").is_empty());
        assert_eq!(store.contexts(), ["two"]);
    }
}
