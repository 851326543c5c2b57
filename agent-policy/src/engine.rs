//! Rule engine: ordered rule sources, static facts, and first-match assessment.

use std::iter;
use std::path::Path;
use std::sync::{Arc, RwLock};

use agent_primitives::{Fact, FactSet};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::decision::Decision;
use crate::error::{PolicyError, PolicyResult};
use crate::matcher::{FactIndex, first_solution};
use crate::parser::{parse_facts, parse_source};
use crate::rule::Rule;
use crate::scenario::compile_scenarios;
use crate::store::{FactStore, GLOBAL_CONTEXT};

/// Trait implemented by policy engines consulted by the supervisor.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    /// Assesses the request facts for the named action.
    async fn evaluate(&self, facts: &FactSet, action: &str) -> PolicyResult<Assessment>;
}

/// Outcome of one assessment together with the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    decision: Decision,
    rule: Option<String>,
}

impl Assessment {
    /// Assessment produced when no rule matched.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            decision: Decision::Allow,
            rule: None,
        }
    }

    /// Creates an assessment attributed to a named rule.
    #[must_use]
    pub fn matched(decision: Decision, rule: impl Into<String>) -> Self {
        Self {
            decision,
            rule: Some(rule.into()),
        }
    }

    /// Returns the decision.
    #[must_use]
    pub fn decision(&self) -> &Decision {
        &self.decision
    }

    /// Returns the name of the matching rule, `None` for the default allow.
    #[must_use]
    pub fn rule(&self) -> Option<&str> {
        self.rule.as_deref()
    }

    /// Consumes the assessment, returning the decision.
    #[must_use]
    pub fn into_decision(self) -> Decision {
        self.decision
    }
}

#[derive(Debug, Clone)]
struct RuleSource {
    name: String,
    rules: Vec<Rule>,
    facts: Vec<Fact>,
}

/// Rules and the static facts declared alongside them, grouped by source in
/// load order.
///
/// Priority is source load order, then declaration order within a source.
/// Reloading a source keeps its original position and replaces both its
/// rules and its facts.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    sources: Vec<RuleSource>,
}

impl RuleSet {
    /// Creates an empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces `source` in place, or appends it, with no static facts.
    pub fn load(&mut self, source: impl Into<String>, rules: Vec<Rule>) {
        self.load_with_facts(source, rules, Vec::new());
    }

    /// Replaces the rules and facts of `source` in place, or appends a new
    /// source.
    pub fn load_with_facts(
        &mut self,
        source: impl Into<String>,
        rules: Vec<Rule>,
        facts: Vec<Fact>,
    ) {
        let source = source.into();
        match self.sources.iter_mut().find(|entry| entry.name == source) {
            Some(entry) => {
                entry.rules = rules;
                entry.facts = facts;
            }
            None => self.sources.push(RuleSource {
                name: source,
                rules,
                facts,
            }),
        }
    }

    /// Removes a source, returning whether it was loaded.
    pub fn unload(&mut self, source: &str) -> bool {
        let before = self.sources.len();
        self.sources.retain(|entry| entry.name != source);
        before != self.sources.len()
    }

    /// Iterates `(source, rule)` pairs in priority order.
    pub fn rules(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.sources
            .iter()
            .flat_map(|entry| entry.rules.iter().map(|rule| (entry.name.as_str(), rule)))
    }

    /// Iterates the static facts of every source in load order.
    pub fn facts(&self) -> impl Iterator<Item = &Fact> {
        self.sources.iter().flat_map(|entry| entry.facts.iter())
    }

    /// Returns the loaded source names in priority order.
    #[must_use]
    pub fn sources(&self) -> Vec<&str> {
        self.sources.iter().map(|entry| entry.name.as_str()).collect()
    }

    /// Returns the total number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.iter().map(|entry| entry.rules.len()).sum()
    }

    /// Returns `true` when no rules are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evaluates rules against the indexed facts, returning the first match.
    fn assess(&self, index: &FactIndex<'_>, action: &str) -> Assessment {
        for (source, rule) in self.rules() {
            if let Some(bindings) = first_solution(rule, index) {
                let decision = rule.head().instantiate(&bindings);
                debug!(
                    rule = rule.name(),
                    source,
                    action,
                    decision = %decision.kind(),
                    "policy rule matched"
                );
                return Assessment::matched(decision, rule.name());
            }
        }
        Assessment::allow()
    }
}

/// In-memory rule engine with copy-on-write reloads.
///
/// Assessments run against an [`Arc`] snapshot of the rule set, so a reload
/// is never observed half-applied and readers never block on evaluation.
#[derive(Debug, Default)]
pub struct RuleEngine {
    rules: RwLock<Arc<RuleSet>>,
    facts: FactStore,
}

impl RuleEngine {
    /// Creates an engine with no rules and no static facts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current rule-set snapshot.
    ///
    /// # Panics
    ///
    /// Panics if the internal rule lock has been poisoned.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RuleSet> {
        Arc::clone(&self.rules.read().expect("policy rules poisoned"))
    }

    /// Returns the store holding facts loaded independently of any rule
    /// source.
    #[must_use]
    pub fn fact_store(&self) -> &FactStore {
        &self.facts
    }

    /// Replaces or appends the rules of `source` atomically.
    ///
    /// # Panics
    ///
    /// Panics if the internal rule lock has been poisoned.
    pub fn load_rules(&self, source: &str, rules: Vec<Rule>) {
        let count = rules.len();
        self.update(|set| set.load(source, rules));
        info!(source, rules = count, "policy rules loaded");
    }

    /// Removes a source and its static facts, returning whether it was
    /// loaded.
    ///
    /// # Panics
    ///
    /// Panics if the internal rule lock has been poisoned.
    pub fn unload(&self, source: &str) -> bool {
        let mut removed = false;
        self.update(|set| removed = set.unload(source));
        if removed {
            info!(source, "policy rules unloaded");
        }
        removed
    }

    /// Parses native rule text and loads it under `name`.
    ///
    /// Ground clauses become static facts owned by the source: they are
    /// swapped in together with its rules and dropped when it is reloaded or
    /// unloaded. Returns the number of rules loaded.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Compile`] when the text does not parse; nothing
    /// is loaded in that case.
    pub fn load_source_str(&self, name: &str, text: &str) -> PolicyResult<usize> {
        let parsed = parse_source(name, text)?;
        let count = parsed.rules.len();
        let facts = parsed.facts.len();
        self.update(|set| set.load_with_facts(name, parsed.rules, parsed.facts));
        info!(source = name, rules = count, facts, "policy rules loaded");
        Ok(count)
    }

    /// Compiles a scenario document and loads it under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Compile`] when any scenario fails to compile;
    /// nothing is loaded in that case.
    pub fn load_scenarios_str(&self, name: &str, text: &str) -> PolicyResult<usize> {
        let rules = compile_scenarios(name, text)?;
        let count = rules.len();
        self.load_rules(name, rules);
        Ok(count)
    }

    /// Reads a rule file and loads it under its path.
    ///
    /// Files with a `.feature` extension are compiled as scenarios; anything
    /// else is parsed as native rules.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Io`] when the file cannot be read and
    /// [`PolicyError::Compile`] when it does not compile.
    pub async fn load_path(&self, path: impl AsRef<Path>) -> PolicyResult<usize> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| PolicyError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let name = path.display().to_string();
        let is_feature = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("feature"));
        if is_feature {
            self.load_scenarios_str(&name, &text)
        } else {
            self.load_source_str(&name, &text)
        }
    }

    /// Parses ground facts and asserts them into the global context.
    ///
    /// Unlike ground clauses in a rule source, these facts outlive any
    /// reload.
    ///
    /// Returns the number of facts that were new.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Compile`] when the text contains anything other
    /// than ground facts.
    pub fn load_facts(&self, origin: &str, text: &str) -> PolicyResult<usize> {
        let facts = parse_facts(origin, text)?;
        let added = self.facts.assert_all(GLOBAL_CONTEXT, facts);
        info!(origin, added, "static facts loaded");
        Ok(added)
    }

    /// Asserts one static fact, returning `true` if it was new.
    pub fn assert_fact(&self, fact: Fact) -> bool {
        self.facts.assert(GLOBAL_CONTEXT, fact)
    }

    /// Assesses request facts plus static facts and the action identity.
    ///
    /// Returns the decision of the first rule, in priority order, whose body
    /// is satisfiable; [`Decision::Allow`] when none is.
    #[must_use]
    pub fn assess(&self, facts: &FactSet, action: &str) -> Assessment {
        let rules = self.snapshot();
        let statics = self.facts.facts(GLOBAL_CONTEXT);
        let identity = Fact::known("action_operation", [action]);
        let index = FactIndex::new(
            rules
                .facts()
                .chain(statics.iter())
                .chain(facts)
                .chain(iter::once(&identity)),
        );
        rules.assess(&index, action)
    }

    fn update(&self, apply: impl FnOnce(&mut RuleSet)) {
        let mut guard = self.rules.write().expect("policy rules poisoned");
        apply(Arc::make_mut(&mut guard));
    }
}

#[async_trait]
impl PolicyEngine for RuleEngine {
    async fn evaluate(&self, facts: &FactSet, action: &str) -> PolicyResult<Assessment> {
        Ok(self.assess(facts, action))
    }
}
