//! Backtracking matcher for conjunctive rule bodies.

use std::collections::HashMap;

use agent_primitives::Fact;

use crate::rule::{Bindings, Literal, Pattern, Rule, Term};

/// Facts grouped by predicate, preserving insertion order within a group.
pub(crate) struct FactIndex<'a> {
    by_predicate: HashMap<&'a str, Vec<&'a Fact>>,
}

impl<'a> FactIndex<'a> {
    pub(crate) fn new<I>(facts: I) -> Self
    where
        I: IntoIterator<Item = &'a Fact>,
    {
        let mut by_predicate: HashMap<&'a str, Vec<&'a Fact>> = HashMap::new();
        for fact in facts {
            by_predicate.entry(fact.predicate()).or_default().push(fact);
        }
        Self { by_predicate }
    }

    fn candidates(&self, predicate: &str) -> &[&'a Fact] {
        match self.by_predicate.get(predicate) {
            Some(facts) => facts,
            None => &[],
        }
    }
}

/// Returns the first binding satisfying every body literal of the rule.
///
/// Solutions are explored in body order and, per pattern, in fact insertion
/// order, so the result is deterministic for a given fact set.
pub(crate) fn first_solution(rule: &Rule, index: &FactIndex<'_>) -> Option<Bindings> {
    solve(rule.body(), index, Bindings::new())
}

fn solve(body: &[Literal], index: &FactIndex<'_>, bindings: Bindings) -> Option<Bindings> {
    let Some((literal, rest)) = body.split_first() else {
        return Some(bindings);
    };

    match literal {
        Literal::Positive(pattern) => index
            .candidates(pattern.predicate())
            .iter()
            .filter_map(|fact| unify(pattern, fact, &bindings))
            .find_map(|next| solve(rest, index, next)),
        Literal::Negated(pattern) => {
            let blocked = index
                .candidates(pattern.predicate())
                .iter()
                .any(|fact| unify(pattern, fact, &bindings).is_some());
            if blocked {
                None
            } else {
                solve(rest, index, bindings)
            }
        }
        Literal::Builtin(builtin) => {
            if builtin.holds(&bindings) {
                solve(rest, index, bindings)
            } else {
                None
            }
        }
    }
}

fn unify(pattern: &Pattern, fact: &Fact, bindings: &Bindings) -> Option<Bindings> {
    if pattern.args().len() != fact.arity() {
        return None;
    }

    let mut merged = bindings.clone();
    for (term, value) in pattern.args().iter().zip(fact.args()) {
        match term {
            Term::Wildcard => {}
            Term::Const(expected) => {
                if expected != value {
                    return None;
                }
            }
            Term::Var(name) => {
                if let Some(bound) = merged.get(name) {
                    if bound != value {
                        return None;
                    }
                } else {
                    merged.insert(name.clone(), value.clone());
                }
            }
        }
    }

    Some(merged)
}
