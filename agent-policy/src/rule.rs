//! Rule representation shared by the native parser and the scenario compiler.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};

use regex::Regex;

use crate::decision::Decision;
use crate::error::CompileError;

/// Variable bindings produced while matching a rule body.
pub type Bindings = BTreeMap<String, String>;

/// Argument of a fact pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// Named variable, bound on first use and compared afterwards.
    Var(String),
    /// Literal value.
    Const(String),
    /// Anonymous `_`: matches anything and binds nothing.
    Wildcard,
}

impl Term {
    /// Creates a variable term.
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    /// Creates a literal term.
    #[must_use]
    pub fn constant(value: impl Into<String>) -> Self {
        Self::Const(value.into())
    }

    /// Resolves the term under the bindings; `None` for unbound variables
    /// and wildcards.
    #[must_use]
    pub fn resolve<'a>(&'a self, bindings: &'a Bindings) -> Option<&'a str> {
        match self {
            Self::Const(value) => Some(value),
            Self::Var(name) => bindings.get(name).map(String::as_str),
            Self::Wildcard => None,
        }
    }

    fn variable(&self) -> Option<&str> {
        match self {
            Self::Var(name) => Some(name),
            _ => None,
        }
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(name) => f.write_str(name),
            Self::Const(value) => write!(f, "{value:?}"),
            Self::Wildcard => f.write_str("_"),
        }
    }
}

/// Fact pattern: a predicate applied to terms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    predicate: String,
    args: Vec<Term>,
}

impl Pattern {
    /// Creates a pattern.
    #[must_use]
    pub fn new(predicate: impl Into<String>, args: Vec<Term>) -> Self {
        Self {
            predicate: predicate.into(),
            args,
        }
    }

    /// Returns the predicate name.
    #[must_use]
    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    /// Returns the argument terms.
    #[must_use]
    pub fn args(&self) -> &[Term] {
        &self.args
    }

    fn variables(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(Term::variable)
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.predicate)?;
        for (idx, arg) in self.args.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

/// Built-in comparison evaluated against already-bound values.
#[derive(Debug, Clone)]
pub enum Builtin {
    /// Subject matches the regular expression.
    Match {
        /// Value under test.
        subject: Term,
        /// Compiled expression.
        pattern: Regex,
    },
    /// Subject contains the needle as a substring.
    Contains {
        /// Value under test.
        subject: Term,
        /// Substring to look for.
        needle: Term,
    },
    /// Both terms resolve to the same value.
    Eq(Term, Term),
    /// The terms resolve to different values.
    Neq(Term, Term),
}

impl Builtin {
    /// Evaluates the builtin; unresolved terms never satisfy it.
    #[must_use]
    pub fn holds(&self, bindings: &Bindings) -> bool {
        match self {
            Self::Match { subject, pattern } => subject
                .resolve(bindings)
                .is_some_and(|value| pattern.is_match(value)),
            Self::Contains { subject, needle } => {
                match (subject.resolve(bindings), needle.resolve(bindings)) {
                    (Some(value), Some(needle)) => value.contains(needle),
                    _ => false,
                }
            }
            Self::Eq(left, right) => match (left.resolve(bindings), right.resolve(bindings)) {
                (Some(left), Some(right)) => left == right,
                _ => false,
            },
            Self::Neq(left, right) => match (left.resolve(bindings), right.resolve(bindings)) {
                (Some(left), Some(right)) => left != right,
                _ => false,
            },
        }
    }

    fn terms(&self) -> Vec<&Term> {
        match self {
            Self::Match { subject, .. } => vec![subject],
            Self::Contains { subject, needle } => vec![subject, needle],
            Self::Eq(left, right) | Self::Neq(left, right) => vec![left, right],
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Match { .. } => "match",
            Self::Contains { .. } => "contains",
            Self::Eq(..) => "eq",
            Self::Neq(..) => "neq",
        }
    }
}

impl PartialEq for Builtin {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Match { subject, pattern },
                Self::Match {
                    subject: other_subject,
                    pattern: other_pattern,
                },
            ) => subject == other_subject && pattern.as_str() == other_pattern.as_str(),
            (
                Self::Contains { subject, needle },
                Self::Contains {
                    subject: other_subject,
                    needle: other_needle,
                },
            ) => subject == other_subject && needle == other_needle,
            (Self::Eq(a, b), Self::Eq(c, d)) | (Self::Neq(a, b), Self::Neq(c, d)) => {
                a == c && b == d
            }
            _ => false,
        }
    }
}

impl Display for Builtin {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match { subject, pattern } => {
                write!(f, ":match({subject}, {:?})", pattern.as_str())
            }
            other => {
                let terms = other.terms();
                write!(f, ":{}({}, {})", other.name(), terms[0], terms[1])
            }
        }
    }
}

/// One conjunct of a rule body.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Satisfied by some fact unifying with the pattern.
    Positive(Pattern),
    /// Satisfied when no fact unifies with the pattern.
    Negated(Pattern),
    /// Satisfied when the builtin holds.
    Builtin(Builtin),
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positive(pattern) => write!(f, "{pattern}"),
            Self::Negated(pattern) => write!(f, "not {pattern}"),
            Self::Builtin(builtin) => write!(f, "{builtin}"),
        }
    }
}

/// Decision template produced when a rule body is satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleHead {
    /// Explicit allow; stops evaluation of lower-priority rules.
    Allow,
    /// Block with a reason.
    Halt(Term),
    /// Retry with feedback.
    Retry(Term),
    /// Redirect to a target action.
    Route(Term),
}

impl RuleHead {
    /// Instantiates the decision under a satisfying binding.
    ///
    /// Rules are validated so that head variables are always bound; an
    /// unbound variable renders as its name.
    #[must_use]
    pub fn instantiate(&self, bindings: &Bindings) -> Decision {
        let render = |term: &Term| match term {
            Term::Var(name) => bindings.get(name).cloned().unwrap_or_else(|| name.clone()),
            Term::Const(value) => value.clone(),
            Term::Wildcard => String::from("_"),
        };
        match self {
            Self::Allow => Decision::Allow,
            Self::Halt(term) => Decision::halt(render(term)),
            Self::Retry(term) => Decision::retry(render(term)),
            Self::Route(term) => Decision::route(render(term)),
        }
    }

    fn term(&self) -> Option<&Term> {
        match self {
            Self::Allow => None,
            Self::Halt(term) | Self::Retry(term) | Self::Route(term) => Some(term),
        }
    }
}

impl Display for RuleHead {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => f.write_str("allow"),
            Self::Halt(term) => write!(f, "halt({term})"),
            Self::Retry(term) => write!(f, "retry({term})"),
            Self::Route(term) => write!(f, "route({term})"),
        }
    }
}

/// Conjunctive rule: every body literal must hold under one binding for the
/// head to fire.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    name: String,
    head: RuleHead,
    body: Vec<Literal>,
}

impl Rule {
    /// Creates a rule after checking variable safety.
    ///
    /// Every variable used in the head, in a negated literal, or in a
    /// builtin must be bound by a positive pattern that appears earlier in
    /// the body.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] naming the rule when a variable is unsafe or
    /// the head uses a wildcard.
    pub fn new(
        name: impl Into<String>,
        head: RuleHead,
        body: Vec<Literal>,
    ) -> Result<Self, CompileError> {
        let name = name.into();
        let mut bound = BTreeSet::new();

        for literal in &body {
            match literal {
                Literal::Positive(pattern) => {
                    bound.extend(pattern.variables().map(str::to_owned));
                }
                Literal::Negated(pattern) => {
                    if let Some(var) = pattern.variables().find(|var| !bound.contains(*var)) {
                        return Err(CompileError::new(
                            &name,
                            format!("variable `{var}` in negated literal is not bound earlier"),
                        )
                        .with_step(literal.to_string()));
                    }
                }
                Literal::Builtin(builtin) => {
                    if let Some(var) = builtin
                        .terms()
                        .into_iter()
                        .filter_map(Term::variable)
                        .find(|var| !bound.contains(*var))
                    {
                        return Err(CompileError::new(
                            &name,
                            format!("variable `{var}` in builtin is not bound earlier"),
                        )
                        .with_step(literal.to_string()));
                    }
                }
            }
        }

        match head.term() {
            Some(Term::Wildcard) => {
                return Err(CompileError::new(&name, "rule head cannot use `_`")
                    .with_step(head.to_string()));
            }
            Some(Term::Var(var)) if !bound.contains(var) => {
                return Err(CompileError::new(
                    &name,
                    format!("head variable `{var}` is not bound by the rule body"),
                )
                .with_step(head.to_string()));
            }
            _ => {}
        }

        Ok(Self { name, head, body })
    }

    /// Returns the rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the decision template.
    #[must_use]
    pub fn head(&self) -> &RuleHead {
        &self.head
    }

    /// Returns the ordered body literals.
    #[must_use]
    pub fn body(&self) -> &[Literal] {
        &self.body
    }
}

impl Display for Rule {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)?;
        if !self.body.is_empty() {
            f.write_str(" :- ")?;
            for (idx, literal) in self.body.iter().enumerate() {
                if idx > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{literal}")?;
            }
        }
        f.write_str(".")
    }
}
