//! Parser for the native clause syntax.
//!
//! ```text
//! % block PII from reaching the model
//! halt("PII must not reach the model") :- label("pii"), action_operation("llm_generate").
//! retry("Do not use DROP") :- field("sql", Sql), :match(Sql, "(?i)\\bdrop\\b").
//! route(Target) :- metadata("destination", Target), not label("restricted").
//! tier("gold").
//! ```
//!
//! Clauses with a decision head (`allow`, `halt`, `retry`, `route`) become
//! rules; ground clauses with any other predicate and no body are static
//! facts. The grammar lives in `clauses.pest`.

use agent_primitives::Fact;
use pest::Parser as _;
use pest::error::{Error as PestError, LineColLocation};
use pest::iterators::{Pair, Pairs};
use regex::Regex;

use crate::error::CompileError;
use crate::rule::{Builtin, Literal, Pattern, Rule, RuleHead, Term};

mod grammar {
    #[derive(pest_derive::Parser)]
    #[grammar = "clauses.pest"]
    pub(super) struct ClauseParser;
}

use grammar::{ClauseParser, Rule as Syntax};

/// Rules and static facts parsed from one source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSource {
    /// Rules in declaration order.
    pub rules: Vec<Rule>,
    /// Ground facts in declaration order.
    pub facts: Vec<Fact>,
}

/// Parses native rule source text.
///
/// # Errors
///
/// Returns [`CompileError`] for syntax errors, unsafe variables, invalid
/// builtin expressions, non-ground facts, and rules deriving non-decision
/// predicates.
pub fn parse_source(origin: &str, text: &str) -> Result<ParsedSource, CompileError> {
    let pairs =
        ClauseParser::parse(Syntax::source, text).map_err(|err| syntax_error(origin, err))?;

    let mut builder = Builder {
        origin,
        parsed: ParsedSource::default(),
    };
    for pair in pairs.flat_map(Pair::into_inner) {
        if pair.as_rule() == Syntax::clause {
            builder.clause(pair)?;
        }
    }
    Ok(builder.parsed)
}

/// Parses a list of ground facts written in the native syntax.
///
/// # Errors
///
/// Returns [`CompileError`] when the text fails to parse or contains rules.
pub fn parse_facts(origin: &str, text: &str) -> Result<Vec<Fact>, CompileError> {
    let parsed = parse_source(origin, text)?;
    if let Some(rule) = parsed.rules.first() {
        return Err(CompileError::new(origin, "expected facts only, found a rule")
            .with_step(rule.to_string()));
    }
    Ok(parsed.facts)
}

fn syntax_error(origin: &str, err: PestError<Syntax>) -> CompileError {
    let line = match err.line_col {
        LineColLocation::Pos((line, _)) | LineColLocation::Span((line, _), _) => line,
    };
    let err = err.renamed_rules(describe);
    let located = CompileError::new(origin, err.variant.message()).at_line(line);
    match err.line().trim() {
        "" => located,
        step => located.with_step(step),
    }
}

fn describe(rule: &Syntax) -> String {
    match rule {
        Syntax::clause | Syntax::head => "a clause".into(),
        Syntax::body | Syntax::literal | Syntax::negated | Syntax::pattern => "a body literal".into(),
        Syntax::builtin => "a builtin".into(),
        Syntax::arguments => "an argument list".into(),
        Syntax::term
        | Syntax::wildcard
        | Syntax::variable
        | Syntax::number
        | Syntax::atom
        | Syntax::string => "a term".into(),
        Syntax::ident => "a predicate name".into(),
        Syntax::EOI => "end of input".into(),
        other => format!("{other:?}"),
    }
}

enum Head {
    Decision(RuleHead),
    Predicate(Pattern),
}

/// Turns parsed clause pairs into rules and facts.
struct Builder<'a> {
    origin: &'a str,
    parsed: ParsedSource,
}

impl Builder<'_> {
    fn error(&self, line: usize, message: impl Into<String>) -> CompileError {
        CompileError::new(self.origin, message).at_line(line)
    }

    fn required<'i>(
        &self,
        pairs: &mut Pairs<'i, Syntax>,
        line: usize,
        what: &str,
    ) -> Result<Pair<'i, Syntax>, CompileError> {
        pairs
            .next()
            .ok_or_else(|| self.error(line, format!("missing {what}")))
    }

    fn clause(&mut self, pair: Pair<'_, Syntax>) -> Result<(), CompileError> {
        let line = pair.line_col().0;
        let text = pair.as_str().trim();
        let mut inner = pair.into_inner();
        let head = self.head(self.required(&mut inner, line, "clause head")?)?;
        let body = match inner.next() {
            Some(body) => self.body(body)?,
            None => Vec::new(),
        };

        match head {
            Head::Decision(head) => {
                let name = format!("{}#{}", self.origin, self.parsed.rules.len() + 1);
                let rule = Rule::new(name, head, body).map_err(|err| {
                    let located = self.error(line, err.message());
                    match err.step() {
                        Some(step) => located.with_step(step),
                        None => located,
                    }
                })?;
                self.parsed.rules.push(rule);
            }
            Head::Predicate(pattern) => {
                if !body.is_empty() {
                    return Err(self
                        .error(
                            line,
                            format!(
                                "rules may only conclude allow, halt, retry, or route; `{}` cannot be derived",
                                pattern.predicate()
                            ),
                        )
                        .with_step(text));
                }
                self.parsed.facts.push(ground_fact(self.origin, line, &pattern)?);
            }
        }
        Ok(())
    }

    fn head(&self, pair: Pair<'_, Syntax>) -> Result<Head, CompileError> {
        let line = pair.line_col().0;
        let mut inner = pair.into_inner();
        let name = self.required(&mut inner, line, "predicate name")?.as_str().to_owned();
        let Some(args) = inner.next() else {
            return if name == "allow" {
                Ok(Head::Decision(RuleHead::Allow))
            } else {
                Err(self.error(line, format!("`{name}` needs an argument list")))
            };
        };

        let args = self.arguments(args)?;
        let decision: fn(Term) -> RuleHead = match name.as_str() {
            "halt" => RuleHead::Halt,
            "retry" => RuleHead::Retry,
            "route" => RuleHead::Route,
            "allow" if args.is_empty() => return Ok(Head::Decision(RuleHead::Allow)),
            _ => return Ok(Head::Predicate(Pattern::new(name, args))),
        };

        let mut args = args.into_iter();
        match (args.next(), args.next()) {
            (Some(term), None) => Ok(Head::Decision(decision(term))),
            _ => Err(self.error(line, format!("`{name}` takes exactly one argument"))),
        }
    }

    fn body(&self, pair: Pair<'_, Syntax>) -> Result<Vec<Literal>, CompileError> {
        pair.into_inner().map(|literal| self.literal(literal)).collect()
    }

    fn literal(&self, pair: Pair<'_, Syntax>) -> Result<Literal, CompileError> {
        let line = pair.line_col().0;
        let literal = self.required(&mut pair.into_inner(), line, "body literal")?;
        match literal.as_rule() {
            Syntax::builtin => self.builtin(literal).map(Literal::Builtin),
            Syntax::pattern => self.pattern(literal).map(Literal::Positive),
            Syntax::negated => {
                let pattern = literal
                    .into_inner()
                    .find(|inner| inner.as_rule() == Syntax::pattern)
                    .ok_or_else(|| self.error(line, "missing negated pattern"))?;
                self.pattern(pattern).map(Literal::Negated)
            }
            other => Err(self.error(line, format!("unexpected {}", describe(&other)))),
        }
    }

    fn pattern(&self, pair: Pair<'_, Syntax>) -> Result<Pattern, CompileError> {
        let line = pair.line_col().0;
        let mut inner = pair.into_inner();
        let name = self.required(&mut inner, line, "predicate name")?.as_str();
        let args = self.arguments(self.required(&mut inner, line, "argument list")?)?;
        Ok(Pattern::new(name, args))
    }

    fn builtin(&self, pair: Pair<'_, Syntax>) -> Result<Builtin, CompileError> {
        let line = pair.line_col().0;
        let mut inner = pair.into_inner();
        let name = self.required(&mut inner, line, "builtin name")?.as_str();
        let args = self.arguments(self.required(&mut inner, line, "argument list")?)?;
        let [first, second]: [Term; 2] = args.try_into().map_err(|_| {
            self.error(line, format!("builtin `:{name}` takes exactly two arguments"))
        })?;

        match name {
            "match" => {
                let Term::Const(expr) = second else {
                    return Err(
                        self.error(line, "`:match` expects a string pattern as second argument")
                    );
                };
                let pattern = Regex::new(&expr).map_err(|err| {
                    self.error(line, format!("invalid regular expression: {err}"))
                })?;
                Ok(Builtin::Match {
                    subject: first,
                    pattern,
                })
            }
            "contains" => Ok(Builtin::Contains {
                subject: first,
                needle: second,
            }),
            "eq" => Ok(Builtin::Eq(first, second)),
            "neq" => Ok(Builtin::Neq(first, second)),
            other => Err(self.error(line, format!("unknown builtin `:{other}`"))),
        }
    }

    fn arguments(&self, pair: Pair<'_, Syntax>) -> Result<Vec<Term>, CompileError> {
        pair.into_inner().map(|term| self.term(term)).collect()
    }

    fn term(&self, pair: Pair<'_, Syntax>) -> Result<Term, CompileError> {
        let line = pair.line_col().0;
        let term = self.required(&mut pair.into_inner(), line, "term")?;
        match term.as_rule() {
            Syntax::wildcard => Ok(Term::Wildcard),
            Syntax::variable => Ok(Term::var(term.as_str())),
            Syntax::number | Syntax::ident => Ok(Term::constant(term.as_str())),
            Syntax::atom => Ok(Term::constant(&term.as_str()[1..])),
            Syntax::string => {
                let chars = term.into_inner().next().map_or("", |chars| chars.as_str());
                Ok(Term::Const(unescape(chars)))
            }
            other => Err(self.error(line, format!("expected a term, found {}", describe(&other)))),
        }
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(escaped @ ('"' | '\\')) => out.push(escaped),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn ground_fact(origin: &str, line: usize, pattern: &Pattern) -> Result<Fact, CompileError> {
    let mut args = Vec::with_capacity(pattern.args().len());
    for term in pattern.args() {
        match term {
            Term::Const(value) => args.push(value.clone()),
            _ => {
                return Err(CompileError::new(origin, "facts must be ground")
                    .at_line(line)
                    .with_step(pattern.to_string()));
            }
        }
    }
    Fact::new(pattern.predicate(), args)
        .map_err(|err| CompileError::new(origin, err.to_string()).at_line(line))
}
