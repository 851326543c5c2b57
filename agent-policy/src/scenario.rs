//! Compiler from Given/When/Then scenarios to rules.
//!
//! ```text
//! Feature: Admin operations
//!   Scenario: Admins are routed to the admin service
//!     Given the user has "admin" label
//!     When calling "delete_user"
//!     Then route to "admin_service"
//! ```
//!
//! Each scenario compiles to exactly one rule. Step phrasing is matched
//! against a closed set of templates; anything else is a [`CompileError`].

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::CompileError;
use crate::rule::{Literal, Pattern, Rule, RuleHead, Term};

/// A quoted value, or a bare token without whitespace.
const VALUE: &str = r#"(?:"([^"]*)"|([\w./:-]+))"#;

#[derive(Debug, Clone, Copy)]
enum GivenTemplate {
    Label,
    Metadata,
    Field,
}

#[derive(Debug, Clone, Copy)]
enum ThenTemplate {
    Halt,
    Retry,
    Route,
    Allow,
}

static GIVEN_TEMPLATES: LazyLock<Vec<(Regex, GivenTemplate)>> = LazyLock::new(|| {
    [
        (format!("^the user has {VALUE} label$"), GivenTemplate::Label),
        (format!("^the user has label {VALUE}$"), GivenTemplate::Label),
        (format!("^the entity is labeled {VALUE}$"), GivenTemplate::Label),
        (format!("^the metadata {VALUE} is {VALUE}$"), GivenTemplate::Metadata),
        (format!("^the field {VALUE} is {VALUE}$"), GivenTemplate::Field),
    ]
    .into_iter()
    .map(|(pattern, template)| (template_regex(&pattern), template))
    .collect()
});

static WHEN_TEMPLATE: LazyLock<Regex> =
    LazyLock::new(|| template_regex(&format!("^calling (?:action )?{VALUE}$")));

static THEN_TEMPLATES: LazyLock<Vec<(Regex, ThenTemplate)>> = LazyLock::new(|| {
    [
        (format!("^halt with reason {VALUE}$"), ThenTemplate::Halt),
        (format!("^retry with feedback {VALUE}$"), ThenTemplate::Retry),
        (format!("^route to {VALUE}$"), ThenTemplate::Route),
        (String::from("^allow the request$"), ThenTemplate::Allow),
    ]
    .into_iter()
    .map(|(pattern, template)| (template_regex(&pattern), template))
    .collect()
});

fn template_regex(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){pattern}")).expect("scenario templates are valid expressions")
}

/// Returns the `n`th value slot (1-based) of a template match.
fn slot(captures: &Captures<'_>, n: usize) -> String {
    captures
        .get(2 * n - 1)
        .or_else(|| captures.get(2 * n))
        .map_or_else(String::new, |m| m.as_str().to_owned())
}

/// One step as written, with its resolved keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    keyword: StepKeyword,
    text: String,
    line: usize,
}

impl Step {
    /// Returns the keyword the step resolves to (`And` takes the previous one).
    #[must_use]
    pub fn keyword(&self) -> StepKeyword {
        self.keyword
    }

    /// Returns the step text without its keyword.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the 1-based line of the step.
    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }
}

/// Step keywords after resolving `And`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKeyword {
    /// Precondition.
    Given,
    /// Action under governance.
    When,
    /// Expected decision.
    Then,
}

impl StepKeyword {
    fn as_str(self) -> &'static str {
        match self {
            Self::Given => "Given",
            Self::When => "When",
            Self::Then => "Then",
        }
    }
}

/// Parsed scenario: ordered Given steps, one When, one Then.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    name: String,
    line: usize,
    givens: Vec<Step>,
    when: Step,
    then: Step,
}

impl Scenario {
    /// Returns the scenario title.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the line of the `Scenario:` header.
    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }

    /// Returns the Given steps in order.
    #[must_use]
    pub fn givens(&self) -> &[Step] {
        &self.givens
    }

    /// Returns the When step.
    #[must_use]
    pub fn when(&self) -> &Step {
        &self.when
    }

    /// Returns the Then step.
    #[must_use]
    pub fn then(&self) -> &Step {
        &self.then
    }

    /// Compiles the scenario to a rule.
    ///
    /// Given steps become body patterns in order, the When step becomes
    /// `action_operation(Name)`, and the Then step becomes the head.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] naming the first step whose phrasing matches
    /// no template.
    pub fn compile(&self, origin: &str) -> Result<Rule, CompileError> {
        let mut body = Vec::with_capacity(self.givens.len() + 1);
        for step in &self.givens {
            body.push(Literal::Positive(compile_given(origin, step)?));
        }

        let captures = WHEN_TEMPLATE
            .captures(&self.when.text)
            .ok_or_else(|| unrecognized(origin, &self.when))?;
        body.push(Literal::Positive(Pattern::new(
            "action_operation",
            vec![Term::Const(slot(&captures, 1))],
        )));

        let head = compile_then(origin, &self.then)?;
        Rule::new(self.name.clone(), head, body).map_err(|err| {
            CompileError::new(origin, err.message().to_owned()).at_line(self.line)
        })
    }
}

fn compile_given(origin: &str, step: &Step) -> Result<Pattern, CompileError> {
    for (regex, template) in GIVEN_TEMPLATES.iter() {
        if let Some(captures) = regex.captures(&step.text) {
            let pattern = match template {
                GivenTemplate::Label => {
                    Pattern::new("label", vec![Term::Const(slot(&captures, 1))])
                }
                GivenTemplate::Metadata => Pattern::new(
                    "metadata",
                    vec![
                        Term::Const(slot(&captures, 1)),
                        Term::Const(slot(&captures, 2)),
                    ],
                ),
                GivenTemplate::Field => Pattern::new(
                    "field",
                    vec![
                        Term::Const(slot(&captures, 1)),
                        Term::Const(slot(&captures, 2)),
                    ],
                ),
            };
            return Ok(pattern);
        }
    }
    Err(unrecognized(origin, step))
}

fn compile_then(origin: &str, step: &Step) -> Result<RuleHead, CompileError> {
    for (regex, template) in THEN_TEMPLATES.iter() {
        if let Some(captures) = regex.captures(&step.text) {
            let value = || Term::Const(slot(&captures, 1));
            return Ok(match template {
                ThenTemplate::Halt => RuleHead::Halt(value()),
                ThenTemplate::Retry => RuleHead::Retry(value()),
                ThenTemplate::Route => RuleHead::Route(value()),
                ThenTemplate::Allow => RuleHead::Allow,
            });
        }
    }
    Err(unrecognized(origin, step))
}

fn unrecognized(origin: &str, step: &Step) -> CompileError {
    CompileError::new(
        origin,
        format!("unrecognized {} step", step.keyword.as_str()),
    )
    .at_line(step.line)
    .with_step(format!("{} {}", step.keyword.as_str(), step.text))
}

#[derive(Debug)]
struct Draft {
    name: String,
    line: usize,
    givens: Vec<Step>,
    when: Option<Step>,
    then: Option<Step>,
    last: Option<StepKeyword>,
}

impl Draft {
    fn new(name: String, line: usize) -> Self {
        Self {
            name,
            line,
            givens: Vec::new(),
            when: None,
            then: None,
            last: None,
        }
    }

    fn push(&mut self, origin: &str, step: Step) -> Result<(), CompileError> {
        let misplaced = |message: &str| {
            CompileError::new(origin, format!("scenario `{}`: {message}", self.name))
                .at_line(step.line)
                .with_step(format!("{} {}", step.keyword.as_str(), step.text))
        };

        match step.keyword {
            StepKeyword::Given if self.when.is_some() || self.then.is_some() => {
                Err(misplaced("Given steps must precede When and Then"))
            }
            StepKeyword::Given => {
                self.last = Some(StepKeyword::Given);
                self.givens.push(step);
                Ok(())
            }
            StepKeyword::When if self.when.is_some() => {
                Err(misplaced("more than one When step"))
            }
            StepKeyword::When if self.then.is_some() => Err(misplaced("When must precede Then")),
            StepKeyword::When => {
                self.last = Some(StepKeyword::When);
                self.when = Some(step);
                Ok(())
            }
            StepKeyword::Then if self.then.is_some() => {
                Err(misplaced("more than one Then step"))
            }
            StepKeyword::Then => {
                self.last = Some(StepKeyword::Then);
                self.then = Some(step);
                Ok(())
            }
        }
    }

    fn finish(self, origin: &str) -> Result<Scenario, CompileError> {
        let missing = |keyword: &str| {
            CompileError::new(
                origin,
                format!("scenario `{}` has no {keyword} step", self.name),
            )
            .at_line(self.line)
        };
        let when = self.when.clone().ok_or_else(|| missing("When"))?;
        let then = self.then.clone().ok_or_else(|| missing("Then"))?;
        Ok(Scenario {
            name: self.name,
            line: self.line,
            givens: self.givens,
            when,
            then,
        })
    }
}

/// Splits `line` into its leading keyword (lowercased) and the remainder.
fn split_keyword(line: &str) -> (String, &str) {
    match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword.to_lowercase(), rest.trim()),
        None => (line.to_lowercase(), ""),
    }
}

/// Parses a scenario document into scenarios, preserving source order.
///
/// # Errors
///
/// Returns [`CompileError`] for steps outside a scenario, unknown keywords,
/// misplaced or duplicate When/Then steps, and scenarios missing either.
pub fn parse_scenarios(origin: &str, text: &str) -> Result<Vec<Scenario>, CompileError> {
    let mut scenarios = Vec::new();
    let mut current: Option<Draft> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((header, title)) = line.split_once(':') {
            match header.trim().to_lowercase().as_str() {
                "feature" => {
                    if let Some(draft) = current.take() {
                        scenarios.push(draft.finish(origin)?);
                    }
                    continue;
                }
                "scenario" => {
                    if let Some(draft) = current.take() {
                        scenarios.push(draft.finish(origin)?);
                    }
                    let title = title.trim();
                    let name = if title.is_empty() {
                        format!("{origin}:{line_no}")
                    } else {
                        title.to_owned()
                    };
                    current = Some(Draft::new(name, line_no));
                    continue;
                }
                _ => {}
            }
        }

        let (keyword, rest) = split_keyword(line);
        let Some(draft) = current.as_mut() else {
            return Err(CompileError::new(origin, "step outside of a scenario")
                .at_line(line_no)
                .with_step(line));
        };

        let resolved = match keyword.as_str() {
            "given" => StepKeyword::Given,
            "when" => StepKeyword::When,
            "then" => StepKeyword::Then,
            "and" => draft.last.ok_or_else(|| {
                CompileError::new(origin, "`And` must follow another step")
                    .at_line(line_no)
                    .with_step(line)
            })?,
            _ => {
                return Err(CompileError::new(origin, "unrecognized step keyword")
                    .at_line(line_no)
                    .with_step(line));
            }
        };

        draft.push(
            origin,
            Step {
                keyword: resolved,
                text: rest.to_owned(),
                line: line_no,
            },
        )?;
    }

    if let Some(draft) = current {
        scenarios.push(draft.finish(origin)?);
    }
    Ok(scenarios)
}

/// Parses and compiles a scenario document, one rule per scenario in
/// source order.
///
/// # Errors
///
/// Returns the first [`CompileError`] encountered; no partial rule list is
/// produced.
pub fn compile_scenarios(origin: &str, text: &str) -> Result<Vec<Rule>, CompileError> {
    parse_scenarios(origin, text)?
        .iter()
        .map(|scenario| scenario.compile(origin))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    const ADMIN: &str = r#"
Feature: Admin operations

  Scenario: Admins are routed to the admin service
    Given the user has "admin" label
    When calling "delete_user"
    Then route to "admin_service"
"#;

    #[test]
    fn scenario_matches_native_rule() {
        let compiled = compile_scenarios("admin.feature", ADMIN).unwrap();
        let native = parse_source(
            "admin.dl",
            r#"route("admin_service") :- label("admin"), action_operation("delete_user")."#,
        )
        .unwrap();

        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].name(), "Admins are routed to the admin service");
        assert_eq!(compiled[0].head(), native.rules[0].head());
        assert_eq!(compiled[0].body(), native.rules[0].body());
    }

    #[test]
    fn supports_every_template_and_and_steps() {
        let text = r#"
Scenario: PII never reaches the model
  Given the entity is labeled "pii"
  And the metadata "destination" is "public_client"
  And the user has label sensitive
  And the field "tier" is "gold"
  When calling action "llm_generate"
  Then halt with reason "Data Leakage Blocked"

Scenario: SQL must not drop tables
  When calling "generate_sql"
  Then retry with feedback "Do not use DROP"

Scenario: Public content flows
  Given the entity is labeled "public"
  When calling "publish"
  Then allow the request
"#;
        let rules = compile_scenarios("inline", text).unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].body().len(), 5);
        assert_eq!(
            rules[0].body()[1],
            Literal::Positive(Pattern::new(
                "metadata",
                vec![Term::constant("destination"), Term::constant("public_client")]
            ))
        );
        assert_eq!(rules[0].body()[2].to_string(), r#"label("sensitive")"#);
        assert_eq!(rules[1].head(), &RuleHead::Retry(Term::constant("Do not use DROP")));
        assert_eq!(rules[2].head(), &RuleHead::Allow);
    }

    #[test]
    fn unrecognized_phrasing_names_step_and_line() {
        let text = "Scenario: odd\n  Given the moon is full\n  When calling \"x\"\n  Then allow the request\n";
        let err = compile_scenarios("odd.feature", text).expect_err("unknown template");
        assert_eq!(err.line(), Some(2));
        assert_eq!(err.step(), Some("Given the moon is full"));
    }

    #[test]
    fn rejects_structural_errors() {
        let missing_then = "Scenario: a\n  When calling \"x\"\n";
        assert!(
            parse_scenarios("f", missing_then)
                .unwrap_err()
                .message()
                .contains("no Then")
        );

        let double_when = "Scenario: a\n  When calling \"x\"\n  And calling \"y\"\n  Then allow the request\n";
        assert!(
            parse_scenarios("f", double_when)
                .unwrap_err()
                .message()
                .contains("more than one When")
        );

        let orphan = "Given the user has \"admin\" label\n";
        assert!(parse_scenarios("f", orphan).is_err());

        let late_given = "Scenario: a\n  When calling \"x\"\n  Given the user has \"a\" label\n  Then allow the request\n";
        assert!(parse_scenarios("f", late_given).is_err());
    }

    #[test]
    fn compilation_is_deterministic() {
        let first = compile_scenarios("admin.feature", ADMIN).unwrap();
        let second = compile_scenarios("admin.feature", ADMIN).unwrap();
        assert_eq!(first, second);
    }
}
