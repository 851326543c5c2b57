//! Governance policy evaluation for supervised actions.
//!
//! Rules are loaded either from the native clause syntax or compiled from
//! Given/When/Then scenarios, then assessed against facts extracted from an
//! [`Envelope`](agent_primitives::Envelope).

#![warn(missing_docs, clippy::pedantic)]

pub mod decision;
pub mod engine;
pub mod error;
pub mod extract;
mod matcher;
pub mod parser;
pub mod rule;
pub mod scenario;
pub mod store;

pub use decision::{Decision, DecisionKind};
pub use engine::{Assessment, PolicyEngine, RuleEngine, RuleSet};
pub use error::{CompileError, PolicyError, PolicyResult};
pub use extract::{FactExtractor, FieldMapping, Phase};
pub use parser::{ParsedSource, parse_facts, parse_source};
pub use rule::{Builtin, Literal, Pattern, Rule, RuleHead, Term};
pub use scenario::{Scenario, compile_scenarios, parse_scenarios};
pub use store::{FactStore, GLOBAL_CONTEXT};
