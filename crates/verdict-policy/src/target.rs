use verdict_core::{Context, EvaluationError, Value};

use crate::error::PolicyResult;
use crate::expr::{AttributeDesignator, Expression, Function};

// ---------------------------------------------------------------------------
// Match outcome
// ---------------------------------------------------------------------------

/// Three-way outcome of target evaluation. `Fail` means the match itself
/// could not be computed, e.g. a referenced attribute was absent.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Matched,
    NoMatch,
    Fail(EvaluationError),
}

// ---------------------------------------------------------------------------
// Match — a single predicate over one designator and one literal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    function: Function,
    designator: AttributeDesignator,
    literal: Value,
}

impl Match {
    /// Builds a validated predicate: the function must accept exactly the
    /// designator's declared type and the literal's type.
    pub fn new(
        function: Function,
        designator: AttributeDesignator,
        literal: Value,
    ) -> PolicyResult<Self> {
        function.validate(&[
            Expression::Designator(designator.clone()),
            Expression::Literal(literal.clone()),
        ])?;
        Ok(Match {
            function,
            designator,
            literal,
        })
    }

    fn calculate(&self, ctx: &Context) -> MatchResult {
        let value = match self.designator.calculate(ctx) {
            Ok(v) => v,
            Err(err) => return MatchResult::Fail(err),
        };
        match self.function.apply(&[value, self.literal.clone()]) {
            Ok(Value::Boolean(true)) => MatchResult::Matched,
            Ok(_) => MatchResult::NoMatch,
            Err(err) => MatchResult::Fail(err),
        }
    }
}

// ---------------------------------------------------------------------------
// AllOf / AnyOf / Target — the three nesting levels
// ---------------------------------------------------------------------------

/// Conjunction of single matches.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AllOf {
    matches: Vec<Match>,
}

impl AllOf {
    pub fn new(matches: Vec<Match>) -> Self {
        AllOf { matches }
    }

    fn calculate(&self, ctx: &Context) -> MatchResult {
        all_of(self.matches.iter().map(|m| m.calculate(ctx)))
    }
}

/// Disjunction of conjunctions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnyOf {
    all: Vec<AllOf>,
}

impl AnyOf {
    pub fn new(all: Vec<AllOf>) -> Self {
        AnyOf { all }
    }

    fn calculate(&self, ctx: &Context) -> MatchResult {
        any_of(self.all.iter().map(|a| a.calculate(ctx)))
    }
}

/// Top-level target: a conjunction of disjunctions. The empty target
/// trivially matches.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Target {
    any: Vec<AnyOf>,
}

impl Target {
    pub fn new(any: Vec<AnyOf>) -> Self {
        Target { any }
    }

    pub fn calculate(&self, ctx: &Context) -> MatchResult {
        all_of(self.any.iter().map(|a| a.calculate(ctx)))
    }
}

// A definite outcome wins over a failure in both combinators: a no-match
// inside a conjunction (resp. a match inside a disjunction) settles the
// result even if another child already failed.

fn all_of(results: impl Iterator<Item = MatchResult>) -> MatchResult {
    let mut failed: Option<EvaluationError> = None;
    for result in results {
        match result {
            MatchResult::NoMatch => return MatchResult::NoMatch,
            MatchResult::Fail(err) => {
                if failed.is_none() {
                    failed = Some(err);
                }
            }
            MatchResult::Matched => {}
        }
    }
    match failed {
        Some(err) => MatchResult::Fail(err),
        None => MatchResult::Matched,
    }
}

fn any_of(results: impl Iterator<Item = MatchResult>) -> MatchResult {
    let mut failed: Option<EvaluationError> = None;
    for result in results {
        match result {
            MatchResult::Matched => return MatchResult::Matched,
            MatchResult::Fail(err) => {
                if failed.is_none() {
                    failed = Some(err);
                }
            }
            MatchResult::NoMatch => {}
        }
    }
    match failed {
        Some(err) => MatchResult::Fail(err),
        None => MatchResult::NoMatch,
    }
}
