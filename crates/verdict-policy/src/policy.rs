use std::sync::Arc;

use serde_json::json;
use verdict_core::Context;

use crate::combine::{combine_effect_and_status, CombinerKind, RuleCombiner};
use crate::error::{PolicyError, PolicyResult};
use crate::node::Evaluable;
use crate::obligation::{calculate_obligations, Obligation};
use crate::response::{Effect, Response};
use crate::rule::Rule;
use crate::target::{MatchResult, Target};

/// Ordered collection of rules under one rule-combining algorithm.
#[derive(Debug, Clone)]
pub struct Policy {
    id: Option<String>,
    ord: usize,
    target: Target,
    rules: Vec<Arc<Rule>>,
    algorithm: RuleCombiner,
    obligations: Vec<Obligation>,
}

impl Policy {
    pub fn new(
        id: impl Into<String>,
        target: Target,
        rules: Vec<Rule>,
        algorithm: CombinerKind,
        obligations: Vec<Obligation>,
    ) -> Self {
        Self::build(Some(id.into()), target, rules, algorithm, obligations)
    }

    pub fn hidden(
        target: Target,
        rules: Vec<Rule>,
        algorithm: CombinerKind,
        obligations: Vec<Obligation>,
    ) -> Self {
        Self::build(None, target, rules, algorithm, obligations)
    }

    fn build(
        id: Option<String>,
        target: Target,
        rules: Vec<Rule>,
        algorithm: CombinerKind,
        obligations: Vec<Obligation>,
    ) -> Self {
        let rules: Vec<Arc<Rule>> = rules
            .into_iter()
            .enumerate()
            .map(|(i, rule)| Arc::new(rule.with_order(i)))
            .collect();
        let algorithm = RuleCombiner::build(&algorithm, &rules);
        Policy {
            id,
            ord: 0,
            target,
            rules,
            algorithm,
            obligations,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_hidden(&self) -> bool {
        self.id.is_none()
    }

    pub fn order(&self) -> usize {
        self.ord
    }

    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    pub fn algorithm(&self) -> &RuleCombiner {
        &self.algorithm
    }

    pub(crate) fn with_order(mut self, ord: usize) -> Self {
        self.ord = ord;
        self
    }

    pub fn calculate(&self, ctx: &Context) -> Response {
        match self.target.calculate(ctx) {
            MatchResult::Fail(err) => {
                // Run the algorithm anyway: the projection must reflect the
                // effects the rules could actually have produced.
                let r = self.algorithm.execute(&self.rules, ctx);
                return combine_effect_and_status(err, r);
            }
            MatchResult::NoMatch => return Response::not_applicable(),
            MatchResult::Matched => {}
        }

        let mut r = self.algorithm.execute(&self.rules, ctx);
        if matches!(r.effect, Effect::Permit | Effect::Deny) && !self.obligations.is_empty() {
            match calculate_obligations(&self.obligations, ctx) {
                Ok(mut own) => r.obligations.append(&mut own),
                Err(err) => {
                    let effect = match r.effect {
                        Effect::Deny => Effect::IndeterminateD,
                        _ => Effect::IndeterminateP,
                    };
                    return Response::new(effect, Some(err), Vec::new());
                }
            }
        }
        r
    }

    /// Inserts or replaces a rule. An empty path addresses this policy;
    /// rules are leaves, so a non-empty path can never resolve.
    pub fn append(&self, path: &[&str], child: &Evaluable) -> PolicyResult<Policy> {
        if self.is_hidden() {
            return Err(PolicyError::HiddenPolicyModification);
        }
        if let Some(head) = path.first() {
            return Err(PolicyError::MissingPolicyChild(head.to_string()));
        }

        let rule = match child {
            Evaluable::Rule(rule) => rule,
            _ => return Err(PolicyError::InvalidPolicyItemType),
        };
        let id = rule.id().ok_or(PolicyError::HiddenRuleAppend)?;

        let mut rules = self.rules.clone();
        match rules.iter().position(|r| r.id() == Some(id)) {
            Some(i) => {
                let ord = rules[i].order();
                rules[i] = Arc::new(rule.as_ref().clone().with_order(ord));
            }
            None => {
                let ord = rules.len();
                rules.push(Arc::new(rule.as_ref().clone().with_order(ord)));
            }
        }
        Ok(self.with_rules(rules))
    }

    /// Removes the rule the single-segment path names. Surviving rules
    /// keep their original ordinals.
    pub fn delete(&self, path: &[&str]) -> PolicyResult<Policy> {
        if self.is_hidden() {
            return Err(PolicyError::HiddenPolicyModification);
        }
        match path {
            [] => Err(PolicyError::TooShortPath),
            [id] => {
                let i = self
                    .rules
                    .iter()
                    .position(|r| r.id() == Some(*id))
                    .ok_or_else(|| PolicyError::MissingPolicyChild(id.to_string()))?;
                let mut rules = self.rules.clone();
                rules.remove(i);
                Ok(self.with_rules(rules))
            }
            [id, rest, ..] => {
                if !self.rules.iter().any(|r| r.id() == Some(*id)) {
                    return Err(PolicyError::MissingPolicyChild(id.to_string()));
                }
                // The named rule exists but is a leaf.
                Err(PolicyError::MissingPolicyChild(rest.to_string()))
            }
        }
    }

    /// Copy-on-write helper: same policy, new rule list, algorithm index
    /// rebuilt against it.
    fn with_rules(&self, rules: Vec<Arc<Rule>>) -> Policy {
        let mut next = self.clone();
        next.algorithm = self.algorithm.rebuilt(&rules);
        next.rules = rules;
        next
    }

    pub(crate) fn marshal_value(&self, depth: usize) -> serde_json::Value {
        let rules: Vec<serde_json::Value> = if depth == 0 {
            Vec::new()
        } else {
            self.rules
                .iter()
                .filter(|r| !r.is_hidden())
                .map(|r| r.marshal_value())
                .collect()
        };
        json!({
            "ord": self.ord,
            "id": self.id.as_deref().unwrap_or(""),
            "rules": rules,
        })
    }

    pub fn marshal_with_depth(&self, w: &mut dyn std::io::Write, depth: i64) -> PolicyResult<()> {
        crate::node::write_marshalled(w, depth, |d| self.marshal_value(d))
    }

    pub(crate) fn path_to(&self, id: &str) -> Option<Vec<String>> {
        let own = self.id.as_ref()?;
        if own == id {
            return Some(vec![own.clone()]);
        }
        for rule in &self.rules {
            if let Some(mut path) = rule.path_to(id) {
                path.insert(0, own.clone());
                return Some(path);
            }
        }
        None
    }

    pub fn marshal_path(&self, id: &str) -> Option<crate::node::NodePath> {
        self.path_to(id).map(crate::node::NodePath::new)
    }
}
