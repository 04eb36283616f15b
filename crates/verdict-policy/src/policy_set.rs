use serde_json::json;
use verdict_core::Context;

use crate::combine::{combine_effect_and_status, CombinerKind, PolicyCombiner};
use crate::error::{PolicyError, PolicyResult};
use crate::node::Evaluable;
use crate::obligation::{calculate_obligations, Obligation};
use crate::response::{Effect, Response};
use crate::target::{MatchResult, Target};

/// Ordered collection of policies and nested policy sets under one
/// policy-combining algorithm.
#[derive(Debug, Clone)]
pub struct PolicySet {
    id: Option<String>,
    ord: usize,
    target: Target,
    policies: Vec<Evaluable>,
    algorithm: PolicyCombiner,
    obligations: Vec<Obligation>,
}

impl PolicySet {
    pub fn new(
        id: impl Into<String>,
        target: Target,
        policies: Vec<Evaluable>,
        algorithm: CombinerKind,
        obligations: Vec<Obligation>,
    ) -> PolicyResult<Self> {
        Self::build(Some(id.into()), target, policies, algorithm, obligations)
    }

    pub fn hidden(
        target: Target,
        policies: Vec<Evaluable>,
        algorithm: CombinerKind,
        obligations: Vec<Obligation>,
    ) -> PolicyResult<Self> {
        Self::build(None, target, policies, algorithm, obligations)
    }

    fn build(
        id: Option<String>,
        target: Target,
        policies: Vec<Evaluable>,
        algorithm: CombinerKind,
        obligations: Vec<Obligation>,
    ) -> PolicyResult<Self> {
        if policies.iter().any(|p| matches!(p, Evaluable::Rule(_))) {
            return Err(PolicyError::InvalidPolicySetItemType);
        }
        let policies: Vec<Evaluable> = policies
            .into_iter()
            .enumerate()
            .map(|(i, p)| p.with_order(i))
            .collect();
        let algorithm = PolicyCombiner::build(&algorithm, &policies);
        Ok(PolicySet {
            id,
            ord: 0,
            target,
            policies,
            algorithm,
            obligations,
        })
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

    pub fn policies(&self) -> &[Evaluable] {
        &self.policies
    }

    pub fn algorithm(&self) -> &PolicyCombiner {
        &self.algorithm
    }

    pub(crate) fn with_order(mut self, ord: usize) -> Self {
        self.ord = ord;
        self
    }

    pub fn calculate(&self, ctx: &Context) -> Response {
        match self.target.calculate(ctx) {
            MatchResult::Fail(err) => {
                let r = self.algorithm.execute(&self.policies, ctx);
                return combine_effect_and_status(err, r);
            }
            MatchResult::NoMatch => return Response::not_applicable(),
            MatchResult::Matched => {}
        }

        let mut r = self.algorithm.execute(&self.policies, ctx);
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

    /// Inserts or replaces a child at the empty path, or recurses into the
    /// child the head segment names.
    pub fn append(&self, path: &[&str], child: &Evaluable) -> PolicyResult<PolicySet> {
        if self.is_hidden() {
            return Err(PolicyError::HiddenPolicySetModification);
        }
        match path {
            [] => {
                if matches!(child, Evaluable::Rule(_)) {
                    return Err(PolicyError::InvalidPolicySetItemType);
                }
                let id = child.id().ok_or(PolicyError::HiddenPolicyAppend)?;

                let mut policies = self.policies.clone();
                match policies.iter().position(|p| p.id() == Some(id)) {
                    Some(i) => {
                        let ord = policies[i].order();
                        policies[i] = child.with_order(ord);
                    }
                    None => {
                        let ord = policies.len();
                        policies.push(child.with_order(ord));
                    }
                }
                Ok(self.with_policies(policies))
            }
            [head, rest @ ..] => {
                let i = self
                    .policies
                    .iter()
                    .position(|p| p.id() == Some(*head))
                    .ok_or_else(|| PolicyError::MissingPolicySetChild(head.to_string()))?;
                let mut policies = self.policies.clone();
                policies[i] = policies[i].append(rest, child)?;
                Ok(self.with_policies(policies))
            }
        }
    }

    /// Removes the child a single-segment path names, or recurses. The
    /// survivors keep their original ordinals.
    pub fn delete(&self, path: &[&str]) -> PolicyResult<PolicySet> {
        if self.is_hidden() {
            return Err(PolicyError::HiddenPolicySetModification);
        }
        match path {
            [] => Err(PolicyError::TooShortPath),
            [id] => {
                let i = self
                    .policies
                    .iter()
                    .position(|p| p.id() == Some(*id))
                    .ok_or_else(|| PolicyError::MissingPolicySetChild(id.to_string()))?;
                let mut policies = self.policies.clone();
                policies.remove(i);
                Ok(self.with_policies(policies))
            }
            [head, rest @ ..] => {
                let i = self
                    .policies
                    .iter()
                    .position(|p| p.id() == Some(*head))
                    .ok_or_else(|| PolicyError::MissingPolicySetChild(head.to_string()))?;
                let mut policies = self.policies.clone();
                policies[i] = policies[i].delete(rest)?;
                Ok(self.with_policies(policies))
            }
        }
    }

    fn with_policies(&self, policies: Vec<Evaluable>) -> PolicySet {
        let mut next = self.clone();
        next.algorithm = self.algorithm.rebuilt(&policies);
        next.policies = policies;
        next
    }

    pub(crate) fn marshal_value(&self, depth: usize) -> serde_json::Value {
        let policies: Vec<serde_json::Value> = if depth == 0 {
            Vec::new()
        } else {
            self.policies
                .iter()
                .filter(|p| !p.is_hidden())
                .map(|p| p.marshal_value(depth - 1))
                .collect()
        };
        json!({
            "ord": self.ord,
            "id": self.id.as_deref().unwrap_or(""),
            "policies": policies,
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
        for child in &self.policies {
            if let Some(mut path) = child.path_to(id) {
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

#[cfg(test)]
mod tests {
    use super::*;

    use crate::combine::MapperParams;
    use crate::expr::Expression;
    use crate::policy::Policy;
    use crate::rule::Rule;
    use verdict_core::{Attribute, Type, Value};

    fn simple_rule(id: &str, effect: Effect) -> Rule {
        Rule::new(id, Target::default(), None, effect, vec![])
    }

    fn simple_policy(id: &str, rules: Vec<Rule>) -> Evaluable {
        Evaluable::from(Policy::new(
            id,
            Target::default(),
            rules,
            CombinerKind::FirstApplicable,
            vec![],
        ))
    }

    fn simple_set(id: &str, policies: Vec<Evaluable>) -> PolicySet {
        PolicySet::new(
            id,
            Target::default(),
            policies,
            CombinerKind::FirstApplicable,
            vec![],
        )
        .unwrap()
    }

    fn three_policies() -> Vec<Evaluable> {
        vec![
            simple_policy("first", vec![simple_rule("permit", Effect::Permit)]),
            simple_policy("second", vec![simple_rule("permit", Effect::Permit)]),
            simple_policy("third", vec![simple_rule("permit", Effect::Permit)]),
        ]
    }

    fn mapper_set() -> PolicySet {
        PolicySet::new(
            "test",
            Target::default(),
            three_policies(),
            CombinerKind::Mapper(
                MapperParams::new(Expression::designator(Attribute::new("k", Type::String)))
                    .with_default("first")
                    .with_error("second"),
            ),
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn test_construction_assigns_contiguous_ordinals() {
        let p = simple_set("test", three_policies());
        for (i, child) in p.policies().iter().enumerate() {
            assert_eq!(child.order(), i);
        }
    }

    #[test]
    fn test_construction_rejects_rule_children() {
        let err = PolicySet::new(
            "test",
            Target::default(),
            vec![Evaluable::from(simple_rule("r", Effect::Permit))],
            CombinerKind::FirstApplicable,
            vec![],
        )
        .unwrap_err();
        assert_eq!(err, PolicyError::InvalidPolicySetItemType);
    }

    #[test]
    fn test_append_at_root_replaces_in_place() {
        let p = simple_set("test", three_policies());
        let replacement = simple_policy("second", vec![simple_rule("deny", Effect::Deny)]);
        let next = p.append(&[], &replacement).unwrap();

        assert_eq!(next.policies().len(), 3);
        let second = &next.policies()[1];
        assert_eq!(second.id(), Some("second"));
        assert_eq!(second.order(), 1);
        // Untouched siblings are shared, the replaced child is not.
        assert!(p.policies()[0].ptr_eq(&next.policies()[0]));
        assert!(p.policies()[2].ptr_eq(&next.policies()[2]));
        assert!(!p.policies()[1].ptr_eq(&next.policies()[1]));
    }

    #[test]
    fn test_append_new_child_gets_next_ordinal() {
        let p = simple_set("test", three_policies());
        let fourth = simple_policy("fourth", vec![simple_rule("permit", Effect::Permit)]);
        let next = p.append(&[], &fourth).unwrap();
        assert_eq!(next.policies().len(), 4);
        assert_eq!(next.policies()[3].id(), Some("fourth"));
        assert_eq!(next.policies()[3].order(), 3);
    }

    #[test]
    fn test_append_recurses_by_head_segment() {
        let p = simple_set("test", vec![simple_policy("inner", vec![])]);
        let next = p
            .append(
                &["inner"],
                &Evaluable::from(simple_rule("r", Effect::Permit)),
            )
            .unwrap();
        match &next.policies()[0] {
            Evaluable::Policy(inner) => {
                assert_eq!(inner.rules().len(), 1);
                assert_eq!(inner.rules()[0].id(), Some("r"));
            }
            other => panic!("expected policy child, got {:?}", other),
        }
    }

    #[test]
    fn test_append_missing_path_segment() {
        let p = simple_set("test", vec![]);
        let child = simple_policy("x", vec![]);
        assert_eq!(
            p.append(&["test"], &child).unwrap_err(),
            PolicyError::MissingPolicySetChild("test".into())
        );
    }

    #[test]
    fn test_append_rejects_rules_hidden_children_and_hidden_parents() {
        let p = simple_set("test", vec![]);

        assert_eq!(
            p.append(&[], &Evaluable::from(simple_rule("r", Effect::Permit)))
                .unwrap_err(),
            PolicyError::InvalidPolicySetItemType
        );

        let hidden_child = Evaluable::from(
            PolicySet::hidden(Target::default(), vec![], CombinerKind::FirstApplicable, vec![])
                .unwrap(),
        );
        assert_eq!(
            p.append(&[], &hidden_child).unwrap_err(),
            PolicyError::HiddenPolicyAppend
        );

        let hidden_parent =
            PolicySet::hidden(Target::default(), vec![], CombinerKind::FirstApplicable, vec![])
                .unwrap();
        let child = simple_policy("x", vec![]);
        assert_eq!(
            hidden_parent.append(&[], &child).unwrap_err(),
            PolicyError::HiddenPolicySetModification
        );
    }

    #[test]
    fn test_append_hidden_rule_into_nested_policy() {
        let p = simple_set("test", vec![simple_policy("inner", vec![])]);
        let hidden_rule =
            Evaluable::from(Rule::hidden(Target::default(), None, Effect::Permit, vec![]));
        assert_eq!(
            p.append(&["inner"], &hidden_rule).unwrap_err(),
            PolicyError::HiddenRuleAppend
        );
    }

    #[test]
    fn test_root_ordinal_survives_mutation() {
        let p = simple_set("root", three_policies()).with_order(5);
        let next = p
            .append(
                &[],
                &simple_policy("fourth", vec![simple_rule("permit", Effect::Permit)]),
            )
            .unwrap();
        assert_eq!(next.order(), 5);
    }

    #[test]
    fn test_delete_each_position_keeps_ordinals() {
        let p = simple_set("test", three_policies());

        let next = p.delete(&["second"]).unwrap();
        let ids: Vec<Option<&str>> = next.policies().iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![Some("first"), Some("third")]);
        assert_eq!(next.policies()[0].order(), 0);
        assert_eq!(next.policies()[1].order(), 2);

        let next = p.delete(&["first"]).unwrap();
        assert_eq!(next.policies()[0].order(), 1);
        assert_eq!(next.policies()[1].order(), 2);

        let next = p.delete(&["third"]).unwrap();
        assert_eq!(next.policies()[0].order(), 0);
        assert_eq!(next.policies()[1].order(), 1);
    }

    #[test]
    fn test_delete_recurses_into_policies() {
        let p = simple_set("test", three_policies());
        let next = p.delete(&["first", "permit"]).unwrap();
        assert_eq!(next.policies().len(), 3);
        match &next.policies()[0] {
            Evaluable::Policy(inner) => assert!(inner.rules().is_empty()),
            other => panic!("expected policy child, got {:?}", other),
        }
    }

    #[test]
    fn test_delete_errors() {
        let p = simple_set("test", three_policies());
        assert_eq!(p.delete(&[]).unwrap_err(), PolicyError::TooShortPath);
        assert_eq!(
            p.delete(&["fourth"]).unwrap_err(),
            PolicyError::MissingPolicySetChild("fourth".into())
        );
        assert_eq!(
            p.delete(&["fourth", "permit"]).unwrap_err(),
            PolicyError::MissingPolicySetChild("fourth".into())
        );
        assert_eq!(
            p.delete(&["first", "deny"]).unwrap_err(),
            PolicyError::MissingPolicyChild("deny".into())
        );

        let hidden = PolicySet::hidden(
            Target::default(),
            vec![simple_policy("first", vec![])],
            CombinerKind::FirstApplicable,
            vec![],
        )
        .unwrap();
        assert_eq!(
            hidden.delete(&["first"]).unwrap_err(),
            PolicyError::HiddenPolicySetModification
        );
    }

    #[test]
    fn test_mutations_leave_the_original_tree_unchanged() {
        let ctx = Context::new();
        let p = simple_set("test", three_policies());
        let before = p.calculate(&ctx);

        let _deleted = p.delete(&["first"]).unwrap();
        let _appended = p
            .append(
                &[],
                &simple_policy("first", vec![simple_rule("deny", Effect::Deny)]),
            )
            .unwrap();

        assert_eq!(p.policies().len(), 3);
        assert_eq!(p.calculate(&ctx), before);
    }

    #[test]
    fn test_mapper_index_follows_append() {
        let p = mapper_set();
        let fourth = simple_policy("fourth", vec![simple_rule("permit", Effect::Permit)]);
        let next = p.append(&[], &fourth).unwrap();

        let mapper = next.algorithm().mapper().unwrap();
        assert_eq!(mapper.keys(), vec!["first", "fourth", "second", "third"]);
    }

    #[test]
    fn test_mapper_default_follows_replacement() {
        let p = mapper_set();
        let replacement = simple_policy("first", vec![simple_rule("deny", Effect::Deny)]);
        let next = p.append(&[], &replacement).unwrap();

        let mapper = next.algorithm().mapper().unwrap();
        let def = mapper.default_ref().unwrap();
        // The reference aliases the instance stored in the children slice.
        assert!(def.ptr_eq(&next.policies()[0]));
    }

    #[test]
    fn test_mapper_error_reference_drops_on_delete() {
        let p = mapper_set();
        let next = p.delete(&["second"]).unwrap();

        let mapper = next.algorithm().mapper().unwrap();
        assert_eq!(mapper.keys(), vec!["first", "third"]);
        assert!(mapper.default_ref().is_some());
        assert!(mapper.error_ref().is_none());
    }

    #[test]
    fn test_mapper_index_aliases_children_after_construction() {
        let p = mapper_set();
        let mapper = p.algorithm().mapper().unwrap();
        for child in p.policies() {
            let id = child.id().unwrap();
            let indexed = mapper
                .keys()
                .iter()
                .position(|k| *k == id)
                .expect("child id must be indexed");
            let _ = indexed;
        }
        assert!(mapper.default_ref().unwrap().ptr_eq(&p.policies()[0]));
        assert!(mapper.error_ref().unwrap().ptr_eq(&p.policies()[1]));
    }

    #[test]
    fn test_nested_set_evaluates_through() {
        let inner = PolicySet::new(
            "inner",
            Target::default(),
            vec![simple_policy("p", vec![simple_rule("permit", Effect::Permit)])],
            CombinerKind::FirstApplicable,
            vec![],
        )
        .unwrap();
        let outer = simple_set("outer", vec![Evaluable::from(inner)]);
        assert_eq!(outer.calculate(&Context::new()).effect, Effect::Permit);
    }

    #[test]
    fn test_obligations_appended_after_child_obligations() {
        let hidden_policy = Evaluable::from(Policy::hidden(
            Target::default(),
            vec![Rule::hidden(Target::default(), None, Effect::Permit, vec![])],
            CombinerKind::FirstApplicable,
            vec![],
        ));
        let p = PolicySet::new(
            "test",
            Target::default(),
            vec![hidden_policy],
            CombinerKind::FirstApplicable,
            vec![Obligation::assign("obligation", Value::String("test".into()))],
        )
        .unwrap();
        let r = p.calculate(&Context::new());
        assert_eq!(r.effect, Effect::Permit);
        assert_eq!(r.obligations.len(), 1);
        assert_eq!(r.obligations[0].id, "obligation");
    }
}
