use serde_json::json;
use verdict_core::{Context, EvaluationError, Type, Value};

use crate::expr::Expression;
use crate::obligation::{calculate_obligations, Obligation};
use crate::response::{Effect, Response};
use crate::target::{MatchResult, Target};

/// Leaf evaluable: a target and an optional condition guarding a fixed
/// Permit or Deny effect.
#[derive(Debug, Clone)]
pub struct Rule {
    id: Option<String>,
    ord: usize,
    target: Target,
    condition: Option<Expression>,
    effect: Effect,
    obligations: Vec<Obligation>,
}

impl Rule {
    /// `effect` must be `Permit` or `Deny`; the other effects are
    /// evaluation outcomes, not rule decisions.
    pub fn new(
        id: impl Into<String>,
        target: Target,
        condition: Option<Expression>,
        effect: Effect,
        obligations: Vec<Obligation>,
    ) -> Self {
        Rule {
            id: Some(id.into()),
            ord: 0,
            target,
            condition,
            effect,
            obligations,
        }
    }

    /// A rule without a publishable id: evaluated like any other, excluded
    /// from mutation and path lookup.
    pub fn hidden(
        target: Target,
        condition: Option<Expression>,
        effect: Effect,
        obligations: Vec<Obligation>,
    ) -> Self {
        Rule {
            id: None,
            ord: 0,
            target,
            condition,
            effect,
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

    pub fn effect(&self) -> Effect {
        self.effect
    }

    pub(crate) fn with_order(mut self, ord: usize) -> Self {
        self.ord = ord;
        self
    }

    /// Failures inside a rule surface as the indeterminate form of the
    /// effect the rule would have produced.
    fn indeterminate_effect(&self) -> Effect {
        match self.effect {
            Effect::Deny => Effect::IndeterminateD,
            _ => Effect::IndeterminateP,
        }
    }

    pub fn calculate(&self, ctx: &Context) -> Response {
        match self.target.calculate(ctx) {
            MatchResult::Fail(err) => {
                return Response::new(self.indeterminate_effect(), Some(err), Vec::new());
            }
            MatchResult::NoMatch => return Response::not_applicable(),
            MatchResult::Matched => {}
        }

        if let Some(condition) = &self.condition {
            match condition.calculate(ctx) {
                Ok(Value::Boolean(true)) => {}
                Ok(Value::Boolean(false)) => return Response::not_applicable(),
                Ok(other) => {
                    let err = EvaluationError::TypeMismatch {
                        expected: Type::Boolean,
                        actual: other.type_of(),
                    };
                    return Response::new(self.indeterminate_effect(), Some(err), Vec::new());
                }
                Err(err) => {
                    return Response::new(self.indeterminate_effect(), Some(err), Vec::new());
                }
            }
        }

        match calculate_obligations(&self.obligations, ctx) {
            Ok(obligations) => Response::new(self.effect, None, obligations),
            Err(err) => Response::new(self.indeterminate_effect(), Some(err), Vec::new()),
        }
    }

    pub(crate) fn marshal_value(&self) -> serde_json::Value {
        json!({
            "ord": self.ord,
            "id": self.id.as_deref().unwrap_or(""),
        })
    }

    pub(crate) fn path_to(&self, id: &str) -> Option<Vec<String>> {
        match &self.id {
            Some(own) if own == id => Some(vec![own.clone()]),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{AttributeDesignator, Function};
    use crate::target::{AllOf, AnyOf, Match};
    use verdict_core::{Attribute, EvaluationError, Type};

    fn string_target(id: &str, value: &str) -> Target {
        Target::new(vec![AnyOf::new(vec![AllOf::new(vec![Match::new(
            Function::StringEqual,
            AttributeDesignator::new(Attribute::new(id, Type::String)),
            Value::String(value.into()),
        )
        .unwrap()])])])
    }

    fn ctx() -> Context {
        Context::new().with_attribute("test-string", Value::String("test".into()))
    }

    #[test]
    fn test_empty_rule_fires_its_effect() {
        let rule = Rule::new("permit", Target::default(), None, Effect::Permit, vec![]);
        let r = rule.calculate(&ctx());
        assert_eq!(r.effect, Effect::Permit);
        assert_eq!(r.status, None);
        assert!(r.obligations.is_empty());
    }

    #[test]
    fn test_no_match_is_not_applicable() {
        let rule = Rule::new(
            "permit",
            string_target("test-string", "other"),
            None,
            Effect::Permit,
            vec![],
        );
        assert_eq!(rule.calculate(&ctx()).effect, Effect::NotApplicable);
    }

    #[test]
    fn test_target_failure_projects_by_effect() {
        let permit = Rule::new(
            "permit",
            string_target("missing", "test"),
            None,
            Effect::Permit,
            vec![],
        );
        let r = permit.calculate(&ctx());
        assert_eq!(r.effect, Effect::IndeterminateP);
        assert!(matches!(
            r.status,
            Some(EvaluationError::MissingAttribute { .. })
        ));

        let deny = Rule::new(
            "deny",
            string_target("missing", "test"),
            None,
            Effect::Deny,
            vec![],
        );
        assert_eq!(deny.calculate(&ctx()).effect, Effect::IndeterminateD);
    }

    #[test]
    fn test_false_condition_is_not_applicable() {
        let rule = Rule::new(
            "permit",
            Target::default(),
            Some(Expression::literal(Value::Boolean(false))),
            Effect::Permit,
            vec![],
        );
        assert_eq!(rule.calculate(&ctx()).effect, Effect::NotApplicable);
    }

    #[test]
    fn test_non_boolean_condition_is_indeterminate() {
        let rule = Rule::new(
            "deny",
            Target::default(),
            Some(Expression::designator(Attribute::new(
                "test-string",
                Type::String,
            ))),
            Effect::Deny,
            vec![],
        );
        let r = rule.calculate(&ctx());
        assert_eq!(r.effect, Effect::IndeterminateD);
        assert!(matches!(
            r.status,
            Some(EvaluationError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_condition_error_is_indeterminate() {
        let rule = Rule::new(
            "permit",
            Target::default(),
            Some(Expression::designator(Attribute::new(
                "absent",
                Type::Boolean,
            ))),
            Effect::Permit,
            vec![],
        );
        let r = rule.calculate(&ctx());
        assert_eq!(r.effect, Effect::IndeterminateP);
        assert!(matches!(
            r.status,
            Some(EvaluationError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_obligations_attached_on_fire() {
        let rule = Rule::new(
            "permit",
            Target::default(),
            None,
            Effect::Permit,
            vec![Obligation::assign("obligation", Value::String("test".into()))],
        );
        let r = rule.calculate(&ctx());
        assert_eq!(r.effect, Effect::Permit);
        assert_eq!(r.obligations.len(), 1);
        assert_eq!(r.obligations[0].id, "obligation");
    }

    #[test]
    fn test_obligation_failure_downgrades_and_drops_partials() {
        let rule = Rule::new(
            "permit",
            Target::default(),
            None,
            Effect::Permit,
            vec![
                Obligation::assign("ok", Value::String("kept?".into())),
                Obligation::new(
                    Attribute::new("bad", Type::String),
                    Expression::designator(Attribute::new("absent", Type::String)),
                ),
            ],
        );
        let r = rule.calculate(&ctx());
        assert_eq!(r.effect, Effect::IndeterminateP);
        assert!(r.obligations.is_empty());
    }

    #[test]
    fn test_hidden_rule_has_no_id_or_path() {
        let rule = Rule::hidden(Target::default(), None, Effect::Permit, vec![]);
        assert!(rule.is_hidden());
        assert_eq!(rule.id(), None);
        assert_eq!(rule.path_to("anything"), None);
    }

    #[test]
    fn test_marshal_value_shape() {
        let rule = Rule::new("permit", Target::default(), None, Effect::Permit, vec![]);
        assert_eq!(
            serde_json::to_string(&rule.marshal_value()).unwrap(),
            r#"{"ord":0,"id":"permit"}"#
        );
    }
}
