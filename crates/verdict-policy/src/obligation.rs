use verdict_core::{Attribute, AttributeValue, Context, EvaluationError, EvaluationResult, Value};

use crate::expr::Expression;

/// An advice attribute attached to a Permit or Deny outcome: the attribute
/// slot plus the expression that produces its value.
#[derive(Debug, Clone, PartialEq)]
pub struct Obligation {
    attribute: Attribute,
    expression: Expression,
}

impl Obligation {
    pub fn new(attribute: Attribute, expression: Expression) -> Self {
        Obligation {
            attribute,
            expression,
        }
    }

    /// Constant obligation assigning a literal to an attribute of the
    /// literal's own type.
    pub fn assign(id: impl Into<String>, value: Value) -> Self {
        let attribute = Attribute::new(id, value.type_of());
        Obligation::new(attribute, Expression::literal(value))
    }

    pub fn attribute(&self) -> &Attribute {
        &self.attribute
    }

    pub(crate) fn calculate(&self, ctx: &Context) -> EvaluationResult<AttributeValue> {
        let value = self.expression.calculate(ctx)?;
        if value.type_of() != self.attribute.ty() {
            return Err(EvaluationError::TypeMismatch {
                expected: self.attribute.ty(),
                actual: value.type_of(),
            });
        }
        Ok(AttributeValue::new(self.attribute.id(), value))
    }
}

/// Evaluates a block of obligations all-or-nothing: the first failure
/// discards everything collected so far.
pub(crate) fn calculate_obligations(
    obligations: &[Obligation],
    ctx: &Context,
) -> EvaluationResult<Vec<AttributeValue>> {
    obligations.iter().map(|o| o.calculate(ctx)).collect()
}
