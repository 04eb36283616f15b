use verdict_core::{Attribute, Context, EvaluationError, EvaluationResult, Type, Value};

use crate::error::{PolicyError, PolicyResult};

// ---------------------------------------------------------------------------
// Function — the static builtin registry
// ---------------------------------------------------------------------------

/// Builtin functions available to expressions. All builtins produce a
/// boolean. Referencing a name outside this registry is a construction-time
/// validation error; evaluation never meets an unknown function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    BooleanEqual,
    StringEqual,
    IntegerEqual,
    FloatEqual,
    AddressEqual,
    NetworkEqual,
    DomainEqual,
    SetOfStringsContains,
    ListOfStringsContains,
    NetworkContainsAddress,
    SetOfNetworksContainsAddress,
    SetOfDomainsContainsDomain,
    BooleanNot,
    BooleanAnd,
    BooleanOr,
}

impl Function {
    /// Registry lookup by wire name.
    pub fn lookup(name: &str) -> Option<Function> {
        let f = match name {
            "boolean-equal" => Function::BooleanEqual,
            "string-equal" => Function::StringEqual,
            "integer-equal" => Function::IntegerEqual,
            "float-equal" => Function::FloatEqual,
            "address-equal" => Function::AddressEqual,
            "network-equal" => Function::NetworkEqual,
            "domain-equal" => Function::DomainEqual,
            "set-of-strings-contains" => Function::SetOfStringsContains,
            "list-of-strings-contains" => Function::ListOfStringsContains,
            "network-contains-address" => Function::NetworkContainsAddress,
            "set-of-networks-contains-address" => Function::SetOfNetworksContainsAddress,
            "set-of-domains-contains-domain" => Function::SetOfDomainsContainsDomain,
            "not" => Function::BooleanNot,
            "and" => Function::BooleanAnd,
            "or" => Function::BooleanOr,
            _ => return None,
        };
        Some(f)
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::BooleanEqual => "boolean-equal",
            Function::StringEqual => "string-equal",
            Function::IntegerEqual => "integer-equal",
            Function::FloatEqual => "float-equal",
            Function::AddressEqual => "address-equal",
            Function::NetworkEqual => "network-equal",
            Function::DomainEqual => "domain-equal",
            Function::SetOfStringsContains => "set-of-strings-contains",
            Function::ListOfStringsContains => "list-of-strings-contains",
            Function::NetworkContainsAddress => "network-contains-address",
            Function::SetOfNetworksContainsAddress => "set-of-networks-contains-address",
            Function::SetOfDomainsContainsDomain => "set-of-domains-contains-domain",
            Function::BooleanNot => "not",
            Function::BooleanAnd => "and",
            Function::BooleanOr => "or",
        }
    }

    pub fn return_type(self) -> Type {
        Type::Boolean
    }

    /// Fixed argument signature, or `None` for the variadic boolean
    /// connectives.
    fn fixed_args(self) -> Option<&'static [Type]> {
        match self {
            Function::BooleanEqual => Some(&[Type::Boolean, Type::Boolean]),
            Function::StringEqual => Some(&[Type::String, Type::String]),
            Function::IntegerEqual => Some(&[Type::Integer, Type::Integer]),
            Function::FloatEqual => Some(&[Type::Float, Type::Float]),
            Function::AddressEqual => Some(&[Type::Address, Type::Address]),
            Function::NetworkEqual => Some(&[Type::Network, Type::Network]),
            Function::DomainEqual => Some(&[Type::Domain, Type::Domain]),
            Function::SetOfStringsContains => Some(&[Type::SetOfStrings, Type::String]),
            Function::ListOfStringsContains => Some(&[Type::ListOfStrings, Type::String]),
            Function::NetworkContainsAddress => Some(&[Type::Network, Type::Address]),
            Function::SetOfNetworksContainsAddress => Some(&[Type::SetOfNetworks, Type::Address]),
            Function::SetOfDomainsContainsDomain => Some(&[Type::SetOfDomains, Type::Domain]),
            Function::BooleanNot => Some(&[Type::Boolean]),
            Function::BooleanAnd | Function::BooleanOr => None,
        }
    }

    /// Static signature check against argument result types.
    pub(crate) fn validate(self, args: &[Expression]) -> PolicyResult<()> {
        let bad = |detail: String| Err(PolicyError::Validation(detail));
        match self.fixed_args() {
            Some(expected) => {
                if args.len() != expected.len() {
                    return bad(format!(
                        "function {:?} takes {} arguments, got {}",
                        self.name(),
                        expected.len(),
                        args.len()
                    ));
                }
                for (i, (arg, want)) in args.iter().zip(expected).enumerate() {
                    let got = arg.result_type();
                    if got != *want {
                        return bad(format!(
                            "argument {} of {:?} must be {}, got {}",
                            i,
                            self.name(),
                            want,
                            got
                        ));
                    }
                }
                Ok(())
            }
            None => {
                if args.is_empty() {
                    return bad(format!("function {:?} takes at least one argument", self.name()));
                }
                for (i, arg) in args.iter().enumerate() {
                    if arg.result_type() != Type::Boolean {
                        return bad(format!(
                            "argument {} of {:?} must be boolean, got {}",
                            i,
                            self.name(),
                            arg.result_type()
                        ));
                    }
                }
                Ok(())
            }
        }
    }

    /// Applies the function to already-evaluated arguments.
    pub fn apply(self, args: &[Value]) -> EvaluationResult<Value> {
        let arity = |n: usize| -> EvaluationResult<()> {
            if args.len() == n {
                Ok(())
            } else {
                Err(EvaluationError::function(
                    self.name(),
                    format!("expected {} arguments, got {}", n, args.len()),
                ))
            }
        };

        let result = match self {
            Function::BooleanEqual => {
                arity(2)?;
                args[0].boolean()? == args[1].boolean()?
            }
            Function::StringEqual => {
                arity(2)?;
                args[0].string()? == args[1].string()?
            }
            Function::IntegerEqual => {
                arity(2)?;
                args[0].integer()? == args[1].integer()?
            }
            Function::FloatEqual => {
                arity(2)?;
                args[0].float()? == args[1].float()?
            }
            Function::AddressEqual => {
                arity(2)?;
                args[0].address()? == args[1].address()?
            }
            Function::NetworkEqual => {
                arity(2)?;
                args[0].network()? == args[1].network()?
            }
            Function::DomainEqual => {
                arity(2)?;
                args[0].domain()? == args[1].domain()?
            }
            Function::SetOfStringsContains
            | Function::ListOfStringsContains
            | Function::NetworkContainsAddress
            | Function::SetOfNetworksContainsAddress
            | Function::SetOfDomainsContainsDomain => {
                arity(2)?;
                args[0].contains(&args[1])?
            }
            Function::BooleanNot => {
                arity(1)?;
                !args[0].boolean()?
            }
            Function::BooleanAnd => {
                let mut out = true;
                for arg in args {
                    out = out && arg.boolean()?;
                }
                out
            }
            Function::BooleanOr => {
                let mut out = false;
                for arg in args {
                    out = out || arg.boolean()?;
                }
                out
            }
        };
        Ok(Value::Boolean(result))
    }
}

// ---------------------------------------------------------------------------
// AttributeDesignator — a typed reference into the context
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDesignator {
    attribute: Attribute,
}

impl AttributeDesignator {
    pub fn new(attribute: Attribute) -> Self {
        AttributeDesignator { attribute }
    }

    pub fn attribute(&self) -> &Attribute {
        &self.attribute
    }

    pub fn calculate(&self, ctx: &Context) -> EvaluationResult<Value> {
        ctx.attribute(self.attribute.id(), self.attribute.ty())
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// ContentSelector — a typed lookup through the context's content store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ContentSelector {
    item: String,
    keys: Vec<Expression>,
    ty: Type,
}

impl ContentSelector {
    pub fn new(item: impl Into<String>, keys: Vec<Expression>, ty: Type) -> Self {
        ContentSelector {
            item: item.into(),
            keys,
            ty,
        }
    }

    fn calculate(&self, ctx: &Context) -> EvaluationResult<Value> {
        let keys = self
            .keys
            .iter()
            .map(|k| k.calculate(ctx))
            .collect::<EvaluationResult<Vec<Value>>>()?;
        let store = ctx.content().ok_or_else(|| {
            EvaluationError::function("select", "no content attached to context")
        })?;
        let value = store.lookup(&self.item, &keys)?;
        if value.type_of() != self.ty {
            return Err(EvaluationError::TypeMismatch {
                expected: self.ty,
                actual: value.type_of(),
            });
        }
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Expression — typed function calls over designators and literals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    function: Function,
    args: Vec<Expression>,
}

/// Expression tree. Pure: evaluation reads the context and nothing else.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Designator(AttributeDesignator),
    Selector(ContentSelector),
    Call(FunctionCall),
}

impl Expression {
    pub fn literal(value: Value) -> Self {
        Expression::Literal(value)
    }

    pub fn designator(attribute: Attribute) -> Self {
        Expression::Designator(AttributeDesignator::new(attribute))
    }

    pub fn selector(item: impl Into<String>, keys: Vec<Expression>, ty: Type) -> Self {
        Expression::Selector(ContentSelector::new(item, keys, ty))
    }

    /// Builds a validated call; signature mismatches fail here, not at
    /// evaluate time.
    pub fn call(function: Function, args: Vec<Expression>) -> PolicyResult<Self> {
        function.validate(&args)?;
        Ok(Expression::Call(FunctionCall { function, args }))
    }

    /// Builds a call through the name registry.
    pub fn resolve(name: &str, args: Vec<Expression>) -> PolicyResult<Self> {
        let function =
            Function::lookup(name).ok_or_else(|| PolicyError::UnknownFunction(name.to_string()))?;
        Self::call(function, args)
    }

    /// Static result type; known for every expression form.
    pub fn result_type(&self) -> Type {
        match self {
            Expression::Literal(v) => v.type_of(),
            Expression::Designator(d) => d.attribute().ty(),
            Expression::Selector(s) => s.ty,
            Expression::Call(c) => c.function.return_type(),
        }
    }

    pub fn calculate(&self, ctx: &Context) -> EvaluationResult<Value> {
        match self {
            Expression::Literal(v) => Ok(v.clone()),
            Expression::Designator(d) => d.calculate(ctx),
            Expression::Selector(s) => s.calculate(ctx),
            Expression::Call(c) => {
                let args = c
                    .args
                    .iter()
                    .map(|a| a.calculate(ctx))
                    .collect::<EvaluationResult<Vec<Value>>>()?;
                c.function.apply(&args)
            }
        }
    }
}
