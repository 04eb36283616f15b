use std::collections::BTreeMap;
use std::sync::Arc;

use verdict_core::{Context, EvaluationError, Type, Value};

use crate::expr::Expression;
use crate::node::Evaluable;
use crate::response::{Effect, Response};
use crate::rule::Rule;

// ---------------------------------------------------------------------------
// CombinerChild — what a combining algorithm needs from a child node
// ---------------------------------------------------------------------------

/// The two child flavors (rules under a policy, evaluables under a policy
/// set) seen through one seam, so each algorithm is written once.
pub trait CombinerChild: Clone {
    fn child_id(&self) -> Option<&str>;
    fn evaluate(&self, ctx: &Context) -> Response;
}

impl CombinerChild for Arc<Rule> {
    fn child_id(&self) -> Option<&str> {
        self.id()
    }

    fn evaluate(&self, ctx: &Context) -> Response {
        self.calculate(ctx)
    }
}

impl CombinerChild for Evaluable {
    fn child_id(&self) -> Option<&str> {
        self.id()
    }

    fn evaluate(&self, ctx: &Context) -> Response {
        self.calculate(ctx)
    }
}

// ---------------------------------------------------------------------------
// CombinerKind — the persisted description of an algorithm
// ---------------------------------------------------------------------------

/// What a policy document says about its combining algorithm. The runtime
/// [`Combiner`] is built from this against a concrete child list; the
/// mapper's private index is derived state, never part of the description.
#[derive(Debug, Clone, PartialEq)]
pub enum CombinerKind {
    DenyOverrides,
    PermitOverrides,
    FirstApplicable,
    Mapper(MapperParams),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapperParams {
    /// Expression producing the selection key: a string, or a set/list of
    /// strings when `sub` is present.
    pub argument: Expression,
    /// Child evaluated when the key selects nothing.
    pub default_id: Option<String>,
    /// Child evaluated when the argument fails, or when the selected child
    /// comes back indeterminate.
    pub error_id: Option<String>,
    /// Algorithm combining the selected children of a set/list key.
    pub sub: Option<Box<CombinerKind>>,
}

impl MapperParams {
    pub fn new(argument: Expression) -> Self {
        MapperParams {
            argument,
            default_id: None,
            error_id: None,
            sub: None,
        }
    }

    pub fn with_default(mut self, id: impl Into<String>) -> Self {
        self.default_id = Some(id.into());
        self
    }

    pub fn with_error(mut self, id: impl Into<String>) -> Self {
        self.error_id = Some(id.into());
        self
    }

    pub fn with_sub(mut self, sub: CombinerKind) -> Self {
        self.sub = Some(Box::new(sub));
        self
    }
}

// ---------------------------------------------------------------------------
// Combiner — the runtime algorithm
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Combiner<C: CombinerChild> {
    DenyOverrides,
    PermitOverrides,
    FirstApplicable,
    Mapper(Mapper<C>),
}

pub type RuleCombiner = Combiner<Arc<Rule>>;
pub type PolicyCombiner = Combiner<Evaluable>;

impl<C: CombinerChild> Combiner<C> {
    /// Builds the runtime algorithm for a node, indexing the mapper over
    /// the node's children.
    pub(crate) fn build(kind: &CombinerKind, children: &[C]) -> Combiner<C> {
        match kind {
            CombinerKind::DenyOverrides => Combiner::DenyOverrides,
            CombinerKind::PermitOverrides => Combiner::PermitOverrides,
            CombinerKind::FirstApplicable => Combiner::FirstApplicable,
            CombinerKind::Mapper(params) => {
                Combiner::Mapper(Mapper::from_params(params, Some(children)))
            }
        }
    }

    /// Builds a sub-algorithm: no private index, it works over whatever
    /// slice the outer mapper hands it.
    fn build_sub(kind: &CombinerKind) -> Combiner<C> {
        match kind {
            CombinerKind::Mapper(params) => Combiner::Mapper(Mapper::from_params(params, None)),
            other => Combiner::build(other, &[]),
        }
    }

    /// Recomputes derived state after the child list changed. Only the
    /// mapper holds any: its index and its default/error references.
    pub(crate) fn rebuilt(&self, children: &[C]) -> Combiner<C> {
        match self {
            Combiner::Mapper(m) => Combiner::Mapper(m.reindexed(children)),
            other => other.clone(),
        }
    }

    pub fn mapper(&self) -> Option<&Mapper<C>> {
        match self {
            Combiner::Mapper(m) => Some(m),
            _ => None,
        }
    }

    pub(crate) fn execute(&self, children: &[C], ctx: &Context) -> Response {
        match self {
            Combiner::DenyOverrides => overrides(Effect::Deny, children, ctx),
            Combiner::PermitOverrides => overrides(Effect::Permit, children, ctx),
            Combiner::FirstApplicable => first_applicable(children, ctx),
            Combiner::Mapper(m) => m.execute(children, ctx),
        }
    }
}

// ---------------------------------------------------------------------------
// Deny-overrides / permit-overrides
// ---------------------------------------------------------------------------

/// The two override algorithms are mirror images; `winner` is the effect
/// that short-circuits.
fn overrides<C: CombinerChild>(winner: Effect, children: &[C], ctx: &Context) -> Response {
    let loser = match winner {
        Effect::Deny => Effect::Permit,
        _ => Effect::Deny,
    };
    // Indeterminate forms projected onto the winning and losing side.
    let (indet_w, indet_l) = match winner {
        Effect::Deny => (Effect::IndeterminateD, Effect::IndeterminateP),
        _ => (Effect::IndeterminateP, Effect::IndeterminateD),
    };

    let mut statuses: Vec<EvaluationError> = Vec::new();
    let mut obligations = Vec::new();
    let mut losers = 0;
    let mut indet_winner = 0;
    let mut indet_loser = 0;
    let mut indet_both = 0;

    for child in children {
        let r = child.evaluate(ctx);
        if r.effect == winner {
            return r;
        }
        if r.effect == loser {
            losers += 1;
            obligations.extend(r.obligations);
            continue;
        }
        if r.effect == Effect::NotApplicable {
            continue;
        }

        if r.effect == indet_w {
            indet_winner += 1;
        } else if r.effect == indet_l {
            indet_loser += 1;
        } else {
            indet_both += 1;
        }
        if let Some(status) = r.status {
            statuses.push(status);
        }
    }

    if indet_both > 0 || (indet_winner > 0 && (indet_loser > 0 || losers > 0)) {
        return Response::new(
            Effect::IndeterminateDP,
            EvaluationError::merged(statuses),
            Vec::new(),
        );
    }
    if indet_winner > 0 {
        return Response::new(indet_w, EvaluationError::merged(statuses), Vec::new());
    }
    if losers > 0 {
        return Response::new(loser, None, obligations);
    }
    if indet_loser > 0 {
        return Response::new(indet_l, EvaluationError::merged(statuses), Vec::new());
    }
    Response::not_applicable()
}

// ---------------------------------------------------------------------------
// First-applicable
// ---------------------------------------------------------------------------

fn first_applicable<C: CombinerChild>(children: &[C], ctx: &Context) -> Response {
    for child in children {
        let r = child.evaluate(ctx);
        if r.effect != Effect::NotApplicable {
            return r;
        }
    }
    Response::not_applicable()
}

// ---------------------------------------------------------------------------
// Mapper
// ---------------------------------------------------------------------------

/// Selects children by a runtime-computed key. The private index and the
/// resolved default/error references are derived from the owning node's
/// child list and rebuilt on every mutation, so they always alias the
/// instances held in that list. A mapper used as a sub-algorithm carries no
/// index and scans the slice it is given.
#[derive(Debug, Clone)]
pub struct Mapper<C: CombinerChild> {
    argument: Expression,
    default_id: Option<String>,
    error_id: Option<String>,
    sub: Option<Box<Combiner<C>>>,
    map: Option<BTreeMap<String, C>>,
    def: Option<C>,
    err: Option<C>,
}

impl<C: CombinerChild> Mapper<C> {
    fn from_params(params: &MapperParams, children: Option<&[C]>) -> Mapper<C> {
        let sub = params
            .sub
            .as_deref()
            .map(|kind| Box::new(Combiner::build_sub(kind)));
        let mut mapper = Mapper {
            argument: params.argument.clone(),
            default_id: params.default_id.clone(),
            error_id: params.error_id.clone(),
            sub,
            map: None,
            def: None,
            err: None,
        };
        if let Some(children) = children {
            mapper.index(children);
        }
        mapper
    }

    fn reindexed(&self, children: &[C]) -> Mapper<C> {
        let mut mapper = self.clone();
        mapper.index(children);
        mapper
    }

    fn index(&mut self, children: &[C]) {
        let mut map = BTreeMap::new();
        for child in children {
            if let Some(id) = child.child_id() {
                map.insert(id.to_string(), child.clone());
            }
        }
        self.def = self
            .default_id
            .as_deref()
            .and_then(|id| map.get(id).cloned());
        self.err = self.error_id.as_deref().and_then(|id| map.get(id).cloned());
        self.map = Some(map);
    }

    /// Index keys in sorted order. Empty for sub-algorithm mappers.
    pub fn keys(&self) -> Vec<&str> {
        match &self.map {
            Some(map) => map.keys().map(|k| k.as_str()).collect(),
            None => Vec::new(),
        }
    }

    pub fn default_ref(&self) -> Option<&C> {
        self.def.as_ref()
    }

    pub fn error_ref(&self) -> Option<&C> {
        self.err.as_ref()
    }

    fn find<'a>(&'a self, children: &'a [C], key: &str) -> Option<&'a C> {
        match &self.map {
            Some(map) => map.get(key),
            None => children.iter().find(|c| c.child_id() == Some(key)),
        }
    }

    fn on_default(&self, ctx: &Context) -> Response {
        match &self.def {
            Some(def) => def.evaluate(ctx),
            None => Response::not_applicable(),
        }
    }

    fn on_error(&self, ctx: &Context, err: EvaluationError) -> Response {
        match &self.err {
            Some(child) => child.evaluate(ctx),
            None => Response::indeterminate(err),
        }
    }

    fn execute(&self, children: &[C], ctx: &Context) -> Response {
        let key = match self.argument.calculate(ctx) {
            Ok(v) => v,
            Err(err) => return self.on_error(ctx, err),
        };

        if let Some(sub) = &self.sub {
            let keys = match string_keys(&key) {
                Ok(keys) => keys,
                Err(err) => return self.on_error(ctx, err),
            };
            let selected: Vec<C> = keys
                .iter()
                .filter_map(|k| self.find(children, k).cloned())
                .collect();
            if selected.is_empty() {
                return self.on_default(ctx);
            }
            return sub.execute(&selected, ctx);
        }

        let key = match key.string() {
            Ok(s) => s.to_string(),
            Err(err) => return self.on_error(ctx, err),
        };
        match self.find(children, &key) {
            Some(child) => {
                let r = child.evaluate(ctx);
                if r.effect.is_indeterminate() {
                    if let Some(err_child) = &self.err {
                        return err_child.evaluate(ctx);
                    }
                }
                r
            }
            None => self.on_default(ctx),
        }
    }
}

/// Selection keys of a set- or list-valued argument, in value order.
fn string_keys(value: &Value) -> Result<Vec<String>, EvaluationError> {
    match value {
        Value::SetOfStrings(set) => Ok(set.iter().cloned().collect()),
        Value::ListOfStrings(list) => Ok(list.clone()),
        other => Err(EvaluationError::TypeMismatch {
            expected: Type::SetOfStrings,
            actual: other.type_of(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Target failure handling shared by Policy and PolicySet
// ---------------------------------------------------------------------------

/// Merges a target failure with the response the combining algorithm would
/// have produced, so the indeterminate projection reflects the effects that
/// were actually reachable. A not-applicable outcome stays not-applicable
/// and merely records the failure as its status.
pub(crate) fn combine_effect_and_status(err: EvaluationError, r: Response) -> Response {
    let status = match r.status {
        Some(prev) => EvaluationError::merged(vec![err, prev]),
        None => Some(err),
    };
    let effect = match r.effect {
        Effect::NotApplicable => Effect::NotApplicable,
        Effect::Permit | Effect::IndeterminateP => Effect::IndeterminateP,
        Effect::Deny | Effect::IndeterminateD => Effect::IndeterminateD,
        _ => Effect::IndeterminateDP,
    };
    Response::new(effect, status, Vec::new())
}
