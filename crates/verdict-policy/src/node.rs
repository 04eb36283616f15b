use std::fmt;
use std::io::Write;
use std::sync::Arc;

use verdict_core::Context;

use crate::error::{PolicyError, PolicyResult};
use crate::policy::Policy;
use crate::policy_set::PolicySet;
use crate::response::Response;
use crate::rule::Rule;

// ---------------------------------------------------------------------------
// Evaluable — the polymorphic tree handle
// ---------------------------------------------------------------------------

/// A node of the policy tree: rule, policy or policy set behind shared
/// ownership. Cloning a handle is cheap; mutation methods return fresh
/// handles whose untouched subtrees alias the old ones.
#[derive(Debug, Clone)]
pub enum Evaluable {
    Rule(Arc<Rule>),
    Policy(Arc<Policy>),
    PolicySet(Arc<PolicySet>),
}

impl From<Rule> for Evaluable {
    fn from(rule: Rule) -> Self {
        Evaluable::Rule(Arc::new(rule))
    }
}

impl From<Policy> for Evaluable {
    fn from(policy: Policy) -> Self {
        Evaluable::Policy(Arc::new(policy))
    }
}

impl From<PolicySet> for Evaluable {
    fn from(set: PolicySet) -> Self {
        Evaluable::PolicySet(Arc::new(set))
    }
}

impl Evaluable {
    pub fn calculate(&self, ctx: &Context) -> Response {
        match self {
            Evaluable::Rule(r) => r.calculate(ctx),
            Evaluable::Policy(p) => p.calculate(ctx),
            Evaluable::PolicySet(s) => s.calculate(ctx),
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Evaluable::Rule(r) => r.id(),
            Evaluable::Policy(p) => p.id(),
            Evaluable::PolicySet(s) => s.id(),
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.id().is_none()
    }

    pub fn order(&self) -> usize {
        match self {
            Evaluable::Rule(r) => r.order(),
            Evaluable::Policy(p) => p.order(),
            Evaluable::PolicySet(s) => s.order(),
        }
    }

    pub(crate) fn with_order(&self, ord: usize) -> Evaluable {
        match self {
            Evaluable::Rule(r) => Evaluable::Rule(Arc::new(r.as_ref().clone().with_order(ord))),
            Evaluable::Policy(p) => {
                Evaluable::Policy(Arc::new(p.as_ref().clone().with_order(ord)))
            }
            Evaluable::PolicySet(s) => {
                Evaluable::PolicySet(Arc::new(s.as_ref().clone().with_order(ord)))
            }
        }
    }

    /// Whether two handles point at the very same node instance.
    pub fn ptr_eq(&self, other: &Evaluable) -> bool {
        match (self, other) {
            (Evaluable::Rule(a), Evaluable::Rule(b)) => Arc::ptr_eq(a, b),
            (Evaluable::Policy(a), Evaluable::Policy(b)) => Arc::ptr_eq(a, b),
            (Evaluable::PolicySet(a), Evaluable::PolicySet(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// The visible child with the given id, if any. Rules have none.
    pub fn child(&self, id: &str) -> Option<Evaluable> {
        match self {
            Evaluable::Rule(_) => None,
            Evaluable::Policy(p) => p
                .rules()
                .iter()
                .find(|r| r.id() == Some(id))
                .map(|r| Evaluable::Rule(r.clone())),
            Evaluable::PolicySet(s) => s
                .policies()
                .iter()
                .find(|c| c.id() == Some(id))
                .cloned(),
        }
    }

    /// Copy-on-write insert-or-replace; see [`Policy::append`] and
    /// [`PolicySet::append`] for the per-kind contract.
    pub fn append(&self, path: &[&str], child: &Evaluable) -> PolicyResult<Evaluable> {
        match self {
            Evaluable::Rule(_) => Err(PolicyError::Validation(
                "a rule has no children to append to".into(),
            )),
            Evaluable::Policy(p) => p.append(path, child).map(Evaluable::from),
            Evaluable::PolicySet(s) => s.append(path, child).map(Evaluable::from),
        }
    }

    /// Copy-on-write removal; see [`Policy::delete`] and
    /// [`PolicySet::delete`] for the per-kind contract.
    pub fn delete(&self, path: &[&str]) -> PolicyResult<Evaluable> {
        match self {
            Evaluable::Rule(_) => Err(PolicyError::Validation(
                "a rule has no children to delete from".into(),
            )),
            Evaluable::Policy(p) => p.delete(path).map(Evaluable::from),
            Evaluable::PolicySet(s) => s.delete(path).map(Evaluable::from),
        }
    }

    pub(crate) fn marshal_value(&self, depth: usize) -> serde_json::Value {
        match self {
            Evaluable::Rule(r) => r.marshal_value(),
            Evaluable::Policy(p) => p.marshal_value(depth),
            Evaluable::PolicySet(s) => s.marshal_value(depth),
        }
    }

    /// Writes the canonical JSON form down to `depth` levels of children.
    pub fn marshal_with_depth(&self, w: &mut dyn Write, depth: i64) -> PolicyResult<()> {
        write_marshalled(w, depth, |d| self.marshal_value(d))
    }

    pub(crate) fn path_to(&self, id: &str) -> Option<Vec<String>> {
        match self {
            Evaluable::Rule(r) => r.path_to(id),
            Evaluable::Policy(p) => p.path_to(id),
            Evaluable::PolicySet(s) => s.path_to(id),
        }
    }

    /// The quoted, slash-joined path from this node to the named
    /// descendant, as a deferred write. `None` when this node is hidden or
    /// no visible descendant carries the id.
    pub fn marshal_path(&self, id: &str) -> Option<NodePath> {
        self.path_to(id).map(NodePath::new)
    }
}

/// Restores document order over a mixed slice of nodes. Ordinals may be
/// non-contiguous after deletions; only their relative order matters.
pub fn sort_by_order(nodes: &mut [Evaluable]) {
    nodes.sort_by_key(|n| n.order());
}

// ---------------------------------------------------------------------------
// NodePath — deferred id-path writer
// ---------------------------------------------------------------------------

/// Path of node ids from a root to one of its descendants. Displays as the
/// quoted segments joined by `/`, e.g. `"test"/"first"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePath(Vec<String>);

impl NodePath {
    pub(crate) fn new(segments: Vec<String>) -> Self {
        NodePath(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn write_to(&self, w: &mut dyn Write) -> std::io::Result<()> {
        write!(w, "{}", self)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{:?}", segment)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Shared marshal plumbing
// ---------------------------------------------------------------------------

/// Depth-checks, builds and writes one node's canonical JSON form.
pub(crate) fn write_marshalled(
    w: &mut dyn Write,
    depth: i64,
    build: impl FnOnce(usize) -> serde_json::Value,
) -> PolicyResult<()> {
    if depth < 0 {
        return Err(PolicyError::InvalidDepth(depth));
    }
    let value = build(depth as usize);
    serde_json::to_writer(w, &value).map_err(|e| PolicyError::Marshal(e.to_string()))
}
