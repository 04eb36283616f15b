//! Verdict Policy Decision Core
//!
//! Attribute-based authorization engine: a request arrives as a bag of
//! typed attributes, a hierarchical policy tree is traversed, and out comes
//! a decision (Permit, Deny, NotApplicable or Indeterminate) together with
//! its obligations.
//!
//! Key properties:
//! - Algebraic evaluation semantics: errors are response status data, never
//!   unwinding; the refined Indeterminate{D,P,DP} forms carry the effects a
//!   failed subtree could have produced
//! - Four combining algorithms in rule and policy flavors: deny-overrides,
//!   permit-overrides, first-applicable and the key-selecting mapper
//! - Copy-on-write mutation: `append`/`delete` return a fresh tree sharing
//!   untouched subtrees, with ordinals and mapper indexes kept consistent
//! - Shared-immutable concurrency: readers evaluate lock-free against one
//!   tree version while writers swap the root atomically
//! - Depth-bounded introspection with stable field order and id-path lookup

pub mod combine;
pub mod error;
pub mod expr;
pub mod node;
pub mod obligation;
pub mod policy;
pub mod policy_set;
pub mod response;
pub mod rule;
pub mod storage;
pub mod target;

pub use combine::{
    Combiner, CombinerChild, CombinerKind, Mapper, MapperParams, PolicyCombiner, RuleCombiner,
};
pub use error::{PolicyError, PolicyResult};
pub use expr::{AttributeDesignator, ContentSelector, Expression, Function, FunctionCall};
pub use node::{sort_by_order, Evaluable, NodePath};
pub use obligation::Obligation;
pub use policy::Policy;
pub use policy_set::PolicySet;
pub use response::{Effect, Response};
pub use rule::Rule;
pub use storage::PolicyStorage;
pub use target::{AllOf, AnyOf, Match, MatchResult, Target};
