//! Core vocabulary for the verdict policy decision engine.
//!
//! This crate holds the pieces every other layer speaks in:
//! - typed attribute values with per-type equality and containment
//! - attributes and the immutable request [`Context`]
//! - the closed evaluation-error taxonomy carried inside responses
//!
//! Evaluation errors here are data, not control flow: the engine stores
//! them in a response status field instead of unwinding.

pub mod attribute;
pub mod context;
pub mod error;
pub mod value;

pub use attribute::*;
pub use context::*;
pub use error::*;
pub use value::*;
