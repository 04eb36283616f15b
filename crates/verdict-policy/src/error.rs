use thiserror::Error;

/// Errors raised by tree construction, mutation and introspection.
///
/// Unlike [`verdict_core::EvaluationError`], these do escape to the caller:
/// a rejected mutation or a bad introspection request is the caller's
/// problem, not a decision outcome. Transports map `PathNotFound` to 404
/// and the rest to client/server errors as appropriate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("missing policy set child {0:?}")]
    MissingPolicySetChild(String),

    #[error("missing policy child {0:?}")]
    MissingPolicyChild(String),

    #[error("policy sets can contain only policies and policy sets")]
    InvalidPolicySetItemType,

    #[error("policies can contain only rules")]
    InvalidPolicyItemType,

    #[error("cannot modify hidden policy set")]
    HiddenPolicySetModification,

    #[error("cannot modify hidden policy")]
    HiddenPolicyModification,

    #[error("cannot append hidden policy or policy set")]
    HiddenPolicyAppend,

    #[error("cannot append hidden rule")]
    HiddenRuleAppend,

    #[error("path is too short to delete an item")]
    TooShortPath,

    #[error("expecting depth of zero or more but got {0}")]
    InvalidDepth(i64),

    #[error("path {0:?} not found")]
    PathNotFound(String),

    #[error("unknown function {0:?}")]
    UnknownFunction(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("marshalling failed: {0}")]
    Marshal(String),
}

pub type PolicyResult<T> = Result<T, PolicyError>;
