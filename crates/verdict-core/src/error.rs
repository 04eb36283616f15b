use thiserror::Error;

use crate::value::Type;

/// Closed taxonomy of evaluation failures.
///
/// These never escape an evaluation as a panic or an `Err` return from
/// `calculate`: they travel in the response status field and are only
/// meaningful together with the decision effect.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    /// The referenced attribute is absent from the context, or the stored
    /// value has a different type than the designator expects.
    #[error("missing attribute {id:?} of type \"{ty}\"")]
    MissingAttribute { id: String, ty: Type },

    /// Operand types disagree with what the operation requires.
    #[error("expected {expected} value but got {actual}")]
    TypeMismatch { expected: Type, actual: Type },

    /// A builtin function failed on otherwise well-typed input.
    #[error("function {function:?} failed: {message}")]
    Function { function: String, message: String },

    /// Several failures collected by a combining algorithm.
    #[error("{}", display_list(.0))]
    Multiple(Vec<EvaluationError>),
}

fn display_list(errors: &[EvaluationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl EvaluationError {
    pub fn missing_attribute(id: impl Into<String>, ty: Type) -> Self {
        EvaluationError::MissingAttribute { id: id.into(), ty }
    }

    pub fn function(function: impl Into<String>, message: impl Into<String>) -> Self {
        EvaluationError::Function {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Collapse a batch of statuses into one: `None` for an empty batch,
    /// the error itself for a single entry, `Multiple` otherwise.
    pub fn merged(mut errors: Vec<EvaluationError>) -> Option<EvaluationError> {
        match errors.len() {
            0 => None,
            1 => Some(errors.remove(0)),
            _ => Some(EvaluationError::Multiple(errors)),
        }
    }
}

pub type EvaluationResult<T> = Result<T, EvaluationError>;
