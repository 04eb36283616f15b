use std::fmt;

use serde::{Deserialize, Serialize};
use verdict_core::{AttributeValue, EvaluationError};

// ---------------------------------------------------------------------------
// Effect — the decision outcome lattice
// ---------------------------------------------------------------------------

/// Decision outcome. The three refined indeterminate forms carry the set of
/// effects that could have been produced had evaluation succeeded; they are
/// only meaningful inside combining algorithms and collapse to plain
/// `Indeterminate` at the user-facing boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    Permit,
    Deny,
    NotApplicable,
    Indeterminate,
    IndeterminateD,
    IndeterminateP,
    IndeterminateDP,
}

impl Effect {
    pub fn is_indeterminate(self) -> bool {
        matches!(
            self,
            Effect::Indeterminate
                | Effect::IndeterminateD
                | Effect::IndeterminateP
                | Effect::IndeterminateDP
        )
    }

    /// Folds the refined indeterminate forms into plain `Indeterminate`.
    /// Transports call this before putting an effect on the wire.
    pub fn collapsed(self) -> Effect {
        if self.is_indeterminate() {
            Effect::Indeterminate
        } else {
            self
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Effect::Permit => "Permit",
            Effect::Deny => "Deny",
            Effect::NotApplicable => "NotApplicable",
            Effect::Indeterminate => "Indeterminate",
            Effect::IndeterminateD => "Indeterminate{D}",
            Effect::IndeterminateP => "Indeterminate{P}",
            Effect::IndeterminateDP => "Indeterminate{DP}",
        };
        write!(f, "{}", name)
    }
}

// ---------------------------------------------------------------------------
// Response — effect, status and collected obligations
// ---------------------------------------------------------------------------

/// Outcome of evaluating a node for one request. The status is data, not an
/// error return: it qualifies the effect (an indeterminate effect says what
/// went wrong; a not-applicable effect may record why nothing fired).
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub effect: Effect,
    pub status: Option<EvaluationError>,
    pub obligations: Vec<AttributeValue>,
}

impl Response {
    pub fn new(
        effect: Effect,
        status: Option<EvaluationError>,
        obligations: Vec<AttributeValue>,
    ) -> Self {
        Response {
            effect,
            status,
            obligations,
        }
    }

    pub fn not_applicable() -> Self {
        Response::new(Effect::NotApplicable, None, Vec::new())
    }

    pub fn indeterminate(status: EvaluationError) -> Self {
        Response::new(Effect::Indeterminate, Some(status), Vec::new())
    }

    /// The user-facing form: refined indeterminates collapsed.
    pub fn collapsed(mut self) -> Self {
        self.effect = self.effect.collapsed();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdict_core::Type;

    #[test]
    fn test_indeterminate_family() {
        assert!(Effect::Indeterminate.is_indeterminate());
        assert!(Effect::IndeterminateD.is_indeterminate());
        assert!(Effect::IndeterminateP.is_indeterminate());
        assert!(Effect::IndeterminateDP.is_indeterminate());
        assert!(!Effect::Permit.is_indeterminate());
        assert!(!Effect::NotApplicable.is_indeterminate());
    }

    #[test]
    fn test_collapsed_folds_refined_forms_only() {
        assert_eq!(Effect::IndeterminateDP.collapsed(), Effect::Indeterminate);
        assert_eq!(Effect::IndeterminateP.collapsed(), Effect::Indeterminate);
        assert_eq!(Effect::Deny.collapsed(), Effect::Deny);
    }

    #[test]
    fn test_effect_display_names() {
        assert_eq!(Effect::NotApplicable.to_string(), "NotApplicable");
        assert_eq!(Effect::IndeterminateDP.to_string(), "Indeterminate{DP}");
    }

    #[test]
    fn test_collapsed_response_keeps_status() {
        let r = Response::new(
            Effect::IndeterminateD,
            Some(EvaluationError::missing_attribute("x", Type::String)),
            Vec::new(),
        )
        .collapsed();
        assert_eq!(r.effect, Effect::Indeterminate);
        assert!(r.status.is_some());
    }
}
