//! Error types for the projection engine
//!
//! Every failure is scoped to a single computation request and returned as a
//! value. Errors carry enough context (component id, month, formula text) for
//! the caller to render an actionable message.

use thiserror::Error;

use crate::calendar::YearMonth;

/// Failures of the fixed-point value type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("numeric overflow")]
    Overflow,

    #[error("invalid decimal '{input}'")]
    Parse { input: String },

    #[error("invalid calendar month '{input}' (expected YYYY-MM)")]
    InvalidMonth { input: String },

    #[error("{0}")]
    Domain(String),
}

/// Failures raised by the formula sandbox
///
/// `position` is a byte offset into `formula` when the failing construct can
/// be located.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("syntax error{}: {hint} (formula: `{formula}`)", at(.position))]
    Syntax {
        formula: String,
        position: Option<usize>,
        hint: String,
    },

    #[error("disallowed construct{}: {hint} (formula: `{formula}`)", at(.position))]
    SecurityViolation {
        formula: String,
        position: Option<usize>,
        hint: String,
    },

    #[error("evaluation failed{}: {hint} (formula: `{formula}`)", at(.position))]
    Runtime {
        formula: String,
        position: Option<usize>,
        hint: String,
    },

    #[error("evaluation exceeded the budget of {budget} steps (formula: `{formula}`)")]
    Timeout { formula: String, budget: u64 },
}

fn at(position: &Option<usize>) -> String {
    match position {
        Some(pos) => format!(" at offset {}", pos),
        None => String::new(),
    }
}

impl FormulaError {
    pub(crate) fn syntax(formula: &str, position: Option<usize>, hint: impl Into<String>) -> Self {
        FormulaError::Syntax {
            formula: formula.to_string(),
            position,
            hint: hint.into(),
        }
    }

    pub(crate) fn security(formula: &str, position: Option<usize>, hint: impl Into<String>) -> Self {
        FormulaError::SecurityViolation {
            formula: formula.to_string(),
            position,
            hint: hint.into(),
        }
    }

    pub(crate) fn runtime(formula: &str, position: Option<usize>, hint: impl Into<String>) -> Self {
        FormulaError::Runtime {
            formula: formula.to_string(),
            position,
            hint: hint.into(),
        }
    }

    /// The formula text the error refers to
    pub fn formula(&self) -> &str {
        match self {
            FormulaError::Syntax { formula, .. }
            | FormulaError::SecurityViolation { formula, .. }
            | FormulaError::Runtime { formula, .. }
            | FormulaError::Timeout { formula, .. } => formula,
        }
    }

    /// Byte offset of the offending construct, if known
    pub fn position(&self) -> Option<usize> {
        match self {
            FormulaError::Syntax { position, .. }
            | FormulaError::SecurityViolation { position, .. }
            | FormulaError::Runtime { position, .. } => *position,
            FormulaError::Timeout { .. } => None,
        }
    }

    /// Human-readable hint without the formula echo
    pub fn hint(&self) -> String {
        match self {
            FormulaError::Syntax { hint, .. }
            | FormulaError::SecurityViolation { hint, .. }
            | FormulaError::Runtime { hint, .. } => hint.clone(),
            FormulaError::Timeout { budget, .. } => {
                format!("formula did not finish within {} evaluation steps", budget)
            }
        }
    }

    /// Whether this error should have been caught when the formula was saved
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            FormulaError::Syntax { .. } | FormulaError::SecurityViolation { .. }
        )
    }
}

/// Failures of a scenario computation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Save-time validation of a component formula failed
    #[error("formula for component '{component_id}' is invalid: {source}")]
    Formula {
        component_id: String,
        #[source]
        source: FormulaError,
    },

    #[error("component '{component_id}' failed to evaluate for {month}: {cause}")]
    ComponentEvaluation {
        component_id: String,
        month: YearMonth,
        #[source]
        cause: FormulaError,
    },

    #[error("aggregation failed: {reason}")]
    Aggregation {
        reason: String,
        #[source]
        source: Option<Box<EngineError>>,
    },

    #[error("invalid scenario definition: {0}")]
    InvalidScenarioDefinition(String),

    #[error("projection was cancelled")]
    Cancelled,
}

impl EngineError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        EngineError::InvalidScenarioDefinition(message.into())
    }

    /// Id of the component the failure is attributed to, looking through
    /// aggregation wrappers
    pub fn component_id(&self) -> Option<&str> {
        match self {
            EngineError::Formula { component_id, .. }
            | EngineError::ComponentEvaluation { component_id, .. } => Some(component_id),
            EngineError::Aggregation {
                source: Some(inner),
                ..
            } => inner.component_id(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_error_display_includes_position_and_hint() {
        let err = FormulaError::security("a.b", Some(1), "attribute access is not permitted");
        let text = err.to_string();
        assert!(text.contains("offset 1"));
        assert!(text.contains("attribute access"));
        assert!(text.contains("`a.b`"));
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_component_id_looks_through_aggregation() {
        let month: YearMonth = "2025-03".parse().unwrap();
        let inner = EngineError::ComponentEvaluation {
            component_id: "salary".to_string(),
            month,
            cause: FormulaError::runtime("x / 0", Some(2), "division by zero"),
        };
        let outer = EngineError::Aggregation {
            reason: "component failed".to_string(),
            source: Some(Box::new(inner)),
        };
        assert_eq!(outer.component_id(), Some("salary"));
        assert_eq!(EngineError::Cancelled.component_id(), None);
    }
}
