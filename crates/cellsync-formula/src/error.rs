use cellsync_core::CellError;
use thiserror::Error;

/// Failure to turn formula text into a compiled formula.
///
/// Every variant is stored in the cell as [`CellError::BadExpression`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("bad expression at {position}: {message}")]
    BadExpression { message: String, position: usize },

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("{name} expects {expected} arguments, got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },
}

impl FormulaError {
    pub fn bad(message: impl Into<String>, position: usize) -> Self {
        FormulaError::BadExpression {
            message: message.into(),
            position,
        }
    }

    pub fn cell_error(&self) -> CellError {
        CellError::BadExpression
    }
}
