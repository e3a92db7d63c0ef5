use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::sheet::SheetId;

/// Error values a formula cell can evaluate to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellError {
    /// #BAD_EXPR - Formula could not be parsed or compiled
    BadExpression,
    /// #CYCLE - Formula takes part in a dependency cycle
    CyclicReference,
    /// #REF! - Reference outside the grid or into deleted rows/columns
    InvalidReference,
    /// #DIV/0! - Division by zero
    DivisionByZero,
    /// #VALUE! - Invalid value type
    InvalidValue,
    /// #NUM! - Invalid numeric value
    NumError,
    /// #ERROR - A referenced cell holds an error
    Propagated,
}

/// Coarse error taxonomy used when reporting failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    BadExpression,
    CyclicReference,
    RefError,
    RuntimeError,
}

impl CellError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CellError::BadExpression => ErrorKind::BadExpression,
            CellError::CyclicReference => ErrorKind::CyclicReference,
            CellError::InvalidReference => ErrorKind::RefError,
            CellError::DivisionByZero
            | CellError::InvalidValue
            | CellError::NumError
            | CellError::Propagated => ErrorKind::RuntimeError,
        }
    }

    /// Parse an error literal such as `#REF!`
    pub fn from_code(code: &str) -> Option<CellError> {
        let error = match code.to_ascii_uppercase().as_str() {
            "#BAD_EXPR" => CellError::BadExpression,
            "#CYCLE" => CellError::CyclicReference,
            "#REF!" => CellError::InvalidReference,
            "#DIV/0!" => CellError::DivisionByZero,
            "#VALUE!" => CellError::InvalidValue,
            "#NUM!" => CellError::NumError,
            "#ERROR" => CellError::Propagated,
            _ => return None,
        };
        Some(error)
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellError::BadExpression => write!(f, "#BAD_EXPR"),
            CellError::CyclicReference => write!(f, "#CYCLE"),
            CellError::InvalidReference => write!(f, "#REF!"),
            CellError::DivisionByZero => write!(f, "#DIV/0!"),
            CellError::InvalidValue => write!(f, "#VALUE!"),
            CellError::NumError => write!(f, "#NUM!"),
            CellError::Propagated => write!(f, "#ERROR"),
        }
    }
}

/// Failures of workbook-level operations
#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("sheet not found: {0}")]
    SheetNotFound(SheetId),

    #[error("a sheet named '{0}' already exists")]
    SheetNameExists(String),

    #[error("invalid sheet name: '{0}'")]
    InvalidSheetName(String),

    #[error("cannot delete the last sheet")]
    CannotDeleteLastSheet,

    #[error("workbook has no sheets")]
    NoSheets,

    #[error("invalid cell address: {0}")]
    InvalidAddress(String),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}
