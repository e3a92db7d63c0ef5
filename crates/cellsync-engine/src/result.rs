use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a command was refused before touching any state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CancelReason {
    InvalidSheetId,
    OutOfBounds,
    InvalidCount,
    InvalidSize,
    /// A delete would leave no rows or columns
    NotEnoughLines,
    DuplicateSheetName,
    InvalidSheetName,
    LastSheet,
    EmptyUndoStack,
    EmptyRedoStack,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CancelReason::InvalidSheetId => "unknown sheet",
            CancelReason::OutOfBounds => "outside the grid",
            CancelReason::InvalidCount => "count must be positive",
            CancelReason::InvalidSize => "size must be positive",
            CancelReason::NotEnoughLines => "cannot delete every row or column",
            CancelReason::DuplicateSheetName => "sheet name already used",
            CancelReason::InvalidSheetName => "invalid sheet name",
            CancelReason::LastSheet => "cannot delete the last sheet",
            CancelReason::EmptyUndoStack => "nothing to undo",
            CancelReason::EmptyRedoStack => "nothing to redo",
        };
        f.write_str(text)
    }
}

/// Outcome of validating or dispatching a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason")]
pub enum CommandResult {
    Success,
    Cancelled(CancelReason),
}

impl CommandResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandResult::Success)
    }

    pub fn reason(&self) -> Option<CancelReason> {
        match self {
            CommandResult::Success => None,
            CommandResult::Cancelled(reason) => Some(*reason),
        }
    }
}

impl From<Result<(), CancelReason>> for CommandResult {
    fn from(result: Result<(), CancelReason>) -> Self {
        match result {
            Ok(()) => CommandResult::Success,
            Err(reason) => CommandResult::Cancelled(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_string(&CommandResult::Cancelled(CancelReason::LastSheet)).unwrap();
        assert_eq!(json, r#"{"status":"Cancelled","reason":"LastSheet"}"#);
        let json = serde_json::to_string(&CommandResult::Success).unwrap();
        assert_eq!(json, r#"{"status":"Success"}"#);
    }
}
