use cellsync_core::{PolicyError, WorkbookError};
use cellsync_history::ChangeError;
use thiserror::Error;

/// Engine failures. Commands rejected during validation are not errors;
/// they come back as [`crate::CommandResult::Cancelled`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid number policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("failed to apply change: {0}")]
    Change(#[from] ChangeError),

    #[error("workbook error: {0}")]
    Workbook(#[from] WorkbookError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
