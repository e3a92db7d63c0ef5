use thiserror::Error;

use cellsync_engine::EngineError;

/// Collaboration error type
#[derive(Error, Debug)]
pub enum CollabError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Transport closed")]
    Closed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
