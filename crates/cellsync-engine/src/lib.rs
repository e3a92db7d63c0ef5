//! Spreadsheet engine: validates and applies commands, keeps formulas,
//! dependency graph and values consistent, and records revisions.

mod api;
pub mod config;
pub mod document;
pub mod error;
pub mod result;
pub mod view;

pub use api::{SpreadsheetEngine, Update};
pub use config::EngineConfig;
pub use document::{DocumentState, Journal};
pub use error::EngineError;
pub use result::{CancelReason, CommandResult};
pub use view::ViewState;
