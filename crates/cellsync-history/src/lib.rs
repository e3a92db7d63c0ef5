pub mod change;
pub mod command;
pub mod revision;

pub use change::{apply_all, rebase_changes, Change, ChangeError, StructuralEffect};
pub use command::Command;
pub use revision::{Revision, RevisionId, RevisionKind, RevisionLog};
