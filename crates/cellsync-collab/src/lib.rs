//! Collaboration for cellsync documents.
//!
//! Clients exchange commands through a [`Transport`] that puts every
//! message in one total order. Each [`CollabSession`] applies its own
//! commands right away and reconciles with that order as it arrives, so
//! all clients end up with the same document. Cursor positions travel
//! alongside as presence messages.

pub mod broker;
pub mod config;
pub mod error;
pub mod message;
pub mod presence;
pub mod session;
pub mod transport;

pub use broker::{BrokerConnection, LocalBroker};
pub use config::CollabConfig;
pub use error::CollabError;
pub use message::{Envelope, Message, Seq};
pub use presence::{ClientPresence, Debouncer, PresenceTable};
pub use session::{Checkpoint, CollabSession, Event, PendingCommand, PendingState, RemoteOutcome};
pub use transport::Transport;
