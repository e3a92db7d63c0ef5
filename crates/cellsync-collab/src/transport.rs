use std::future::Future;

use crate::error::CollabError;
use crate::message::{Envelope, Message};

/// A channel to the other clients.
///
/// Implementations deliver every message, the sender's own included, in
/// one total order assigned by whoever numbers the envelopes. Delivery is
/// at least once; the session drops repeats.
pub trait Transport {
    fn send(&mut self, message: Message) -> Result<(), CollabError>;

    /// Next envelope if one is already waiting
    fn try_receive(&mut self) -> Result<Option<Envelope>, CollabError>;

    /// Wait for the next envelope
    fn receive(&mut self) -> impl Future<Output = Result<Envelope, CollabError>> + Send;
}
