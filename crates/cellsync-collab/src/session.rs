//! One client's side of the collaboration protocol.
//!
//! The session is a reducer over the broker's ordered log. Local commands
//! are applied at once and sent; when the log places a remote command
//! before them, every unconfirmed local command is rolled back, the remote
//! command is applied, and the local ones are applied again on top:
//!
//! ```text
//! Pending -> Confirmed
//! Pending -> Superseded { by } -> Reapplied -> Confirmed
//! ```
//!
//! Applying the same log in the same order gives every client the same
//! document.
//!
//! Remote commands are rewritten for the structural edits their sender had
//! not seen. Those edits are kept until every known peer has moved past
//! them and they fall out of the `retained_messages` window; a client has
//! to `join` before its base counts.

use std::collections::{BTreeMap, HashSet, VecDeque};

use cellsync_core::{ClientId, Position, WorkbookSnapshot};
use cellsync_engine::{CancelReason, CommandResult, SpreadsheetEngine};
use cellsync_history::{Command, StructuralEffect};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::CollabConfig;
use crate::error::CollabError;
use crate::message::{Envelope, Message, Seq};
use crate::presence::{follow, ClientPresence, Debouncer, PresenceTable};
use crate::transport::Transport;

/// Where an unconfirmed local command stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    /// Applied locally, not yet placed in the order
    Pending,
    /// Rolled back because the command at `by` was ordered first
    Superseded { by: Seq },
    /// Applied again on top of the commands ordered before it
    Reapplied,
    /// No longer valid where the order placed it; peers refuse it too
    Rejected(CancelReason),
    /// Its target was deleted by a command ordered before it
    Dropped,
    /// Its changes no longer apply; peers leave the document untouched too
    Failed,
    Confirmed { seq: Seq },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    pub message_id: Uuid,
    /// The command as currently applied, rewritten for earlier commands
    pub command: Command,
    pub state: PendingState,
    base_revision: Seq,
    applied: bool,
    effects: Vec<StructuralEffect>,
}

/// What a remote command did here
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    Applied,
    Cancelled(CancelReason),
    /// Aimed at rows, columns or a sheet deleted before it
    Dropped,
    /// The change could not be applied; the document is untouched
    Failed,
}

/// Something a processed envelope or timer did
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Confirmed(PendingCommand),
    Remote {
        seq: Seq,
        client: ClientId,
        outcome: RemoteOutcome,
    },
    Presence(ClientId),
    Joined(ClientId),
    Left(ClientId),
    /// Not heard from within the presence timeout
    Expired(ClientId),
    Duplicate(Seq),
}

/// Structural effects of the command at `seq`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Reshape {
    seq: Seq,
    client: ClientId,
    effects: Vec<StructuralEffect>,
}

/// What a late joiner starts from: the document without unconfirmed local
/// commands, the sequence number it corresponds to, and the structural
/// edits that commands ordered after it may not have seen yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub snapshot: WorkbookSnapshot,
    pub seq: Seq,
    reshapes: Vec<Reshape>,
    /// Oldest base each client may still send commands from
    bases: BTreeMap<ClientId, Seq>,
}

pub struct CollabSession<T> {
    engine: SpreadsheetEngine,
    transport: T,
    config: CollabConfig,
    name: String,
    /// Last envelope applied
    seq: Seq,
    pending: VecDeque<PendingCommand>,
    /// Command ids of the retained messages, oldest first
    seen: VecDeque<(Seq, Uuid)>,
    seen_ids: HashSet<Uuid>,
    reshapes: VecDeque<Reshape>,
    /// Newest base each peer has sent a message from
    bases: BTreeMap<ClientId, Seq>,
    peers: PresenceTable,
    outgoing: Debouncer<Position>,
    /// Position peers were last told about
    announced: Option<Position>,
    last_presence: Instant,
}

impl<T: Transport> CollabSession<T> {
    pub fn new(engine: SpreadsheetEngine, transport: T, name: impl Into<String>, config: CollabConfig) -> Self {
        Self::start(engine, transport, name.into(), config, 0, VecDeque::new(), BTreeMap::new())
    }

    /// Start from a checkpoint's document, which `engine` must hold.
    /// `transport` should deliver everything after `checkpoint.seq`.
    pub fn resume(
        engine: SpreadsheetEngine,
        transport: T,
        name: impl Into<String>,
        config: CollabConfig,
        checkpoint: Checkpoint,
    ) -> Self {
        let Checkpoint {
            seq, reshapes, bases, ..
        } = checkpoint;
        Self::start(engine, transport, name.into(), config, seq, reshapes.into(), bases)
    }

    fn start(
        engine: SpreadsheetEngine,
        transport: T,
        name: String,
        config: CollabConfig,
        seq: Seq,
        reshapes: VecDeque<Reshape>,
        mut bases: BTreeMap<ClientId, Seq>,
    ) -> Self {
        bases.remove(engine.client());
        let debounce = config.debounce;
        Self {
            engine,
            transport,
            config,
            name,
            seq,
            pending: VecDeque::new(),
            seen: VecDeque::new(),
            seen_ids: HashSet::new(),
            reshapes,
            bases,
            peers: PresenceTable::new(),
            outgoing: Debouncer::new(debounce),
            announced: None,
            last_presence: Instant::now(),
        }
    }

    pub fn client(&self) -> &ClientId {
        self.engine.client()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn engine(&self) -> &SpreadsheetEngine {
        &self.engine
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Last sequence number applied
    pub fn seq(&self) -> Seq {
        self.seq
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingCommand> {
        self.pending.iter()
    }

    pub fn peer(&self, client: &ClientId) -> Option<ClientPresence> {
        self.peers.get(client)
    }

    /// Everyone connected, this client included, ordered by client id
    pub fn connected_clients(&self) -> Vec<ClientPresence> {
        let mut clients: Vec<ClientPresence> = self.peers.peers().collect();
        clients.push(ClientPresence {
            client: self.client().clone(),
            name: self.name.clone(),
            position: Some(self.engine.position().clone()),
        });
        clients.sort_by(|a, b| a.client.cmp(&b.client));
        clients
    }

    /// Announce this client to the others
    pub fn join(&mut self) -> Result<(), CollabError> {
        info!(client = %self.client(), name = %self.name, seq = self.seq, "joining");
        self.transport.send(Message::Join {
            client: self.client().clone(),
            name: self.name.clone(),
        })?;
        self.announce()
    }

    pub fn leave(&mut self) -> Result<(), CollabError> {
        info!(client = %self.client(), "leaving");
        self.outgoing.cancel();
        self.transport.send(Message::Leave {
            client: self.client().clone(),
        })
    }

    /// Apply a command locally and, if it changes the document, send it.
    /// Refused commands change nothing and are never sent.
    pub fn dispatch(&mut self, command: Command) -> Result<CommandResult, CollabError> {
        if command.is_local() {
            let result = self.engine.dispatch(command)?;
            if result.is_success() {
                self.queue_presence();
            }
            return Ok(result);
        }

        let cursor = self.engine.position().clone();
        let result = self.engine.dispatch(command.clone())?;
        if !result.is_success() {
            return Ok(result);
        }

        let message_id = Uuid::new_v4();
        let sent = self.transport.send(Message::Command {
            message_id,
            client: self.client().clone(),
            base_revision: self.seq,
            command: command.clone(),
        });
        if let Err(error) = sent {
            self.engine.revert_last()?;
            return Err(error);
        }

        debug!(%message_id, command = command.name(), base = self.seq, "command sent");
        self.pending.push_back(PendingCommand {
            message_id,
            command,
            state: PendingState::Pending,
            base_revision: self.seq,
            applied: true,
            effects: last_effects(&self.engine),
        });
        // Structural edits move the cursor too
        if self.engine.position() != &cursor {
            self.queue_presence();
        }
        Ok(result)
    }

    /// Everything a late joiner needs to start at the current sequence
    /// number, see [`CollabSession::resume`]
    pub fn checkpoint(&mut self) -> Result<Checkpoint, CollabError> {
        self.rollback()?;
        let snapshot = self.engine.to_snapshot();
        self.replay(&[]);

        // Own unconfirmed commands still travel with their old bases
        let own = self.pending.iter().map(|p| p.base_revision).fold(self.seq, Seq::min);
        let mut bases = self.bases.clone();
        bases.insert(self.client().clone(), own);
        Ok(Checkpoint {
            snapshot,
            seq: self.seq,
            reshapes: self.reshapes.iter().cloned().collect(),
            bases,
        })
    }

    /// Process every envelope already waiting, then the timers
    pub fn sync(&mut self) -> Result<Vec<Event>, CollabError> {
        let mut events = Vec::new();
        while let Some(envelope) = self.transport.try_receive()? {
            events.extend(self.receive(envelope)?);
        }
        events.extend(self.tick(Instant::now())?);
        Ok(events)
    }

    /// Wait for the next envelope or timer and process it
    pub async fn step(&mut self) -> Result<Vec<Event>, CollabError> {
        let deadline = self.next_deadline();
        let envelope = tokio::select! {
            envelope = self.transport.receive() => Some(envelope?),
            _ = sleep_until(deadline) => None,
        };

        let mut events = Vec::new();
        if let Some(envelope) = envelope {
            events.extend(self.receive(envelope)?);
        }
        events.extend(self.tick(Instant::now())?);
        Ok(events)
    }

    /// Apply one envelope from the transport
    pub fn receive(&mut self, envelope: Envelope) -> Result<Option<Event>, CollabError> {
        let Envelope { seq, message } = envelope;
        if seq <= self.seq {
            debug!(seq, current = self.seq, "already applied");
            return Ok(Some(Event::Duplicate(seq)));
        }
        if seq > self.seq + 1 {
            warn!(expected = self.seq + 1, seq, "gap in message order");
        }
        self.seq = seq;
        if message.client() != self.client() {
            self.peers.touch(message.client(), Instant::now());
        }
        match &message {
            Message::Command {
                client, base_revision, ..
            }
            | Message::Presence {
                client, base_revision, ..
            } if client != self.client() => {
                let base = self.bases.entry(client.clone()).or_insert(*base_revision);
                *base = (*base).max(*base_revision);
            }
            _ => {}
        }

        let event = match message {
            Message::Command {
                message_id,
                client,
                base_revision,
                command,
            } => Some(self.receive_command(seq, message_id, client, base_revision, command)?),
            Message::Presence {
                client,
                name,
                position,
                base_revision,
            } => {
                if &client == self.client() {
                    None
                } else {
                    let position = self.rebase_position(position, &client, base_revision);
                    self.peers.update(client.clone(), name, position, Instant::now());
                    Some(Event::Presence(client))
                }
            }
            Message::Join { client, name } => {
                // Everyone forgets history here so undo agrees with the
                // newcomer, who starts from a snapshot
                self.reset_history()?;
                if &client == self.client() {
                    None
                } else {
                    info!(client = %client, %name, "client joined");
                    self.peers.join(client.clone(), name, Instant::now());
                    self.announce()?;
                    Some(Event::Joined(client))
                }
            }
            Message::Leave { client } => {
                self.bases.remove(&client);
                if self.peers.leave(&client) {
                    info!(client = %client, "client left");
                    Some(Event::Left(client))
                } else {
                    None
                }
            }
        };
        self.prune();
        Ok(event)
    }

    /// Forget structural edits no command can still be based before, and
    /// command ids that fell out of the window
    fn prune(&mut self) {
        let window = self.seq.saturating_sub(self.config.retained_messages);
        let floor = self.bases.values().copied().fold(window, Seq::min);
        while self.reshapes.front().is_some_and(|reshape| reshape.seq <= floor) {
            self.reshapes.pop_front();
        }
        while let Some(&(seq, id)) = self.seen.front() {
            if seq > window {
                break;
            }
            self.seen.pop_front();
            self.seen_ids.remove(&id);
        }
    }

    /// Structural edits still kept for remote commands
    pub fn retained_reshapes(&self) -> usize {
        self.reshapes.len()
    }

    /// Send a due cursor update or keepalive and expire silent peers
    pub fn tick(&mut self, now: Instant) -> Result<Vec<Event>, CollabError> {
        let due = self.outgoing.take_due(now).is_some();
        if due || now >= self.last_presence + self.config.keepalive() {
            self.announce()?;
        }

        let expired = self.peers.prune(now, self.config.presence_timeout);
        Ok(expired
            .into_iter()
            .map(|client| {
                info!(client = %client, "client timed out");
                self.bases.remove(&client);
                Event::Expired(client)
            })
            .collect())
    }

    fn next_deadline(&self) -> Instant {
        let mut deadline = self.last_presence + self.config.keepalive();
        if let Some(due) = self.outgoing.deadline() {
            deadline = deadline.min(due);
        }
        if let Some(expiry) = self.peers.next_expiry(self.config.presence_timeout) {
            deadline = deadline.min(expiry);
        }
        deadline
    }

    fn receive_command(
        &mut self,
        seq: Seq,
        message_id: Uuid,
        client: ClientId,
        base_revision: Seq,
        command: Command,
    ) -> Result<Event, CollabError> {
        if !self.seen_ids.insert(message_id) {
            warn!(%message_id, seq, "duplicate command ignored");
            return Ok(Event::Duplicate(seq));
        }
        self.seen.push_back((seq, message_id));

        let ours = self.pending.front().is_some_and(|pending| pending.message_id == message_id);
        if ours {
            if let Some(mut confirmed) = self.pending.pop_front() {
                if confirmed.applied {
                    confirmed.state = PendingState::Confirmed { seq };
                    self.record_reshape(seq, client, confirmed.effects.clone());
                }
                debug!(%message_id, seq, state = ?confirmed.state, "command confirmed");
                return Ok(Event::Confirmed(confirmed));
            }
        }

        self.rollback()?;
        for pending in self.pending.iter_mut() {
            if pending.state != PendingState::Dropped {
                pending.state = PendingState::Superseded { by: seq };
            }
        }

        let outcome = self.apply_remote(&client, base_revision, command);
        let effects = match outcome {
            RemoteOutcome::Applied => last_effects(&self.engine),
            _ => Vec::new(),
        };
        debug!(seq, client = %client, ?outcome, pending = self.pending.len(), "remote command");
        self.record_reshape(seq, client.clone(), effects.clone());
        self.replay(&effects);

        Ok(Event::Remote { seq, client, outcome })
    }

    /// Rewrite a remote command for the structural edits it had not seen,
    /// then apply it
    fn apply_remote(&mut self, client: &ClientId, base_revision: Seq, mut command: Command) -> RemoteOutcome {
        let unseen = self
            .reshapes
            .iter()
            .filter(|reshape| reshape.seq > base_revision && &reshape.client != client)
            .flat_map(|reshape| reshape.effects.iter());
        for effect in unseen {
            match command.transform(effect, self.engine.state()) {
                Some(rewritten) => command = rewritten,
                None => {
                    warn!(client = %client, command = command.name(), "remote command dropped, target deleted");
                    return RemoteOutcome::Dropped;
                }
            }
        }

        match self.engine.dispatch_as(client.clone(), command) {
            Ok(CommandResult::Success) => RemoteOutcome::Applied,
            Ok(CommandResult::Cancelled(reason)) => {
                warn!(client = %client, %reason, "remote command refused");
                RemoteOutcome::Cancelled(reason)
            }
            Err(error) => {
                warn!(client = %client, %error, "remote command failed");
                RemoteOutcome::Failed
            }
        }
    }

    fn record_reshape(&mut self, seq: Seq, client: ClientId, effects: Vec<StructuralEffect>) {
        if effects.is_empty() {
            return;
        }
        for effect in &effects {
            self.peers.follow(effect, self.engine.workbook());
        }
        self.reshapes.push_back(Reshape { seq, client, effects });
    }

    /// Bring a peer's cursor up to the structural edits it had not seen
    fn rebase_position(&self, position: Position, client: &ClientId, base_revision: Seq) -> Position {
        self.reshapes
            .iter()
            .filter(|reshape| reshape.seq > base_revision && &reshape.client != client)
            .flat_map(|reshape| reshape.effects.iter())
            .fold(position, |position, effect| follow(position, effect, self.engine.workbook()))
    }

    /// Take back every applied local command, newest first
    fn rollback(&mut self) -> Result<(), CollabError> {
        for pending in self.pending.iter_mut().rev() {
            if pending.applied {
                self.engine.revert_last()?;
                pending.applied = false;
            }
        }
        Ok(())
    }

    /// Apply the local commands again, rewritten for `effects`
    fn replay(&mut self, effects: &[StructuralEffect]) {
        'pending: for pending in self.pending.iter_mut() {
            if pending.state == PendingState::Dropped {
                continue;
            }
            let mut command = pending.command.clone();
            for effect in effects {
                match command.transform(effect, self.engine.state()) {
                    Some(rewritten) => command = rewritten,
                    None => {
                        debug!(message_id = %pending.message_id, "local command dropped");
                        pending.state = PendingState::Dropped;
                        pending.effects.clear();
                        continue 'pending;
                    }
                }
            }
            pending.command = command.clone();

            // Peers see exactly these outcomes when the command reaches them
            match self.engine.dispatch(command) {
                Ok(CommandResult::Success) => {
                    pending.applied = true;
                    pending.effects = last_effects(&self.engine);
                    if !matches!(pending.state, PendingState::Pending) {
                        pending.state = PendingState::Reapplied;
                    }
                }
                Ok(CommandResult::Cancelled(reason)) => {
                    debug!(message_id = %pending.message_id, %reason, "local command no longer valid");
                    pending.effects.clear();
                    pending.state = PendingState::Rejected(reason);
                }
                Err(error) => {
                    warn!(message_id = %pending.message_id, %error, "local command failed on replay");
                    pending.effects.clear();
                    pending.state = PendingState::Failed;
                }
            }
        }
    }

    fn reset_history(&mut self) -> Result<(), CollabError> {
        self.rollback()?;
        self.engine.clear_history();
        self.replay(&[]);
        Ok(())
    }

    fn queue_presence(&mut self) {
        let position = self.engine.position().clone();
        if self.announced.as_ref() == Some(&position) {
            self.outgoing.cancel();
        } else {
            self.outgoing.push(position, Instant::now());
        }
    }

    fn announce(&mut self) -> Result<(), CollabError> {
        self.outgoing.cancel();
        let position = self.engine.position().clone();
        self.transport.send(Message::Presence {
            client: self.client().clone(),
            name: self.name.clone(),
            position: position.clone(),
            base_revision: self.seq,
        })?;
        self.announced = Some(position);
        self.last_presence = Instant::now();
        Ok(())
    }
}

fn last_effects(engine: &SpreadsheetEngine) -> Vec<StructuralEffect> {
    engine
        .log()
        .iter()
        .last()
        .map(|revision| revision.effects.clone())
        .unwrap_or_default()
}

impl<T> std::fmt::Debug for CollabSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollabSession")
            .field("client", self.engine.client())
            .field("seq", &self.seq)
            .field("pending", &self.pending.len())
            .field("peers", &self.peers.len())
            .finish()
    }
}
