//! Who else is connected and where their cursor is.
//!
//! Presence is view state: it never enters the document or the revision
//! log, and the newest update from a client simply replaces the old one.

use std::collections::BTreeMap;
use std::time::Duration;

use cellsync_core::{ClientId, Position, Workbook};
use cellsync_history::StructuralEffect;
use serde::Serialize;
use tokio::time::Instant;

/// A connected client as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientPresence {
    pub client: ClientId,
    pub name: String,
    /// Unknown until the client's first presence message arrives
    pub position: Option<Position>,
}

#[derive(Debug, Clone)]
struct PeerEntry {
    name: String,
    position: Option<Position>,
    last_seen: Instant,
}

/// Last-write-wins table of remote clients
#[derive(Debug, Default, Clone)]
pub struct PresenceTable {
    peers: BTreeMap<ClientId, PeerEntry>,
}

impl PresenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a client without moving its cursor
    pub fn join(&mut self, client: ClientId, name: String, now: Instant) {
        let entry = self.peers.entry(client).or_insert_with(|| PeerEntry {
            name: name.clone(),
            position: None,
            last_seen: now,
        });
        entry.name = name;
        entry.last_seen = now;
    }

    pub fn update(&mut self, client: ClientId, name: String, position: Position, now: Instant) {
        self.peers.insert(
            client,
            PeerEntry {
                name,
                position: Some(position),
                last_seen: now,
            },
        );
    }

    /// Any message counts as a sign of life
    pub fn touch(&mut self, client: &ClientId, now: Instant) {
        if let Some(entry) = self.peers.get_mut(client) {
            entry.last_seen = now;
        }
    }

    pub fn leave(&mut self, client: &ClientId) -> bool {
        self.peers.remove(client).is_some()
    }

    pub fn get(&self, client: &ClientId) -> Option<ClientPresence> {
        self.peers.get(client).map(|entry| presence(client, entry))
    }

    pub fn peers(&self) -> impl Iterator<Item = ClientPresence> + '_ {
        self.peers.iter().map(|(client, entry)| presence(client, entry))
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Move every cursor along with a structural edit
    pub fn follow(&mut self, effect: &StructuralEffect, workbook: &Workbook) {
        for entry in self.peers.values_mut() {
            if let Some(position) = entry.position.take() {
                entry.position = Some(follow(position, effect, workbook));
            }
        }
    }

    /// Drop clients not heard from within `timeout`
    pub fn prune(&mut self, now: Instant, timeout: Duration) -> Vec<ClientId> {
        let expired: Vec<ClientId> = self
            .peers
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_seen) >= timeout)
            .map(|(client, _)| client.clone())
            .collect();
        for client in &expired {
            self.peers.remove(client);
        }
        expired
    }

    /// When the next client would expire
    pub fn next_expiry(&self, timeout: Duration) -> Option<Instant> {
        self.peers.values().map(|entry| entry.last_seen + timeout).min()
    }
}

fn presence(client: &ClientId, entry: &PeerEntry) -> ClientPresence {
    ClientPresence {
        client: client.clone(),
        name: entry.name.clone(),
        position: entry.position.clone(),
    }
}

/// Where a cursor lands after `effect`. Cursors on a deleted sheet go to
/// the first sheet's origin.
pub fn follow(position: Position, effect: &StructuralEffect, workbook: &Workbook) -> Position {
    match effect {
        StructuralEffect::Lines(edit) => match workbook.sheet(&edit.sheet) {
            Some(sheet) => position.shifted(&edit.sheet, edit.axis, edit.at, edit.delta, sheet.line_count(edit.axis)),
            None => position,
        },
        StructuralEffect::SheetDeleted(sheet) if sheet == &position.sheet_id => match workbook.first_sheet() {
            Some(first) => Position::new(first.id.clone(), 0, 0),
            None => position,
        },
        StructuralEffect::SheetDeleted(_) | StructuralEffect::SheetCreated(_) => position,
    }
}

/// Holds back a value until no newer one arrived for a whole window.
///
/// Pushing within the window replaces the waiting value and restarts the
/// window; nothing queues up behind it.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self { window, pending: None }
    }

    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.window));
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, deadline)| *deadline)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }

    /// The waiting value, once its window has passed
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        match self.pending {
            Some((_, deadline)) if deadline <= now => self.cancel(),
            _ => None,
        }
    }
}
