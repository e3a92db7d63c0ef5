use std::fmt;

use cellsync_core::ClientId;
use serde::{Deserialize, Serialize};

use crate::change::{Change, StructuralEffect};
use crate::command::Command;

/// Position of a revision in the log, starting at 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(pub u64);

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// What a revision did relative to earlier revisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionKind {
    Command,
    /// Reverted the effect of the given revision
    Undo(RevisionId),
    /// Replayed the given undo revision's inverse
    Redo(RevisionId),
}

/// One applied command, never mutated once appended
#[derive(Debug, Clone, PartialEq)]
pub struct Revision {
    pub id: RevisionId,
    pub client: ClientId,
    pub command: Command,
    pub kind: RevisionKind,
    /// Inverse records, in the order that restores the prior state
    pub changes: Vec<Change>,
    /// Shape changes the revision made, in application order
    pub effects: Vec<StructuralEffect>,
}

/// Flat, append-only list of revisions shared by all clients.
///
/// Undo and redo stacks are not stored: they are derived per client from
/// the log, so every replica holding the same log agrees on them.
#[derive(Default)]
pub struct RevisionLog {
    revisions: Vec<Revision>,
}

impl RevisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next appended revision receives
    pub fn next_id(&self) -> RevisionId {
        RevisionId(self.revisions.len() as u64 + 1)
    }

    pub fn last_id(&self) -> Option<RevisionId> {
        self.revisions.last().map(|r| r.id)
    }

    /// Append a revision, assigning its id
    pub fn push(
        &mut self,
        client: ClientId,
        command: Command,
        kind: RevisionKind,
        changes: Vec<Change>,
        effects: Vec<StructuralEffect>,
    ) -> RevisionId {
        let id = self.next_id();
        self.revisions.push(Revision {
            id,
            client,
            command,
            kind,
            changes,
            effects,
        });
        id
    }

    /// Take back the newest revision. Only for rolling back optimistic
    /// revisions that were never confirmed; undo appends instead.
    pub fn pop_last(&mut self) -> Option<Revision> {
        self.revisions.pop()
    }

    pub fn get(&self, id: RevisionId) -> Option<&Revision> {
        let index = usize::try_from(id.0).ok()?.checked_sub(1)?;
        self.revisions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Revision> {
        self.revisions.iter()
    }

    /// Revisions appended after `id`
    pub fn since(&self, id: RevisionId) -> &[Revision] {
        let start = (id.0 as usize).min(self.revisions.len());
        &self.revisions[start..]
    }

    fn stacks(&self, client: &ClientId) -> (Vec<RevisionId>, Vec<RevisionId>) {
        let mut undo = Vec::new();
        let mut redo = Vec::new();
        for revision in self.revisions.iter().filter(|r| &r.client == client) {
            match revision.kind {
                RevisionKind::Command => {
                    undo.push(revision.id);
                    redo.clear();
                }
                RevisionKind::Undo(_) => {
                    undo.pop();
                    redo.push(revision.id);
                }
                RevisionKind::Redo(_) => {
                    redo.pop();
                    undo.push(revision.id);
                }
            }
        }
        (undo, redo)
    }

    /// Revision whose inverse records an undo by `client` applies
    pub fn undo_target(&self, client: &ClientId) -> Option<&Revision> {
        let (undo, _) = self.stacks(client);
        undo.last().and_then(|id| self.get(*id))
    }

    /// Undo revision whose inverse records a redo by `client` applies
    pub fn redo_target(&self, client: &ClientId) -> Option<&Revision> {
        let (_, redo) = self.stacks(client);
        redo.last().and_then(|id| self.get(*id))
    }

    pub fn can_undo(&self, client: &ClientId) -> bool {
        self.undo_target(client).is_some()
    }

    pub fn can_redo(&self, client: &ClientId) -> bool {
        self.redo_target(client).is_some()
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn clear(&mut self) {
        self.revisions.clear();
    }
}

impl fmt::Debug for RevisionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevisionLog")
            .field("len", &self.revisions.len())
            .field("last", &self.last_id())
            .finish()
    }
}
