//! Ledger of in-flight optimistic commands.
//!
//! Every optimistic mutation is recorded here together with the pre-state it
//! replaced, until the remote call resolves it. Entries are kept in begin
//! order so they can be re-applied on top of a fresh server snapshot.

use crate::types::{Notification, NotificationId, Timestamp};
use std::collections::BTreeMap;

/// User intent submitted to the command dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    MarkRead(NotificationId),
    MarkAllRead,
    Delete(NotificationId),
}

impl Command {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::MarkRead(_) => "mark_read",
            Command::MarkAllRead => "mark_all_read",
            Command::Delete(_) => "delete",
        }
    }
}

/// Identifier of one optimistic command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u64);

/// What an optimistic command changed locally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingChange {
    /// `flipped` is true when the record is read because of this command:
    /// it was unread, absent, or read only by another pending command.
    Read { id: NotificationId, flipped: bool },

    /// `covered` is every id present at begin time, `flipped` the subset
    /// this command is responsible for, in the same sense as `Read`.
    ReadAll {
        covered: Vec<NotificationId>,
        flipped: Vec<NotificationId>,
    },

    /// `record` is the removed record, `None` if it was not present.
    /// `server_read` is set when its read flag was server truth rather than
    /// the effect of a pending command.
    Delete {
        id: NotificationId,
        record: Option<Notification>,
        server_read: bool,
    },
}

/// A command awaiting its remote result.
#[derive(Clone, Debug)]
pub struct PendingEntry {
    pub command: CommandId,
    pub change: PendingChange,
    pub started_at: Timestamp,
}

/// Optimistic command ledger.
#[derive(Debug, Default)]
pub struct PendingLedger {
    next_id: u64,
    entries: BTreeMap<CommandId, PendingEntry>,
}

impl PendingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new pending change.
    pub fn record(&mut self, change: PendingChange) -> CommandId {
        self.next_id += 1;
        let command = CommandId(self.next_id);
        self.entries.insert(
            command,
            PendingEntry {
                command,
                change,
                started_at: Timestamp::now(),
            },
        );
        command
    }

    /// Remove and return an entry once its command resolved.
    pub fn take(&mut self, command: CommandId) -> Option<PendingEntry> {
        self.entries.remove(&command)
    }

    /// Pending entries in begin order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingEntry> {
        self.entries.values()
    }

    /// Whether some pending command keeps `id` read.
    pub fn covers_read(&self, id: &NotificationId) -> bool {
        self.entries.values().any(|entry| match &entry.change {
            PendingChange::Read { id: read, .. } => read == id,
            PendingChange::ReadAll { covered, .. } => covered.contains(id),
            PendingChange::Delete { .. } => false,
        })
    }

    /// Whether some pending command keeps `id` deleted.
    pub fn covers_delete(&self, id: &NotificationId) -> bool {
        self.entries.values().any(|entry| {
            matches!(&entry.change, PendingChange::Delete { id: deleted, .. } if deleted == id)
        })
    }

    /// Give a removed record to a pending delete of the same id that has
    /// none, so a later rollback can restore it. A delete that already holds
    /// a record only absorbs `server_read`. Returns the record if no pending
    /// delete of that id exists.
    pub fn hand_over(
        &mut self,
        record: Notification,
        server_read: bool,
    ) -> Option<(Notification, bool)> {
        let mut holder = None;
        for entry in self.entries.values_mut() {
            if let PendingChange::Delete {
                id,
                record: slot,
                server_read: slot_read,
            } = &mut entry.change
            {
                if *id != record.id {
                    continue;
                }
                if slot.is_none() {
                    *slot = Some(record);
                    *slot_read = server_read;
                    return None;
                }
                holder.get_or_insert(slot_read);
            }
        }
        match holder {
            Some(slot_read) => {
                *slot_read |= server_read;
                None
            }
            None => Some((record, server_read)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
