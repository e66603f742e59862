//! Inbox state and its idempotent mutations.
//!
//! All mutations here are pure in-memory transitions; locking and change
//! broadcasting live in [`InboxStore`](super::InboxStore).
//!
//! Read state is monotonic with respect to server truth: once the server
//! has declared an id read, no later event or snapshot makes it unread.
//! Only the rollback of a local optimistic read the server never confirmed
//! can restore `is_read = false`. Deletions leave a tombstone so a late
//! duplicate of the record cannot resurrect it.
//!
//! For present records the live map is the source of that fact: a read
//! record is server-read unless it is listed in `local_reads`. The bounded
//! `confirmed_read` cache only covers ids whose record is absent.

use super::ledger::{Command, CommandId, PendingChange, PendingLedger};
use crate::types::{ConnectionState, Notification, NotificationId, Timestamp};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use tracing::debug;

/// Default number of confirmed-read ids and tombstones remembered.
pub const DEFAULT_MEMORY_CAPACITY: usize = 4096;

/// Where a mutation originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    /// Push channel or REST snapshot.
    Server,
    /// Rollback of an optimistic delete. `server_read` carries whether the
    /// captured read flag was server truth.
    Local { server_read: bool },
}

/// Soft status surfaced to the UI alongside the inbox contents.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub connection: ConnectionState,
    /// Last snapshot failure, cleared by the next successful snapshot.
    pub snapshot_error: Option<String>,
    /// The channel exhausted its retry ceiling.
    pub channel_gave_up: bool,
    pub last_synced_at: Option<Timestamp>,
}

/// Read-only copy of the inbox for presentation code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboxView {
    /// Newest first.
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
    pub status: SyncStatus,
}

/// The inbox contents plus the bookkeeping that makes every mutation
/// idempotent and order independent.
pub struct InboxState {
    notifications: HashMap<NotificationId, Notification>,
    unread_count: usize,
    /// Ids the server declared read, even if the record has not arrived yet.
    confirmed_read: LruCache<NotificationId, ()>,
    /// Present records that are read only because of pending commands.
    local_reads: HashSet<NotificationId>,
    /// Ids the server declared deleted.
    tombstones: LruCache<NotificationId, ()>,
    ledger: PendingLedger,
    status: SyncStatus,
    /// Bumped by every change to contents.
    revision: u64,
    /// Bumped by every change to `status`.
    status_revision: u64,
}

impl InboxState {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }

    /// `memory_capacity` bounds the confirmed-read and tombstone memory.
    pub fn with_capacity(memory_capacity: usize) -> Self {
        let cap = NonZeroUsize::new(memory_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            notifications: HashMap::new(),
            unread_count: 0,
            confirmed_read: LruCache::new(cap),
            local_reads: HashSet::new(),
            tombstones: LruCache::new(cap),
            ledger: PendingLedger::new(),
            status: SyncStatus::default(),
            revision: 0,
            status_revision: 0,
        }
    }

    // --- Queries ---

    pub fn get(&self, id: &NotificationId) -> Option<&Notification> {
        self.notifications.get(id)
    }

    pub fn contains(&self, id: &NotificationId) -> bool {
        self.notifications.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.unread_count
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    pub fn pending_commands(&self) -> usize {
        self.ledger.len()
    }

    /// Changes whenever the contents change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Changes whenever the sync status changes.
    pub fn status_revision(&self) -> u64 {
        self.status_revision
    }

    /// Notifications sorted newest first (ties by id).
    pub fn list(&self) -> Vec<Notification> {
        let mut list: Vec<Notification> = self.notifications.values().cloned().collect();
        list.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        list
    }

    pub fn view(&self) -> InboxView {
        InboxView {
            notifications: self.list(),
            unread_count: self.unread_count,
            status: self.status.clone(),
        }
    }

    /// `unread_count` equals the number of unread records.
    pub fn check_invariants(&self) -> bool {
        self.unread_count == self.count_unread()
    }

    fn count_unread(&self) -> usize {
        self.notifications.values().filter(|n| !n.is_read).count()
    }

    // --- Server-truth mutations ---

    /// Insert a record unless it is already known. Returns true if inserted.
    pub fn apply_new(&mut self, record: Notification) -> bool {
        self.insert(record, Origin::Server)
    }

    /// Mark a record read. Returns true if a record flipped.
    pub fn apply_read(&mut self, id: &NotificationId) -> bool {
        self.confirmed_read.put(id.clone(), ());
        self.local_reads.remove(id);
        self.mark_read(id)
    }

    /// Mark every present record read. Returns the number flipped.
    pub fn apply_read_all(&mut self) -> usize {
        let ids: Vec<NotificationId> = self.notifications.keys().cloned().collect();
        let mut flipped = 0;
        for id in ids {
            self.confirmed_read.put(id.clone(), ());
            if self.mark_read(&id) {
                flipped += 1;
            }
        }
        self.local_reads.clear();
        flipped
    }

    /// Remove a record for good. Returns the removed record, if present.
    pub fn apply_delete(&mut self, id: &NotificationId) -> Option<Notification> {
        self.tombstones.put(id.clone(), ());
        self.remove(id)
    }

    /// Replace the inbox with an authoritative server list, then re-apply
    /// every still-pending optimistic command on top of it.
    pub fn replace_snapshot(&mut self, records: Vec<Notification>) {
        let kept_read: HashSet<NotificationId> = self
            .notifications
            .values()
            .filter(|n| n.is_read && !self.local_reads.contains(&n.id))
            .map(|n| n.id.clone())
            .collect();
        self.notifications.clear();
        self.local_reads.clear();
        self.unread_count = 0;

        for mut record in records {
            if self.tombstones.contains(&record.id) {
                debug!(id = %record.id, "snapshot entry already deleted, skipping");
                continue;
            }
            if self.notifications.contains_key(&record.id) {
                continue;
            }
            if record.is_read {
                self.confirmed_read.put(record.id.clone(), ());
            } else if kept_read.contains(&record.id) || self.confirmed_read.contains(&record.id)
            {
                record.is_read = true;
            }
            self.notifications.insert(record.id.clone(), record);
        }

        let pending: Vec<PendingChange> = self.ledger.iter().map(|e| e.change.clone()).collect();
        for change in pending {
            match change {
                PendingChange::Read { id, .. } => {
                    self.mark_read_locally(&id);
                }
                PendingChange::ReadAll { covered, .. } => {
                    for id in &covered {
                        self.mark_read_locally(id);
                    }
                }
                PendingChange::Delete { id, .. } => {
                    let server_read = self.read_by_server(&id);
                    if let Some(removed) = self.remove(&id) {
                        self.ledger.hand_over(removed, server_read);
                    }
                }
            }
        }

        self.unread_count = self.count_unread();
        self.status.snapshot_error = None;
        self.status.last_synced_at = Some(Timestamp::now());
        self.revision += 1;
        self.status_revision += 1;
    }

    // --- Optimistic commands ---

    /// Apply a command locally and record it as pending.
    pub fn begin(&mut self, command: &Command) -> CommandId {
        let change = match command {
            Command::MarkRead(id) => {
                let flipped =
                    !self.contains(id) || self.mark_read_locally(id) || self.local_reads.contains(id);
                PendingChange::Read {
                    id: id.clone(),
                    flipped,
                }
            }
            Command::MarkAllRead => {
                let covered: Vec<NotificationId> = self.notifications.keys().cloned().collect();
                let flipped: Vec<NotificationId> = covered
                    .iter()
                    .filter(|id| self.mark_read_locally(id) || self.local_reads.contains(*id))
                    .cloned()
                    .collect();
                PendingChange::ReadAll { covered, flipped }
            }
            Command::Delete(id) => {
                let server_read = self.read_by_server(id);
                PendingChange::Delete {
                    id: id.clone(),
                    record: self.remove(id),
                    server_read,
                }
            }
        };
        self.ledger.record(change)
    }

    /// The server accepted a command: its effect is now server truth.
    pub fn confirm(&mut self, command: CommandId) -> bool {
        let Some(entry) = self.ledger.take(command) else {
            return false;
        };
        match entry.change {
            PendingChange::Read { id, .. } => {
                self.local_reads.remove(&id);
                self.confirmed_read.put(id, ());
            }
            PendingChange::ReadAll { covered, .. } => {
                for id in covered {
                    self.local_reads.remove(&id);
                    self.confirmed_read.put(id, ());
                }
            }
            PendingChange::Delete { id, .. } => {
                self.tombstones.put(id, ());
            }
        }
        true
    }

    /// The server rejected a command: undo exactly what it changed, except
    /// where server truth or another pending command has since taken over.
    /// Returns true if anything was restored.
    pub fn rollback(&mut self, command: CommandId) -> bool {
        let Some(entry) = self.ledger.take(command) else {
            return false;
        };
        match entry.change {
            PendingChange::Read { id, flipped } => flipped && self.revert_read(&id),
            PendingChange::ReadAll { flipped, .. } => {
                let mut restored = false;
                for id in &flipped {
                    restored |= self.revert_read(id);
                }
                restored
            }
            PendingChange::Delete {
                id,
                record,
                server_read,
            } => match record {
                Some(record) if !self.tombstones.contains(&id) => {
                    match self.ledger.hand_over(record, server_read) {
                        Some((record, server_read)) => {
                            self.insert(record, Origin::Local { server_read })
                        }
                        // Another pending delete of the same id keeps it hidden.
                        None => false,
                    }
                }
                _ => false,
            },
        }
    }

    // --- Status ---

    /// Returns true if the status changed.
    pub fn set_connection(&mut self, connection: ConnectionState) -> bool {
        if self.status.connection == connection {
            return false;
        }
        self.status.connection = connection;
        if connection == ConnectionState::Joined {
            self.status.channel_gave_up = false;
        }
        self.status_revision += 1;
        true
    }

    pub fn set_snapshot_error(&mut self, error: Option<String>) -> bool {
        if self.status.snapshot_error == error {
            return false;
        }
        self.status.snapshot_error = error;
        self.status_revision += 1;
        true
    }

    pub fn set_channel_gave_up(&mut self, gave_up: bool) -> bool {
        if self.status.channel_gave_up == gave_up {
            return false;
        }
        self.status.channel_gave_up = gave_up;
        self.status_revision += 1;
        true
    }

    /// Forget everything (logout).
    pub fn clear(&mut self) {
        self.notifications.clear();
        self.unread_count = 0;
        self.confirmed_read.clear();
        self.local_reads.clear();
        self.tombstones.clear();
        self.ledger.clear();
        self.status = SyncStatus::default();
        self.revision += 1;
        self.status_revision += 1;
    }

    // --- Internals ---

    fn insert(&mut self, mut record: Notification, origin: Origin) -> bool {
        if self.tombstones.contains(&record.id) || self.ledger.covers_delete(&record.id) {
            return false;
        }
        if self.notifications.contains_key(&record.id) {
            return false;
        }

        // A re-inserted record may carry a read flag from a command that has
        // since been rolled back, so only `server_read` is trusted.
        let server_read = match origin {
            Origin::Server => record.is_read,
            Origin::Local { server_read } => server_read,
        };
        if server_read {
            self.confirmed_read.put(record.id.clone(), ());
            record.is_read = true;
        } else if self.confirmed_read.contains(&record.id) {
            record.is_read = true;
        } else if self.ledger.covers_read(&record.id) {
            record.is_read = true;
            self.local_reads.insert(record.id.clone());
        } else {
            record.is_read = false;
        }

        if !record.is_read {
            self.unread_count += 1;
        }
        self.notifications.insert(record.id.clone(), record);
        self.revision += 1;
        true
    }

    fn remove(&mut self, id: &NotificationId) -> Option<Notification> {
        let removed = self.notifications.remove(id)?;
        self.local_reads.remove(id);
        if !removed.is_read {
            self.unread_count = self.unread_count.saturating_sub(1);
        }
        self.revision += 1;
        Some(removed)
    }

    fn mark_read(&mut self, id: &NotificationId) -> bool {
        match self.notifications.get_mut(id) {
            Some(n) if !n.is_read => {
                n.is_read = true;
                self.unread_count = self.unread_count.saturating_sub(1);
                self.revision += 1;
                true
            }
            _ => false,
        }
    }

    /// `mark_read` on behalf of a pending command.
    fn mark_read_locally(&mut self, id: &NotificationId) -> bool {
        let flipped = self.mark_read(id);
        if flipped {
            self.local_reads.insert(id.clone());
        }
        flipped
    }

    fn read_by_server(&self, id: &NotificationId) -> bool {
        self.notifications.get(id).is_some_and(|n| n.is_read) && !self.local_reads.contains(id)
    }

    fn revert_read(&mut self, id: &NotificationId) -> bool {
        if !self.local_reads.contains(id) || self.ledger.covers_read(id) {
            return false;
        }
        match self.notifications.get_mut(id) {
            Some(n) if n.is_read => {
                n.is_read = false;
                self.local_reads.remove(id);
                self.unread_count += 1;
                self.revision += 1;
                true
            }
            _ => false,
        }
    }
}

impl Default for InboxState {
    fn default() -> Self {
        Self::new()
    }
}
