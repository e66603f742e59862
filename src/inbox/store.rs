//! Shared, injectable inbox store.

use super::ledger::{Command, CommandId};
use super::state::{InboxState, InboxView, SyncStatus, DEFAULT_MEMORY_CAPACITY};
use crate::epoch::EpochScope;
use crate::subscriptions::{InboxEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionManager};
use crate::types::{ConnectionState, Notification, NotificationId};
use parking_lot::RwLock;
use serde::Deserialize;

/// Store configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct InboxConfig {
    /// How many confirmed-read ids and tombstones to remember.
    pub memory_capacity: usize,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
        }
    }
}

/// The single source of truth for one user's inbox.
///
/// Each operation takes the write lock once, so every mutation is atomic
/// with respect to every other. Readers get clones; nothing outside this
/// type can hold a reference into the state.
pub struct InboxStore {
    state: RwLock<InboxState>,
    subscriptions: SubscriptionManager,
}

impl InboxStore {
    pub fn new() -> Self {
        Self::with_config(InboxConfig::default())
    }

    pub fn with_config(config: InboxConfig) -> Self {
        Self {
            state: RwLock::new(InboxState::with_capacity(config.memory_capacity)),
            subscriptions: SubscriptionManager::new(),
        }
    }

    // --- Queries ---

    pub fn get(&self, id: &NotificationId) -> Option<Notification> {
        self.state.read().get(id).cloned()
    }

    pub fn contains(&self, id: &NotificationId) -> bool {
        self.state.read().contains(id)
    }

    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.state.read().unread_count()
    }

    /// Notifications, newest first.
    pub fn list(&self) -> Vec<Notification> {
        self.state.read().list()
    }

    /// Consistent copy of contents, counter and status.
    pub fn view(&self) -> InboxView {
        self.state.read().view()
    }

    pub fn status(&self) -> SyncStatus {
        self.state.read().status().clone()
    }

    pub fn pending_commands(&self) -> usize {
        self.state.read().pending_commands()
    }

    pub fn check_invariants(&self) -> bool {
        self.state.read().check_invariants()
    }

    // --- Subscriptions ---

    /// Subscribe to changes. The current counter and status are delivered
    /// immediately so a new subscriber never has to poll first.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let handle = self.subscriptions.subscribe(config);
        let state = self.state.read();
        self.subscriptions.send_to(
            handle.id,
            InboxEvent::Changed {
                unread_count: state.unread_count(),
                total: state.len(),
            },
        );
        self.subscriptions.send_to(
            handle.id,
            InboxEvent::StatusChanged {
                status: state.status().clone(),
            },
        );
        drop(state);
        handle
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        self.subscriptions.unsubscribe(handle.id);
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.subscription_count()
    }

    // --- Server-truth mutations ---

    pub fn apply_new(&self, record: Notification) -> bool {
        self.mutate(|state| state.apply_new(record))
    }

    pub fn apply_read(&self, id: &NotificationId) -> bool {
        self.mutate(|state| state.apply_read(id))
    }

    pub fn apply_read_all(&self) -> usize {
        self.mutate(|state| state.apply_read_all())
    }

    pub fn apply_delete(&self, id: &NotificationId) -> Option<Notification> {
        self.mutate(|state| state.apply_delete(id))
    }

    pub fn replace_snapshot(&self, records: Vec<Notification>) {
        self.mutate(|state| state.replace_snapshot(records))
    }

    // --- Optimistic commands ---

    pub fn begin(&self, command: &Command) -> CommandId {
        self.mutate(|state| state.begin(command))
    }

    pub fn confirm(&self, command: CommandId) -> bool {
        self.mutate(|state| state.confirm(command))
    }

    pub fn rollback(&self, command: CommandId) -> bool {
        self.mutate(|state| state.rollback(command))
    }

    // --- Status ---

    pub fn set_connection(&self, connection: ConnectionState) -> bool {
        self.mutate(|state| state.set_connection(connection))
    }

    pub fn set_snapshot_error(&self, error: Option<String>) -> bool {
        self.mutate(|state| state.set_snapshot_error(error))
    }

    pub fn set_channel_gave_up(&self, gave_up: bool) -> bool {
        self.mutate(|state| state.set_channel_gave_up(gave_up))
    }

    /// Reset for logout. Subscribers stay attached and see an empty inbox.
    pub fn clear(&self) {
        self.mutate(|state| state.clear())
    }

    /// Drop every subscriber.
    pub fn close(&self) {
        self.subscriptions.close_all();
    }

    /// Apply `f` only if `scope` still belongs to the live session.
    ///
    /// The epoch is checked under the write lock, so a mutation racing a
    /// logout either lands before the logout clears the inbox or not at all.
    /// Returns `None` when the scope is stale.
    pub fn apply_scoped<T>(
        &self,
        scope: &EpochScope,
        f: impl FnOnce(&mut InboxState) -> T,
    ) -> Option<T> {
        self.mutate(|state| scope.is_live().then(|| f(state)))
    }

    /// Run one mutation under the write lock, verify the counter, then
    /// broadcast. Sends never block, so broadcasting under the lock keeps
    /// subscribers seeing changes in mutation order.
    fn mutate<T>(&self, f: impl FnOnce(&mut InboxState) -> T) -> T {
        let mut state = self.state.write();
        let revision = state.revision();
        let status_revision = state.status_revision();

        let result = f(&mut *state);
        debug_assert!(
            state.check_invariants(),
            "unread counter diverged from inbox contents"
        );

        if state.revision() != revision {
            self.subscriptions
                .broadcast_changed(state.unread_count(), state.len());
        }
        if state.status_revision() != status_revision {
            self.subscriptions.broadcast_status(state.status());
        }
        result
    }
}

impl Default for InboxStore {
    fn default() -> Self {
        Self::new()
    }
}
