//! Subscription manager for broadcasting inbox events.

use crate::inbox::SyncStatus;
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::types::{
    DropReason, InboxEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};

/// Internal subscription state.
struct Subscription {
    config: SubscriptionConfig,
    sender: Sender<InboxEvent>,
}

impl Subscription {
    /// Try to send an event. Returns false if buffer is full (subscriber will be dropped).
    fn try_send(&self, event: InboxEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }

    fn wants(&self, event: &InboxEvent) -> bool {
        match event {
            InboxEvent::Changed { .. } => self.config.filter.include_changes,
            InboxEvent::StatusChanged { .. } => self.config.filter.include_status,
            InboxEvent::Dropped { .. } => true,
        }
    }
}

/// Manages subscriptions and broadcasts events.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    /// Create a new subscription manager.
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new subscription.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.subscriptions
            .write()
            .insert(id, Subscription { config, sender });

        SubscriptionHandle { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(sub) = self.subscriptions.write().remove(&id) {
            // Best effort
            let _ = sub.sender.try_send(InboxEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    /// Drop every subscriber.
    pub fn close_all(&self) {
        let drained: Vec<_> = self.subscriptions.write().drain().collect();
        for (_, sub) in drained {
            let _ = sub.sender.try_send(InboxEvent::Dropped {
                reason: DropReason::Closed,
            });
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    // --- Broadcasting ---

    /// Broadcast an inbox content change.
    pub fn broadcast_changed(&self, unread_count: usize, total: usize) {
        self.broadcast(InboxEvent::Changed {
            unread_count,
            total,
        });
    }

    /// Broadcast a sync status change.
    pub fn broadcast_status(&self, status: &SyncStatus) {
        self.broadcast(InboxEvent::StatusChanged {
            status: status.clone(),
        });
    }

    /// Send an event directly to one subscription (initial state).
    /// Returns false if the subscription was dropped.
    pub fn send_to(&self, id: SubscriptionId, event: InboxEvent) -> bool {
        let subs = self.subscriptions.read();
        match subs.get(&id) {
            Some(sub) if sub.wants(&event) => sub.try_send(event),
            Some(_) => true,
            None => false,
        }
    }

    /// Internal broadcast helper. Drops subscribers that fail to receive.
    fn broadcast(&self, event: InboxEvent) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if sub.wants(&event) && !sub.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    debug!(subscription = id.0, "dropping slow inbox subscriber");
                    // Might fail, that's ok
                    let _ = sub.sender.try_send(InboxEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriptions::SubscriptionFilter;
    use std::time::Duration;

    #[test]
    fn test_subscribe_unsubscribe() {
        let manager = SubscriptionManager::new();

        let handle = manager.subscribe(SubscriptionConfig::default());
        assert_eq!(manager.subscription_count(), 1);

        manager.unsubscribe(handle.id);
        assert_eq!(manager.subscription_count(), 0);

        let event = handle.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(
            event,
            InboxEvent::Dropped {
                reason: DropReason::Unsubscribed
            }
        );
    }

    #[test]
    fn test_filter_excludes_status() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(SubscriptionConfig {
            filter: SubscriptionFilter::changes(),
            ..Default::default()
        });

        manager.broadcast_status(&SyncStatus::default());
        manager.broadcast_changed(1, 3);

        let event = handle.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(
            event,
            InboxEvent::Changed {
                unread_count: 1,
                total: 3
            }
        );
        assert!(handle.try_recv().is_err());
    }

    #[test]
    fn test_drop_slow_subscriber() {
        let manager = SubscriptionManager::new();
        let _handle = manager.subscribe(SubscriptionConfig {
            buffer_size: 2,
            ..Default::default()
        });

        for i in 0..10 {
            manager.broadcast_changed(i, i);
        }

        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn test_close_all() {
        let manager = SubscriptionManager::new();
        let a = manager.subscribe(SubscriptionConfig::default());
        let b = manager.subscribe(SubscriptionConfig::default());

        manager.close_all();

        assert_eq!(manager.subscription_count(), 0);
        for handle in [a, b] {
            assert_eq!(
                handle.try_recv().unwrap(),
                InboxEvent::Dropped {
                    reason: DropReason::Closed
                }
            );
        }
    }
}
