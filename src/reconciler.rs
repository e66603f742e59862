//! Reconciler: the single point where remote truth enters the inbox.
//!
//! Channel events are routed to the matching store operation. After every
//! reconnect (and on explicit refresh or the optional poll timer) the full
//! list is fetched over REST and replaces the inbox, which recovers any
//! events missed while the channel was down.

use crate::api::{call_with_timeout, NotificationApi};
use crate::channel::{ChannelEvent, TaggedEvent};
use crate::epoch::SessionEpoch;
use crate::error::{Result, SyncError};
use crate::inbox::InboxStore;
use crate::types::{ConnectionState, UserId};
use crossbeam_channel::{never, select, tick, Receiver};
use serde::Deserialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reconciler configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Periodic snapshot interval. `None` disables polling.
    #[serde(
        rename = "poll_interval_ms",
        with = "crate::config::option_duration_ms"
    )]
    pub poll_interval: Option<Duration>,

    /// Upper bound for one snapshot request.
    /// Default: 10s
    #[serde(rename = "request_timeout_ms", with = "crate::config::duration_ms")]
    pub request_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Control messages for a running reconciler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    /// Fetch a fresh snapshot now.
    Refresh,
    /// Stop the event loop.
    Shutdown,
}

/// Everything the reconciler reacts to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcilerInput {
    Event(TaggedEvent),
    Refresh,
    /// Poll timer fired.
    Poll,
}

pub struct Reconciler {
    /// Snapshot records addressed to anyone else are dropped.
    user: UserId,
    store: Arc<InboxStore>,
    api: Arc<dyn NotificationApi>,
    epoch: SessionEpoch,
    config: ReconcilerConfig,
    /// Set while the channel is down. The first join counts as a reconnect.
    saw_disconnected: bool,
}

impl Reconciler {
    pub fn new(
        user: UserId,
        store: Arc<InboxStore>,
        api: Arc<dyn NotificationApi>,
        epoch: SessionEpoch,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            user,
            store,
            api,
            epoch,
            config,
            saw_disconnected: true,
        }
    }

    /// Dispatch one input.
    pub fn handle(&mut self, input: ReconcilerInput) {
        match input {
            ReconcilerInput::Event(event) => self.handle_event(event),
            ReconcilerInput::Refresh => {
                let _ = self.resync();
            }
            ReconcilerInput::Poll => {
                debug!("poll timer fired");
                let _ = self.resync();
            }
        }
    }

    /// Route one channel event into the store. Events from an older session
    /// are dropped.
    pub fn handle_event(&mut self, tagged: TaggedEvent) {
        let scope = self.epoch.scope_of(tagged.epoch);
        if !scope.is_live() {
            debug!(epoch = tagged.epoch.0, "dropping event from a previous session");
            return;
        }

        match tagged.event {
            ChannelEvent::NewNotification(record) => {
                self.store.apply_scoped(&scope, |s| s.apply_new(record));
            }
            ChannelEvent::NotificationRead(id) => {
                self.store.apply_scoped(&scope, |s| s.apply_read(&id));
            }
            ChannelEvent::AllNotificationsRead => {
                self.store.apply_scoped(&scope, |s| s.apply_read_all());
            }
            ChannelEvent::NotificationDeleted(id) => {
                self.store.apply_scoped(&scope, |s| s.apply_delete(&id));
            }
            ChannelEvent::ConnectionStateChanged(state) => {
                self.store.apply_scoped(&scope, |s| s.set_connection(state));
                match state {
                    ConnectionState::Disconnected => self.saw_disconnected = true,
                    ConnectionState::Joined if self.saw_disconnected => {
                        self.saw_disconnected = false;
                        info!("channel joined, recovering missed events");
                        let _ = self.resync();
                    }
                    _ => {}
                }
            }
            ChannelEvent::GaveUp { attempts } => {
                warn!(attempts, "channel gave up reconnecting");
                self.store.apply_scoped(&scope, |s| s.set_channel_gave_up(true));
            }
        }
    }

    /// Fetch the full list and replace the inbox with it.
    ///
    /// On failure the current contents are kept and the error is recorded in
    /// the sync status. A response that arrives after logout is discarded.
    /// Returns the number of records applied.
    pub fn resync(&mut self) -> Result<usize> {
        let scope = self.epoch.scope();
        let fetched = call_with_timeout(&self.api, Some(self.config.request_timeout), |api| {
            api.fetch_notifications()
        });

        match fetched {
            Ok(mut records) => {
                let fetched = records.len();
                records.retain(|record| record.recipient_id == self.user);
                if records.len() < fetched {
                    warn!(
                        dropped = fetched - records.len(),
                        user = %self.user,
                        "dropping snapshot records addressed to another user"
                    );
                }
                let count = records.len();
                match self.store.apply_scoped(&scope, |s| s.replace_snapshot(records)) {
                    Some(()) => {
                        info!(count, unread = self.store.unread_count(), "snapshot applied");
                        Ok(count)
                    }
                    None => {
                        debug!("discarding snapshot from a previous session");
                        Err(SyncError::StaleSession)
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "snapshot fetch failed, keeping last good state");
                self.store
                    .apply_scoped(&scope, |s| s.set_snapshot_error(Some(e.to_string())));
                Err(e)
            }
        }
    }

    /// Event loop. Returns on [`Control::Shutdown`] or when either input
    /// channel closes.
    pub fn run(mut self, events: Receiver<TaggedEvent>, control: Receiver<Control>) {
        let ticker = match self.config.poll_interval {
            Some(interval) => tick(interval),
            None => never(),
        };

        loop {
            select! {
                recv(events) -> msg => match msg {
                    Ok(event) => self.handle(ReconcilerInput::Event(event)),
                    Err(_) => break,
                },
                recv(control) -> msg => match msg {
                    Ok(Control::Refresh) => self.handle(ReconcilerInput::Refresh),
                    Ok(Control::Shutdown) | Err(_) => break,
                },
                recv(ticker) -> _ => self.handle(ReconcilerInput::Poll),
            }
        }

        debug!("reconciler stopped");
    }

    /// Run the event loop on its own thread.
    pub fn spawn(
        self,
        events: Receiver<TaggedEvent>,
        control: Receiver<Control>,
    ) -> Result<JoinHandle<()>> {
        Ok(thread::Builder::new()
            .name("inbox-sync-reconciler".to_string())
            .spawn(move || self.run(events, control))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, Notification, NotificationId, Timestamp, UserId};
    use parking_lot::Mutex;

    fn note(id: u64) -> Notification {
        Notification {
            id: NotificationId::from(id),
            title: "Stock low".to_string(),
            message: "Item below reorder level".to_string(),
            category: Category::Warning,
            link: None,
            created_at: Timestamp::from_millis(1_700_000_000_000 + id as i64).unwrap(),
            is_read: false,
            recipient_id: UserId::new("u1"),
        }
    }

    #[derive(Default)]
    struct ScriptedApi {
        snapshot: Mutex<Option<Vec<Notification>>>,
        fetches: Mutex<usize>,
    }

    impl NotificationApi for ScriptedApi {
        fn fetch_notifications(&self) -> Result<Vec<Notification>> {
            *self.fetches.lock() += 1;
            self.snapshot
                .lock()
                .clone()
                .ok_or_else(|| SyncError::api(503, "unavailable"))
        }

        fn mark_read(&self, _id: &NotificationId) -> Result<()> {
            Ok(())
        }

        fn mark_all_read(&self) -> Result<()> {
            Ok(())
        }

        fn delete(&self, _id: &NotificationId) -> Result<()> {
            Ok(())
        }
    }

    fn setup() -> (Arc<InboxStore>, Arc<ScriptedApi>, SessionEpoch, Reconciler) {
        let store = Arc::new(InboxStore::new());
        let api = Arc::new(ScriptedApi::default());
        let epoch = SessionEpoch::new();
        let reconciler = Reconciler::new(
            UserId::new("u1"),
            Arc::clone(&store),
            api.clone(),
            epoch.clone(),
            ReconcilerConfig::default(),
        );
        (store, api, epoch, reconciler)
    }

    fn event(epoch: &SessionEpoch, event: ChannelEvent) -> TaggedEvent {
        TaggedEvent {
            epoch: epoch.token(),
            event,
        }
    }

    #[test]
    fn test_first_join_and_rejoin_fetch_snapshot() {
        let (store, api, epoch, mut reconciler) = setup();
        *api.snapshot.lock() = Some(vec![note(1), note(2)]);

        let joined = ChannelEvent::ConnectionStateChanged(ConnectionState::Joined);
        reconciler.handle_event(event(&epoch, joined.clone()));
        assert_eq!(*api.fetches.lock(), 1);
        assert_eq!(store.len(), 2);

        // Joined without an intervening drop does not refetch.
        reconciler.handle_event(event(&epoch, joined.clone()));
        assert_eq!(*api.fetches.lock(), 1);

        reconciler.handle_event(event(
            &epoch,
            ChannelEvent::ConnectionStateChanged(ConnectionState::Disconnected),
        ));
        *api.snapshot.lock() = Some(vec![note(2), note(3)]);
        reconciler.handle_event(event(&epoch, joined));
        assert_eq!(*api.fetches.lock(), 2);
        assert!(!store.contains(&NotificationId::from(1)));
        assert!(store.contains(&NotificationId::from(3)));
        assert_eq!(store.status().connection, ConnectionState::Joined);
    }

    #[test]
    fn test_failed_snapshot_keeps_last_good_state() {
        let (store, api, _epoch, mut reconciler) = setup();
        *api.snapshot.lock() = Some(vec![note(1)]);
        reconciler.resync().unwrap();

        *api.snapshot.lock() = None;
        assert!(reconciler.resync().is_err());
        assert_eq!(store.len(), 1);
        assert!(store.status().snapshot_error.is_some());

        *api.snapshot.lock() = Some(vec![note(1), note(2)]);
        reconciler.handle(ReconcilerInput::Refresh);
        assert_eq!(store.len(), 2);
        assert!(store.status().snapshot_error.is_none());
        assert!(store.status().last_synced_at.is_some());
    }

    #[test]
    fn test_snapshot_drops_other_recipients() {
        let (store, api, _epoch, mut reconciler) = setup();
        let mut foreign = note(2);
        foreign.recipient_id = UserId::new("u2");
        *api.snapshot.lock() = Some(vec![note(1), foreign]);

        assert_eq!(reconciler.resync().unwrap(), 1);
        assert!(store.contains(&NotificationId::from(1)));
        assert!(!store.contains(&NotificationId::from(2)));
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn test_stale_events_are_dropped() {
        let (store, _api, epoch, mut reconciler) = setup();
        let stale = event(&epoch, ChannelEvent::NewNotification(note(1)));
        epoch.advance();

        reconciler.handle_event(stale);
        assert!(store.is_empty());

        reconciler.handle_event(event(&epoch, ChannelEvent::NewNotification(note(2))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_gave_up_is_mirrored_into_status() {
        let (store, _api, epoch, mut reconciler) = setup();
        reconciler.handle_event(event(&epoch, ChannelEvent::GaveUp { attempts: 5 }));
        assert!(store.status().channel_gave_up);
    }

    #[test]
    fn test_run_stops_on_shutdown() {
        let (store, _api, epoch, reconciler) = setup();
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let handle = reconciler.spawn(events_rx, control_rx).unwrap();

        events_tx
            .send(event(&epoch, ChannelEvent::NewNotification(note(7))))
            .unwrap();
        control_tx.send(Control::Shutdown).unwrap();
        handle.join().unwrap();

        // select! may pick either ready channel first.
        assert!(store.len() <= 1);
    }
}
