//! One logged-in user's sync session.
//!
//! Wires the channel client, reconciler thread and command dispatcher
//! around a shared inbox store, and owns the session epoch that invalidates
//! everything in flight on logout.

use crate::api::NotificationApi;
use crate::channel::{ChannelClient, Transport};
use crate::config::SessionConfig;
use crate::dispatcher::CommandDispatcher;
use crate::epoch::SessionEpoch;
use crate::error::{Result, SyncError};
use crate::inbox::InboxStore;
use crate::reconciler::{Control, Reconciler};
use crate::types::{ConnectionState, UserId};
use crossbeam_channel::{unbounded, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub struct Session {
    user: UserId,
    epoch: SessionEpoch,
    store: Arc<InboxStore>,
    channel: ChannelClient,
    dispatcher: CommandDispatcher,
    control: Sender<Control>,
    ended: AtomicBool,
}

impl Session {
    /// Start syncing `user`'s inbox into a fresh store.
    pub fn start(
        user: UserId,
        transport: Arc<dyn Transport>,
        api: Arc<dyn NotificationApi>,
        config: SessionConfig,
    ) -> Result<Self> {
        let store = Arc::new(InboxStore::with_config(config.inbox.clone()));
        Self::start_with_store(store, user, transport, api, config)
    }

    /// Start syncing into a store owned by the host, e.g. one that UI
    /// subscribers are already attached to.
    pub fn start_with_store(
        store: Arc<InboxStore>,
        user: UserId,
        transport: Arc<dyn Transport>,
        api: Arc<dyn NotificationApi>,
        config: SessionConfig,
    ) -> Result<Self> {
        let epoch = SessionEpoch::new();
        let channel = ChannelClient::new(transport, config.channel, epoch.clone());
        let dispatcher = CommandDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&api),
            epoch.clone(),
            config.dispatcher,
        );

        let (control, control_rx) = unbounded();
        let reconciler = Reconciler::new(
            user.clone(),
            Arc::clone(&store),
            api,
            epoch.clone(),
            config.reconciler,
        );
        reconciler.spawn(channel.events(), control_rx)?;

        if let Err(e) = channel.connect(user.clone()) {
            let _ = control.send(Control::Shutdown);
            return Err(e);
        }

        info!(user = %user, "session started");
        Ok(Self {
            user,
            epoch,
            store,
            channel,
            dispatcher,
            control,
            ended: AtomicBool::new(false),
        })
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn store(&self) -> &Arc<InboxStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn epoch(&self) -> &SessionEpoch {
        &self.epoch
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn is_active(&self) -> bool {
        !self.ended.load(Ordering::SeqCst)
    }

    /// Ask the reconciler for a fresh snapshot.
    pub fn refresh(&self) -> Result<()> {
        if !self.is_active() {
            return Err(SyncError::StaleSession);
        }
        self.control
            .send(Control::Refresh)
            .map_err(|_| SyncError::ChannelClosed)
    }

    /// End the session. Everything still in flight is discarded and the
    /// inbox is cleared. Safe to call more than once.
    pub fn logout(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        self.epoch.advance();
        self.channel.disconnect();
        let _ = self.control.send(Control::Shutdown);
        self.store.clear();
        info!(user = %self.user, "session ended");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.logout();
    }
}
