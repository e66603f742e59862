//! Optimistic user commands.
//!
//! A command is applied to the inbox immediately, then sent to the server.
//! Success confirms the local change; failure or timeout rolls it back and
//! hands the error to the caller.

use crate::api::{call_with_timeout, NotificationApi};
use crate::epoch::SessionEpoch;
use crate::error::{Result, SyncError};
use crate::inbox::{Command, InboxStore};
use crate::types::NotificationId;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use serde::Deserialize;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Dispatcher configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Upper bound for one command request; exceeding it rolls back.
    /// Default: 10s
    #[serde(rename = "request_timeout_ms", with = "crate::config::duration_ms")]
    pub request_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone)]
pub struct CommandDispatcher {
    store: Arc<InboxStore>,
    api: Arc<dyn NotificationApi>,
    epoch: SessionEpoch,
    config: DispatcherConfig,
}

impl CommandDispatcher {
    pub fn new(
        store: Arc<InboxStore>,
        api: Arc<dyn NotificationApi>,
        epoch: SessionEpoch,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            api,
            epoch,
            config,
        }
    }

    pub fn mark_as_read(&self, id: NotificationId) -> Result<()> {
        self.execute(Command::MarkRead(id))
    }

    pub fn mark_all_as_read(&self) -> Result<()> {
        self.execute(Command::MarkAllRead)
    }

    pub fn delete_notification(&self, id: NotificationId) -> Result<()> {
        self.execute(Command::Delete(id))
    }

    /// Run a command to completion on the calling thread.
    ///
    /// Commands on unknown ids, or ids already in the target state, still
    /// reach the server but change nothing locally. If the session ends
    /// while the request is in flight the outcome is discarded and
    /// [`SyncError::StaleSession`] is returned.
    pub fn execute(&self, command: Command) -> Result<()> {
        let scope = self.epoch.scope();
        let pending = self
            .store
            .apply_scoped(&scope, |s| s.begin(&command))
            .ok_or(SyncError::StaleSession)?;
        debug!(command = command.name(), pending = pending.0, "command applied locally");

        let remote = command.clone();
        let outcome = call_with_timeout(
            &self.api,
            Some(self.config.request_timeout),
            move |api| match &remote {
                Command::MarkRead(id) => api.mark_read(id),
                Command::MarkAllRead => api.mark_all_read(),
                Command::Delete(id) => api.delete(id),
            },
        );

        // Deleting something the server no longer has is still a delete.
        let outcome = match (outcome, &command) {
            (Err(SyncError::NotFound(_)), Command::Delete(_)) => Ok(()),
            (outcome, _) => outcome,
        };

        match outcome {
            Ok(()) => {
                self.store
                    .apply_scoped(&scope, |s| s.confirm(pending))
                    .ok_or(SyncError::StaleSession)?;
                info!(command = command.name(), "command confirmed");
                Ok(())
            }
            Err(e) => {
                let restored = self
                    .store
                    .apply_scoped(&scope, |s| s.rollback(pending))
                    .ok_or(SyncError::StaleSession)?;
                warn!(command = command.name(), error = %e, restored, "command rolled back");
                Err(e)
            }
        }
    }

    /// Run a command on a worker thread. The ticket can be dropped if the
    /// caller does not care about the outcome.
    pub fn submit(&self, command: Command) -> CommandTicket {
        let (tx, rx) = bounded(1);
        let dispatcher = self.clone();
        let spawned = thread::Builder::new()
            .name("inbox-sync-command".to_string())
            .spawn(move || {
                let _ = tx.send(dispatcher.execute(command));
            });

        if let Err(e) = spawned {
            let (tx, rx) = bounded(1);
            let _ = tx.send(Err(e.into()));
            return CommandTicket { rx };
        }
        CommandTicket { rx }
    }
}

/// Outcome of a submitted command.
pub struct CommandTicket {
    rx: Receiver<Result<()>>,
}

impl CommandTicket {
    /// Block until the command completes.
    pub fn wait(self) -> Result<()> {
        self.rx.recv().unwrap_or(Err(SyncError::ChannelClosed))
    }

    /// `None` while the command is still running.
    pub fn try_wait(&self) -> Option<Result<()>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(SyncError::ChannelClosed)),
        }
    }

    /// `None` if the command has not completed within `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<()>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(SyncError::ChannelClosed)),
        }
    }
}
