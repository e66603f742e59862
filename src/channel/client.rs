//! Push channel client.
//!
//! Owns one logical subscription to the user's private event channel. A
//! worker thread opens the transport, joins, pumps frames into the typed
//! event stream and reconnects with backoff after unexpected drops.
//!
//! Emission and teardown serialize on a single gate lock: once
//! [`ChannelClient::disconnect`] returns, the worker can no longer emit,
//! even if it is still blocked inside the transport.

use super::protocol::{self, ServerMessage};
use super::transport::{Connection, Frame, Transport};
use super::types::{ChannelConfig, ChannelEvent, JoinMode, TaggedEvent};
use crate::epoch::{EpochToken, SessionEpoch};
use crate::error::{Result, SyncError};
use crate::types::{ConnectionState, UserId};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Which `connect` call a worker belongs to, and the epoch it was started in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct RunTag {
    run: u64,
    epoch: EpochToken,
}

struct Shared {
    /// The run allowed to emit; `None` once disconnected.
    gate: Mutex<Option<RunTag>>,
    state: RwLock<ConnectionState>,
}

/// Client for the push channel.
pub struct ChannelClient {
    transport: Arc<dyn Transport>,
    config: ChannelConfig,
    epoch: SessionEpoch,
    shared: Arc<Shared>,
    events_tx: Sender<TaggedEvent>,
    events_rx: Receiver<TaggedEvent>,
    /// Dropping the sender wakes the worker out of a backoff sleep.
    shutdown: Mutex<Option<Sender<()>>>,
    next_run: AtomicU64,
}

impl ChannelClient {
    pub fn new(transport: Arc<dyn Transport>, config: ChannelConfig, epoch: SessionEpoch) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            transport,
            config,
            epoch,
            shared: Arc::new(Shared {
                gate: Mutex::new(None),
                state: RwLock::new(ConnectionState::Disconnected),
            }),
            events_tx,
            events_rx,
            shutdown: Mutex::new(None),
            next_run: AtomicU64::new(1),
        }
    }

    /// Receiver for the typed event stream.
    pub fn events(&self) -> Receiver<TaggedEvent> {
        self.events_rx.clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    /// Whether a worker is currently allowed to run.
    pub fn is_running(&self) -> bool {
        self.shared.gate.lock().is_some()
    }

    /// Start maintaining the channel for `user`. Replaces any previous run.
    ///
    /// Transport failures are not reported here; they are retried in the
    /// background according to the backoff policy.
    pub fn connect(&self, user: UserId) -> Result<()> {
        self.disconnect();

        let tag = RunTag {
            run: self.next_run.fetch_add(1, Ordering::SeqCst),
            epoch: self.epoch.token(),
        };
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        *self.shared.gate.lock() = Some(tag);
        *self.shutdown.lock() = Some(shutdown_tx);

        let worker = Worker {
            tag,
            user: user.clone(),
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
            epoch: self.epoch.clone(),
            shared: Arc::clone(&self.shared),
            events: self.events_tx.clone(),
            shutdown: shutdown_rx,
        };

        let spawned = thread::Builder::new()
            .name("inbox-sync-channel".to_string())
            .spawn(move || worker.run());
        if let Err(e) = spawned {
            self.disconnect();
            return Err(e.into());
        }

        info!(user = %user, run = tag.run, "channel connecting");
        Ok(())
    }

    /// Tear the channel down. No event is emitted after this returns.
    pub fn disconnect(&self) {
        let stopped = {
            let mut gate = self.shared.gate.lock();
            *self.shared.state.write() = ConnectionState::Disconnected;
            gate.take()
        };
        self.shutdown.lock().take();

        if let Some(tag) = stopped {
            info!(run = tag.run, "channel disconnected");
        }
    }
}

impl Drop for ChannelClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// How one connected session ended.
enum SessionEnd {
    /// Shutdown was requested.
    Stopped,
    /// The peer closed or the link dropped.
    Dropped,
}

struct Worker {
    tag: RunTag,
    user: UserId,
    transport: Arc<dyn Transport>,
    config: ChannelConfig,
    epoch: SessionEpoch,
    shared: Arc<Shared>,
    events: Sender<TaggedEvent>,
    shutdown: Receiver<()>,
}

impl Worker {
    fn run(self) {
        let mut failures: u32 = 0;

        loop {
            if !self.set_state(ConnectionState::Connecting) {
                break;
            }

            let mut joined = false;
            let outcome = self.session(&mut joined);
            if joined {
                failures = 0;
            }

            match outcome {
                Ok(SessionEnd::Stopped) => break,
                Ok(SessionEnd::Dropped) => info!(user = %self.user, "channel dropped"),
                Err(e) => warn!(user = %self.user, error = %e, "channel connection failed"),
            }

            if !self.set_state(ConnectionState::Disconnected) {
                break;
            }

            failures = failures.saturating_add(1);
            if self.config.backoff.exhausted(failures) {
                warn!(user = %self.user, attempts = failures, "channel retry ceiling reached");
                self.give_up(failures);
                break;
            }

            let delay = self.config.backoff.delay(failures - 1);
            debug!(user = %self.user, attempt = failures, ?delay, "scheduling reconnect");
            if self.sleep(delay) {
                break;
            }
        }

        debug!(run = self.tag.run, "channel worker exiting");
    }

    /// One connection from open to drop.
    fn session(&self, joined: &mut bool) -> Result<SessionEnd> {
        let mut conn = self.transport.open()?;
        let result = self.drive(conn.as_mut(), joined);
        conn.close();
        result
    }

    fn drive(&self, conn: &mut dyn Connection, joined: &mut bool) -> Result<SessionEnd> {
        if self.stopped() {
            return Ok(SessionEnd::Stopped);
        }
        conn.send(&protocol::encode_join(&self.user))?;

        if let JoinMode::AwaitAck { timeout } = &self.config.join {
            let deadline = Instant::now() + *timeout;
            loop {
                let now = Instant::now();
                if now >= deadline {
                    return Err(SyncError::Protocol("join was not acknowledged".into()));
                }
                if self.stopped() {
                    return Ok(SessionEnd::Stopped);
                }
                match conn.recv((deadline - now).min(self.config.poll_interval))? {
                    None => {}
                    Some(Frame::Closed) => return Ok(SessionEnd::Dropped),
                    Some(Frame::Text(text)) => {
                        if self.handle_frame(conn, &text) {
                            break;
                        }
                    }
                }
            }
        }

        if !self.set_state(ConnectionState::Joined) {
            return Ok(SessionEnd::Stopped);
        }
        *joined = true;
        info!(user = %self.user, "channel joined");

        loop {
            if self.stopped() {
                return Ok(SessionEnd::Stopped);
            }
            match conn.recv(self.config.poll_interval)? {
                None => {}
                Some(Frame::Closed) => return Ok(SessionEnd::Dropped),
                Some(Frame::Text(text)) => {
                    self.handle_frame(conn, &text);
                }
            }
        }
    }

    /// Decode and forward one frame. Returns true for a join acknowledgement.
    fn handle_frame(&self, conn: &mut dyn Connection, text: &str) -> bool {
        let message = match protocol::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping malformed channel frame");
                return false;
            }
        };

        let event = match message {
            ServerMessage::Joined => return true,
            ServerMessage::Ping => {
                if let Err(e) = conn.send(&protocol::encode_pong()) {
                    debug!(error = %e, "failed to answer ping");
                }
                return false;
            }
            ServerMessage::NewNotification(notification) => {
                if notification.recipient_id != self.user {
                    warn!(
                        id = %notification.id,
                        recipient = %notification.recipient_id,
                        "dropping notification addressed to another user"
                    );
                    return false;
                }
                ChannelEvent::NewNotification(notification)
            }
            ServerMessage::NotificationRead(id) => ChannelEvent::NotificationRead(id),
            ServerMessage::AllNotificationsRead => ChannelEvent::AllNotificationsRead,
            ServerMessage::NotificationDeleted(id) => ChannelEvent::NotificationDeleted(id),
        };

        self.emit(event);
        false
    }

    fn is_current(&self, gate: &Option<RunTag>) -> bool {
        *gate == Some(self.tag) && self.epoch.is_current(self.tag.epoch)
    }

    fn stopped(&self) -> bool {
        !self.is_current(&self.shared.gate.lock())
    }

    /// Emit under the gate. Returns false if this run has been stopped.
    fn emit(&self, event: ChannelEvent) -> bool {
        let gate = self.shared.gate.lock();
        if !self.is_current(&gate) {
            return false;
        }
        self.events
            .send(TaggedEvent {
                epoch: self.tag.epoch,
                event,
            })
            .is_ok()
    }

    /// Emit `GaveUp` and release the gate so the client reports not running.
    fn give_up(&self, attempts: u32) {
        let mut gate = self.shared.gate.lock();
        if !self.is_current(&gate) {
            return;
        }
        let _ = self.events.send(TaggedEvent {
            epoch: self.tag.epoch,
            event: ChannelEvent::GaveUp { attempts },
        });
        *gate = None;
    }

    fn set_state(&self, state: ConnectionState) -> bool {
        let gate = self.shared.gate.lock();
        if !self.is_current(&gate) {
            return false;
        }
        *self.shared.state.write() = state;
        self.events
            .send(TaggedEvent {
                epoch: self.tag.epoch,
                event: ChannelEvent::ConnectionStateChanged(state),
            })
            .is_ok()
    }

    /// Sleep for `delay`. Returns true if shutdown was requested meanwhile.
    fn sleep(&self, delay: Duration) -> bool {
        !matches!(
            self.shutdown.recv_timeout(delay),
            Err(RecvTimeoutError::Timeout)
        )
    }
}
