//! In-memory server doubles shared by the integration tests.

#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use inbox_sync::{
    BackoffPolicy, Category, ChannelConfig, Connection, Frame, JoinMode, Notification,
    NotificationApi, NotificationId, Result, SessionConfig, SyncError, Timestamp, Transport,
    UserId,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn note(id: u64, recipient: &str, is_read: bool) -> Notification {
    Notification {
        id: NotificationId::from(id),
        title: format!("Order #{id} updated"),
        message: "Status changed to shipped".to_string(),
        category: Category::Order,
        link: Some(format!("/orders/{id}")),
        created_at: Timestamp::from_millis(1_700_000_000_000 + id as i64 * 1000).unwrap(),
        is_read,
        recipient_id: UserId::new(recipient),
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Settings that keep reconnect tests fast.
pub fn fast_config() -> SessionConfig {
    let mut config = SessionConfig::default();
    config.channel = fast_channel();
    config.reconciler.request_timeout = Duration::from_secs(2);
    config.dispatcher.request_timeout = Duration::from_secs(2);
    config
}

pub fn fast_channel() -> ChannelConfig {
    ChannelConfig {
        join: JoinMode::OnOpen,
        backoff: BackoffPolicy {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(40),
            multiplier: 2,
            max_attempts: None,
        },
        poll_interval: Duration::from_millis(10),
    }
}

// --- Frames ---

pub fn new_notification_frame(record: &Notification) -> String {
    json!({ "event": "new_notification", "data": record }).to_string()
}

pub fn read_frame(id: u64) -> String {
    json!({ "event": "notification_read", "data": { "id": id } }).to_string()
}

pub fn read_all_frame() -> String {
    json!({ "event": "all_notifications_read", "data": {} }).to_string()
}

pub fn deleted_frame(id: u64) -> String {
    json!({ "event": "notification_deleted", "data": { "id": id } }).to_string()
}

pub fn joined_frame() -> String {
    json!({ "event": "joined", "data": {} }).to_string()
}

pub fn ping_frame() -> String {
    json!({ "event": "ping", "data": {} }).to_string()
}

// --- Push channel double ---

#[derive(Default)]
struct ServerState {
    refuse: bool,
    ack_join: bool,
    opens: usize,
    /// Sender half of the live connection; dropping it closes the client side.
    live: Option<Sender<Frame>>,
    received: Vec<String>,
}

/// Scripted push server. Each `open` creates a fresh connection; the test
/// pushes frames into whichever one is live.
#[derive(Clone, Default)]
pub struct MockServer {
    state: Arc<Mutex<ServerState>>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every join with a `joined` frame.
    pub fn acking() -> Self {
        let server = Self::default();
        server.state.lock().ack_join = true;
        server
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::new(self.clone())
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.state.lock().refuse = refuse;
    }

    pub fn opens(&self) -> usize {
        self.state.lock().opens
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().live.is_some()
    }

    /// Frames the client has sent, across all connections.
    pub fn received(&self) -> Vec<String> {
        self.state.lock().received.clone()
    }

    /// Push one text frame. Returns false if nothing is connected.
    pub fn push(&self, text: impl Into<String>) -> bool {
        match &self.state.lock().live {
            Some(tx) => tx.send(Frame::Text(text.into())).is_ok(),
            None => false,
        }
    }

    /// Drop the live connection as a network failure would.
    pub fn drop_connection(&self) {
        self.state.lock().live.take();
    }
}

impl Transport for MockServer {
    fn open(&self) -> Result<Box<dyn Connection>> {
        let mut state = self.state.lock();
        state.opens += 1;
        if state.refuse {
            return Err(SyncError::Transport("connection refused".into()));
        }
        let (tx, rx) = unbounded();
        state.live = Some(tx);
        Ok(Box::new(MockConnection {
            server: Arc::clone(&self.state),
            rx,
            queued: VecDeque::new(),
        }))
    }
}

struct MockConnection {
    server: Arc<Mutex<ServerState>>,
    rx: Receiver<Frame>,
    /// Replies generated by the server in response to our own sends.
    queued: VecDeque<Frame>,
}

impl Connection for MockConnection {
    fn send(&mut self, text: &str) -> Result<()> {
        let mut server = self.server.lock();
        server.received.push(text.to_string());
        if server.ack_join && text.contains("\"join\"") {
            self.queued.push_back(Frame::Text(joined_frame()));
        }
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        if let Some(frame) = self.queued.pop_front() {
            return Ok(Some(frame));
        }
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Ok(Some(Frame::Closed)),
        }
    }

    fn close(&mut self) {}
}

// --- REST double ---

/// In-memory model of the notification endpoints.
#[derive(Default)]
pub struct MockApi {
    records: Mutex<Vec<Notification>>,
    fail_fetch: AtomicBool,
    fail_commands: AtomicBool,
    delay: Mutex<Duration>,
    fetches: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl MockApi {
    pub fn new(records: Vec<Notification>) -> Arc<Self> {
        let api = Self::default();
        *api.records.lock() = records;
        Arc::new(api)
    }

    pub fn set_records(&self, records: Vec<Notification>) {
        *self.records.lock() = records;
    }

    pub fn records(&self) -> Vec<Notification> {
        self.records.lock().clone()
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    /// Delay every call by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn command(&self, call: String, apply: impl FnOnce(&mut Vec<Notification>)) -> Result<()> {
        let delay = *self.delay.lock();
        thread::sleep(delay);
        self.calls.lock().push(call);
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(SyncError::api(500, "internal server error"));
        }
        apply(&mut self.records.lock());
        Ok(())
    }
}

impl NotificationApi for MockApi {
    fn fetch_notifications(&self) -> Result<Vec<Notification>> {
        let delay = *self.delay.lock();
        thread::sleep(delay);
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(SyncError::api(503, "service unavailable"));
        }
        Ok(self.records.lock().clone())
    }

    fn mark_read(&self, id: &NotificationId) -> Result<()> {
        self.command(format!("mark_read {id}"), |records| {
            for record in records.iter_mut().filter(|r| &r.id == id) {
                record.is_read = true;
            }
        })
    }

    fn mark_all_read(&self) -> Result<()> {
        self.command("mark_all_read".to_string(), |records| {
            for record in records.iter_mut() {
                record.is_read = true;
            }
        })
    }

    fn delete(&self, id: &NotificationId) -> Result<()> {
        self.command(format!("delete {id}"), |records| {
            records.retain(|r| &r.id != id);
        })
    }
}
