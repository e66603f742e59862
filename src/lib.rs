//! # Inbox Sync
//!
//! Keeps a client's notification inbox consistent with the server while
//! events arrive from two racing sources: a persistent push channel and
//! REST snapshots.
//!
//! ## Core Concepts
//!
//! - **Inbox Store**: single source of truth; every mutation is atomic,
//!   idempotent and order independent, and the unread counter is derived
//! - **Channel Client**: push connection lifecycle with backoff reconnects
//! - **Reconciler**: routes channel events into the store and recovers
//!   missed events with a snapshot after each reconnect
//! - **Command Dispatcher**: optimistic read/delete commands with rollback
//! - **Session**: wires the above for one user; logout invalidates
//!   everything still in flight
//!
//! ## Example
//!
//! ```ignore
//! use inbox_sync::{Session, SessionConfig, UserId, WebSocketTransport, HttpNotificationApi};
//!
//! let session = Session::start(
//!     UserId::new("42"),
//!     Arc::new(WebSocketTransport::new("wss://example.test/ws")),
//!     Arc::new(HttpNotificationApi::new("https://example.test/api", tokens)?),
//!     SessionConfig::default(),
//! )?;
//!
//! let badge = session.store().subscribe(SubscriptionConfig::default());
//! session.dispatcher().mark_as_read(NotificationId::from(7))?;
//! session.logout();
//! ```

pub mod api;
pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod epoch;
pub mod error;
pub mod inbox;
pub mod reconciler;
pub mod session;
pub mod subscriptions;
pub mod types;

// Re-exports
#[cfg(feature = "http")]
pub use api::{HttpNotificationApi, StaticToken, TokenSource};
pub use api::NotificationApi;
#[cfg(feature = "websocket")]
pub use channel::WebSocketTransport;
pub use channel::{
    BackoffPolicy, ChannelClient, ChannelConfig, ChannelEvent, Connection, Frame, JoinMode,
    TaggedEvent, Transport,
};
pub use config::SessionConfig;
pub use dispatcher::{CommandDispatcher, CommandTicket, DispatcherConfig};
pub use epoch::{EpochScope, EpochToken, SessionEpoch};
pub use error::{Result, SyncError};
pub use inbox::{Command, CommandId, InboxConfig, InboxState, InboxStore, InboxView, SyncStatus};
pub use reconciler::{Control, Reconciler, ReconcilerConfig, ReconcilerInput};
pub use session::Session;
pub use subscriptions::{
    DropReason, InboxEvent, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId,
};
pub use types::*;
