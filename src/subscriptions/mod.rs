//! Change notifications for read-only inbox consumers.
//!
//! Presentation code never mutates the inbox; it subscribes and re-reads
//! the view when something changes:
//! - Inbox contents or unread counter changed
//! - Sync status changed (connection state, soft errors)
//!
//! Subscriptions use bounded buffers; a subscriber that stops draining its
//! buffer is dropped rather than stalling the store.
//!
//! # Example
//!
//! ```ignore
//! let handle = store.subscribe(SubscriptionConfig::default());
//!
//! loop {
//!     match handle.recv() {
//!         Ok(InboxEvent::Changed { unread_count, .. }) => render_badge(unread_count),
//!         Ok(InboxEvent::StatusChanged { status }) => render_status(&status),
//!         Ok(InboxEvent::Dropped { .. }) | Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, InboxEvent, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId,
};
