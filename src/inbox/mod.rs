//! The inbox: notification records, the derived unread counter, and the
//! optimistic command ledger.
//!
//! [`InboxState`] holds the data and implements every mutation as an
//! idempotent, order-independent transition. [`InboxStore`] wraps it for
//! sharing between the reconciler, the command dispatcher and read-only
//! subscribers.

mod ledger;
mod state;
mod store;

pub use ledger::{Command, CommandId, PendingChange, PendingEntry, PendingLedger};
pub use state::{InboxState, InboxView, SyncStatus, DEFAULT_MEMORY_CAPACITY};
pub use store::{InboxConfig, InboxStore};
