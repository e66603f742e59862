//! REST seam.
//!
//! The engine never talks HTTP directly; it goes through [`NotificationApi`]
//! so hosts can plug in their own client and tests can script responses.
//! The `http` feature provides a reqwest-backed implementation.

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::{HttpNotificationApi, StaticToken, TokenSource};

use crate::error::{Result, SyncError};
use crate::types::{Notification, NotificationId};
use crossbeam_channel::{bounded, RecvTimeoutError};
use serde_json::Value;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// The notification endpoints the engine depends on.
///
/// Calls block; the engine bounds them with its own timeout.
pub trait NotificationApi: Send + Sync {
    /// Full current notification list for the authenticated user.
    fn fetch_notifications(&self) -> Result<Vec<Notification>>;

    fn mark_read(&self, id: &NotificationId) -> Result<()>;

    fn mark_all_read(&self) -> Result<()>;

    fn delete(&self, id: &NotificationId) -> Result<()>;
}

/// Run `f` against `api`, giving up after `timeout`.
///
/// With a timeout the call runs on a short-lived thread. A call that
/// outlives its deadline keeps running in the background, but its result
/// is discarded and the caller sees [`SyncError::Timeout`].
pub fn call_with_timeout<T, F>(
    api: &Arc<dyn NotificationApi>,
    timeout: Option<Duration>,
    f: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn NotificationApi) -> Result<T> + Send + 'static,
{
    let Some(timeout) = timeout else {
        return f(api.as_ref());
    };

    let (tx, rx) = bounded(1);
    let api = Arc::clone(api);
    thread::Builder::new()
        .name("inbox-sync-request".to_string())
        .spawn(move || {
            // The receiver is gone if the caller already timed out.
            let _ = tx.send(f(api.as_ref()));
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(SyncError::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(SyncError::ChannelClosed),
    }
}

/// Parse a snapshot body item by item, skipping entries that fail
/// validation instead of rejecting the whole list.
pub fn parse_snapshot(items: Vec<Value>) -> Vec<Notification> {
    let total = items.len();
    let records: Vec<Notification> = items
        .into_iter()
        .filter_map(|item| match Notification::from_value(item) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "skipping invalid snapshot entry");
                None
            }
        })
        .collect();

    if records.len() != total {
        warn!(kept = records.len(), total, "snapshot contained invalid entries");
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;

    struct SlowApi(Duration);

    impl NotificationApi for SlowApi {
        fn fetch_notifications(&self) -> Result<Vec<Notification>> {
            thread::sleep(self.0);
            Ok(Vec::new())
        }

        fn mark_read(&self, _id: &NotificationId) -> Result<()> {
            Ok(())
        }

        fn mark_all_read(&self) -> Result<()> {
            Err(SyncError::api(500, "boom"))
        }

        fn delete(&self, id: &NotificationId) -> Result<()> {
            Err(SyncError::NotFound(id.clone()))
        }
    }

    #[test]
    fn test_call_times_out() {
        let api: Arc<dyn NotificationApi> = Arc::new(SlowApi(Duration::from_millis(500)));
        let started = Instant::now();
        let result = call_with_timeout(&api, Some(Duration::from_millis(20)), |api| {
            api.fetch_notifications()
        });
        assert!(matches!(result, Err(SyncError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_call_passes_results_through() {
        let api: Arc<dyn NotificationApi> = Arc::new(SlowApi(Duration::ZERO));
        assert!(call_with_timeout(&api, Some(Duration::from_secs(1)), |api| {
            api.fetch_notifications()
        })
        .unwrap()
        .is_empty());
        assert!(matches!(
            call_with_timeout(&api, None, |api| api.mark_all_read()),
            Err(SyncError::Api {
                status: Some(500),
                ..
            })
        ));
    }

    #[test]
    fn test_parse_snapshot_skips_invalid_entries() {
        let records = parse_snapshot(vec![
            json!({"id": 1, "title": "Order placed", "message": "Order #12 placed",
                   "category": "order", "createdAt": 1_700_000_000_000i64,
                   "isRead": false, "recipientId": "u1"}),
            json!({"id": 2, "title": "", "message": "no title", "category": "info",
                   "createdAt": 1_700_000_000_000i64, "recipientId": "u1"}),
            json!({"id": 3, "title": "Mystery", "message": "unknown category",
                   "category": "gossip", "createdAt": 1_700_000_000_000i64,
                   "recipientId": "u1"}),
            json!("not an object"),
        ]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, NotificationId::from(1));
    }
}
