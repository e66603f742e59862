//! Push channel wire format.
//!
//! Frames are JSON text of the form `{"event": <name>, "data": <payload>}`.
//! Everything is parsed into closed types here; nothing loosely typed gets
//! past this module.

use crate::error::{Result, SyncError};
use crate::types::{Notification, NotificationId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Server -> client event names.
pub const EVENT_NEW_NOTIFICATION: &str = "new_notification";
pub const EVENT_NOTIFICATION_READ: &str = "notification_read";
pub const EVENT_ALL_NOTIFICATIONS_READ: &str = "all_notifications_read";
pub const EVENT_NOTIFICATION_DELETED: &str = "notification_deleted";
pub const EVENT_JOINED: &str = "joined";
pub const EVENT_PING: &str = "ping";

/// Client -> server event names.
pub const EVENT_JOIN: &str = "join";
pub const EVENT_PONG: &str = "pong";

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct IdPayload {
    id: NotificationId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinPayload<'a> {
    user_id: &'a UserId,
}

/// A decoded server frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerMessage {
    NewNotification(Notification),
    NotificationRead(NotificationId),
    AllNotificationsRead,
    NotificationDeleted(NotificationId),
    /// Acknowledgement of our join request.
    Joined,
    Ping,
}

/// Decode one text frame.
pub fn decode(text: &str) -> Result<ServerMessage> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| SyncError::Protocol(format!("bad envelope: {e}")))?;

    match envelope.event.as_str() {
        EVENT_NEW_NOTIFICATION => {
            Notification::from_value(envelope.data).map(ServerMessage::NewNotification)
        }
        EVENT_NOTIFICATION_READ => decode_id(envelope.data).map(ServerMessage::NotificationRead),
        EVENT_ALL_NOTIFICATIONS_READ => Ok(ServerMessage::AllNotificationsRead),
        EVENT_NOTIFICATION_DELETED => {
            decode_id(envelope.data).map(ServerMessage::NotificationDeleted)
        }
        EVENT_JOINED => Ok(ServerMessage::Joined),
        EVENT_PING => Ok(ServerMessage::Ping),
        other => Err(SyncError::Protocol(format!("unknown event: {other}"))),
    }
}

fn decode_id(data: Value) -> Result<NotificationId> {
    let payload: IdPayload = serde_json::from_value(data)
        .map_err(|e| SyncError::Protocol(format!("bad id payload: {e}")))?;
    if payload.id.as_str().trim().is_empty() {
        return Err(SyncError::Protocol("empty notification id".into()));
    }
    Ok(payload.id)
}

/// Join request sent right after the transport opens.
pub fn encode_join(user: &UserId) -> String {
    let data = JoinPayload { user_id: user };
    json!({ "event": EVENT_JOIN, "data": data }).to_string()
}

/// Keepalive reply.
pub fn encode_pong() -> String {
    json!({ "event": EVENT_PONG, "data": {} }).to_string()
}
