//! Core types for the notification inbox.

use crate::error::{Result, SyncError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Ids arrive as JSON strings from some servers and integers from others.
fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Signed(i64),
        Unsigned(u64),
    }

    Ok(match Raw::deserialize(d)? {
        Raw::Text(s) => s,
        Raw::Signed(n) => n.to_string(),
        Raw::Unsigned(n) => n.to_string(),
    })
}

/// Server-assigned notification identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NotificationId(pub String);

impl NotificationId {
    pub fn new(id: impl Into<String>) -> Self {
        NotificationId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for NotificationId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        string_or_number(d).map(NotificationId)
    }
}

impl From<&str> for NotificationId {
    fn from(s: &str) -> Self {
        NotificationId(s.to_string())
    }
}

impl From<u64> for NotificationId {
    fn from(n: u64) -> Self {
        NotificationId(n.to_string())
    }
}

impl fmt::Debug for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NotificationId({})", self.0)
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the authenticated user owning an inbox.
#[derive(Clone, PartialEq, Eq, Hash, Serialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        string_or_number(d).map(UserId)
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// UTC instant with millisecond wire precision.
///
/// Accepted on the wire as an RFC 3339 string or as integer epoch
/// milliseconds; always written back as RFC 3339.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        Timestamp(Utc::now())
    }

    /// Build from epoch milliseconds. `None` if out of range.
    pub fn from_millis(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).map(Timestamp)
    }

    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Millis(i64),
        }

        match Raw::deserialize(d)? {
            Raw::Text(s) => DateTime::parse_from_rfc3339(&s)
                .map(|t| Timestamp(t.with_timezone(&Utc)))
                .map_err(|e| D::Error::custom(format!("invalid timestamp {s:?}: {e}"))),
            Raw::Millis(n) => Timestamp::from_millis(n)
                .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {n}"))),
        }
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

/// Notification category. Closed set; anything else is rejected at the boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Order,
    Delivery,
    Inventory,
    Warning,
    Info,
    Other,
}

/// A single inbox entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Server-assigned id, unique per inbox.
    pub id: NotificationId,

    pub title: String,

    pub message: String,

    #[serde(alias = "type")]
    pub category: Category,

    /// Optional deep-link target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    pub created_at: Timestamp,

    #[serde(default)]
    pub is_read: bool,

    pub recipient_id: UserId,
}

impl Notification {
    /// Reject records that parsed but are not usable.
    pub fn validate(&self) -> Result<()> {
        if self.id.0.trim().is_empty() {
            return Err(SyncError::InvalidNotification("empty id".into()));
        }
        if self.title.trim().is_empty() {
            return Err(SyncError::InvalidNotification(format!(
                "notification {} has an empty title",
                self.id
            )));
        }
        if self.recipient_id.0.trim().is_empty() {
            return Err(SyncError::InvalidNotification(format!(
                "notification {} has no recipient",
                self.id
            )));
        }
        if matches!(&self.link, Some(link) if link.trim().is_empty()) {
            return Err(SyncError::InvalidNotification(format!(
                "notification {} has an empty link",
                self.id
            )));
        }
        Ok(())
    }

    /// Parse and validate a single loosely-typed payload.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let notification: Notification = serde_json::from_value(value)
            .map_err(|e| SyncError::InvalidNotification(e.to_string()))?;
        notification.validate()?;
        Ok(notification)
    }
}

/// State of the push channel session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    /// Transport open and the user channel subscribed.
    Joined,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Joined => "joined",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_accepts_string_and_number() {
        let a: NotificationId = serde_json::from_value(json!("abc")).unwrap();
        let b: NotificationId = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(a, NotificationId::from("abc"));
        assert_eq!(b, NotificationId::from(42));
    }

    #[test]
    fn test_timestamp_accepts_rfc3339_and_millis() {
        let a: Timestamp = serde_json::from_value(json!("2024-03-01T10:00:00.000Z")).unwrap();
        let b: Timestamp = serde_json::from_value(json!(1709287200000i64)).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_value(a).unwrap(),
            json!("2024-03-01T10:00:00.000Z")
        );
    }

    #[test]
    fn test_notification_parses_type_alias() {
        let n = Notification::from_value(json!({
            "id": 7,
            "title": "Low stock",
            "message": "SKU-1 below threshold",
            "type": "inventory",
            "createdAt": "2024-03-01T10:00:00Z",
            "isRead": false,
            "recipientId": "u1"
        }))
        .unwrap();
        assert_eq!(n.category, Category::Inventory);
        assert_eq!(n.link, None);
        assert!(!n.is_read);
    }

    #[test]
    fn test_notification_rejects_unknown_category() {
        let result = Notification::from_value(json!({
            "id": "1",
            "title": "t",
            "message": "m",
            "category": "marketing",
            "createdAt": "2024-03-01T10:00:00Z",
            "recipientId": "u1"
        }));
        assert!(matches!(result, Err(SyncError::InvalidNotification(_))));
    }

    #[test]
    fn test_notification_rejects_empty_title() {
        let result = Notification::from_value(json!({
            "id": "1",
            "title": "  ",
            "message": "m",
            "category": "info",
            "createdAt": "2024-03-01T10:00:00Z",
            "recipientId": "u1"
        }));
        assert!(matches!(result, Err(SyncError::InvalidNotification(_))));
    }
}
