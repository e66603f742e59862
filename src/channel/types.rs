//! Channel configuration and event types.

use super::backoff::BackoffPolicy;
use crate::epoch::EpochToken;
use crate::types::{ConnectionState, Notification, NotificationId};
use serde::Deserialize;
use std::time::Duration;

/// When the channel counts as `Joined`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum JoinMode {
    /// Joined as soon as the join request is written. For servers without
    /// an acknowledgement protocol.
    #[default]
    OnOpen,

    /// Joined when the server answers with a `joined` frame. No answer
    /// within `timeout` counts as a failed attempt.
    AwaitAck {
        #[serde(rename = "timeout_ms", with = "crate::config::duration_ms")]
        timeout: Duration,
    },
}

/// Configuration for the channel client.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub join: JoinMode,

    pub backoff: BackoffPolicy,

    /// How long a single receive waits before re-checking for shutdown.
    /// Default: 250ms
    #[serde(rename = "poll_interval_ms", with = "crate::config::duration_ms")]
    pub poll_interval: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            join: JoinMode::default(),
            backoff: BackoffPolicy::default(),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Events emitted by the channel client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    NewNotification(Notification),
    NotificationRead(NotificationId),
    AllNotificationsRead,
    NotificationDeleted(NotificationId),
    ConnectionStateChanged(ConnectionState),
    /// The retry ceiling was reached; the client stopped reconnecting.
    GaveUp { attempts: u32 },
}

/// A channel event stamped with the session generation that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaggedEvent {
    pub epoch: EpochToken,
    pub event: ChannelEvent,
}
