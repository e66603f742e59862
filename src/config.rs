//! Session configuration.
//!
//! Every section has a `Default`; hosts usually deserialize a partial JSON
//! document and let the rest fall back. Durations are written in
//! milliseconds.

use crate::channel::ChannelConfig;
use crate::dispatcher::DispatcherConfig;
use crate::error::Result;
use crate::inbox::InboxConfig;
use crate::reconciler::ReconcilerConfig;
use serde::Deserialize;

/// Configuration for one [`Session`](crate::Session).
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub inbox: InboxConfig,
    pub channel: ChannelConfig,
    pub reconciler: ReconcilerConfig,
    pub dispatcher: DispatcherConfig,
}

impl SessionConfig {
    /// Parse a (possibly partial) JSON configuration document.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// `Duration` as integer milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// `Option<Duration>` as optional integer milliseconds.
pub(crate) mod option_duration_ms {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::JoinMode;
    use std::time::Duration;

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let config = SessionConfig::from_json(
            r#"{
                "channel": { "backoff": { "initial_ms": 500, "max_attempts": 3 } },
                "reconciler": { "poll_interval_ms": 60000 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.channel.backoff.initial, Duration::from_millis(500));
        assert_eq!(config.channel.backoff.max, Duration::from_secs(30));
        assert_eq!(config.channel.backoff.max_attempts, Some(3));
        assert_eq!(config.channel.join, JoinMode::OnOpen);
        assert_eq!(config.reconciler.poll_interval, Some(Duration::from_secs(60)));
        assert_eq!(
            config.dispatcher.request_timeout,
            DispatcherConfig::default().request_timeout
        );
    }

    #[test]
    fn test_await_ack_join_mode() {
        let config = SessionConfig::from_json(
            r#"{ "channel": { "join": { "mode": "await_ack", "timeout_ms": 2000 } } }"#,
        )
        .unwrap();
        assert_eq!(
            config.channel.join,
            JoinMode::AwaitAck {
                timeout: Duration::from_secs(2)
            }
        );
    }

    #[test]
    fn test_rejects_malformed_config() {
        assert!(SessionConfig::from_json("{ \"channel\": 3 }").is_err());
    }
}
