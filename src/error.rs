//! Error types for the sync engine.

use crate::types::NotificationId;
use std::time::Duration;
use thiserror::Error;

/// Main error type for sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid notification: {0}")]
    InvalidNotification(String),

    #[error("API error (status {status:?}): {message}")]
    Api {
        status: Option<u16>,
        message: String,
    },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Session ended before the operation completed")]
    StaleSession,

    #[error("Notification not found: {0}")]
    NotFound(NotificationId),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SyncError {
    /// Build an API error from a status code and message.
    pub fn api(status: impl Into<Option<u16>>, message: impl Into<String>) -> Self {
        SyncError::Api {
            status: status.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
