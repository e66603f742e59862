//! Transport seam for the push channel.
//!
//! The channel client only needs a duplex stream of text frames; the
//! concrete transport (WebSocket, an in-process test double, ...) plugs in
//! behind these traits.

use crate::error::Result;
use std::time::Duration;

/// One inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// The peer closed the connection.
    Closed,
}

/// An open duplex connection.
pub trait Connection: Send {
    /// Send one text frame.
    fn send(&mut self, text: &str) -> Result<()>;

    /// Wait up to `timeout` for the next frame. `Ok(None)` on timeout.
    /// An `Err` is treated as an unexpected drop.
    fn recv(&mut self, timeout: Duration) -> Result<Option<Frame>>;

    /// Close the connection (best effort).
    fn close(&mut self);
}

/// Opens connections to the notification server.
pub trait Transport: Send + Sync {
    fn open(&self) -> Result<Box<dyn Connection>>;
}
