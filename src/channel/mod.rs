//! Push channel client.
//!
//! Maintains the user's subscription to the server event channel and turns
//! raw frames into a typed [`ChannelEvent`] stream. The connection itself
//! is behind the [`Transport`] trait; the `websocket` feature provides a
//! tungstenite-backed implementation.

mod backoff;
mod client;
pub mod protocol;
mod transport;
mod types;
#[cfg(feature = "websocket")]
mod websocket;

pub use backoff::BackoffPolicy;
pub use client::ChannelClient;
pub use transport::{Connection, Frame, Transport};
pub use types::{ChannelConfig, ChannelEvent, JoinMode, TaggedEvent};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;
