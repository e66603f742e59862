//! WebSocket transport built on `tungstenite`.

use super::transport::{Connection, Frame, Transport};
use crate::error::{Result, SyncError};
use std::io::ErrorKind;
use std::net::TcpStream;
use std::time::Duration;
use tracing::debug;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

/// Opens a fresh WebSocket to `url` for every connection attempt.
#[derive(Clone, Debug)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for WebSocketTransport {
    fn open(&self) -> Result<Box<dyn Connection>> {
        let (socket, response) = tungstenite::connect(self.url.as_str())
            .map_err(|e| SyncError::Transport(format!("connect to {}: {e}", self.url)))?;
        debug!(url = %self.url, status = %response.status(), "websocket opened");
        Ok(Box::new(WebSocketConnection {
            socket,
            read_timeout: None,
        }))
    }
}

struct WebSocketConnection {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
    read_timeout: Option<Duration>,
}

impl WebSocketConnection {
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        // A zero timeout means "block forever" to the OS.
        let timeout = timeout.max(Duration::from_millis(1));
        if self.read_timeout == Some(timeout) {
            return Ok(());
        }
        match self.socket.get_ref() {
            MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(timeout))?,
            MaybeTlsStream::Rustls(stream) => stream.get_ref().set_read_timeout(Some(timeout))?,
            _ => {}
        }
        self.read_timeout = Some(timeout);
        Ok(())
    }
}

impl Connection for WebSocketConnection {
    fn send(&mut self, text: &str) -> Result<()> {
        self.socket
            .send(Message::Text(text.to_string()))
            .map_err(|e| SyncError::Transport(e.to_string()))
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        self.set_read_timeout(timeout)?;
        match self.socket.read() {
            Ok(Message::Text(text)) => Ok(Some(Frame::Text(text))),
            Ok(Message::Binary(bytes)) => String::from_utf8(bytes)
                .map(|text| Some(Frame::Text(text)))
                .map_err(|e| SyncError::Protocol(format!("binary frame is not UTF-8: {e}"))),
            Ok(Message::Close(_)) => Ok(Some(Frame::Closed)),
            Ok(_) => Ok(None),
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                Ok(Some(Frame::Closed))
            }
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                Ok(None)
            }
            Err(e) => Err(SyncError::Transport(e.to_string())),
        }
    }

    fn close(&mut self) {
        if let Err(e) = self.socket.close(None) {
            debug!(error = %e, "websocket close failed");
        }
        let _ = self.socket.flush();
    }
}
