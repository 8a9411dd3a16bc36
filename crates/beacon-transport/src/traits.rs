//! Transport abstraction traits for Beacon.
//!
//! These traits are the seam between the messaging core and any wire
//! protocol. The core asks a transport for framed bidirectional
//! connections; everything below that (sockets, handshakes, framing bytes)
//! is the transport's own concern.

use async_trait::async_trait;
use beacon_protocol::Frame;
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

static CONNECTION_SEQ: AtomicU64 = AtomicU64::new(0);

impl ConnectionId {
    /// Create a connection ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh connection ID, unique within this process.
    #[must_use]
    pub fn generate() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros();
        let seq = CONNECTION_SEQ.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{timestamp:x}_{seq:x}"))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] beacon_protocol::ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// A transport that can accept connections.
///
/// Implementations own the wire protocol (WebSocket, long-polling, ...)
/// and present a uniform framed interface to the hub adapter.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Accept the next connection. Blocks until one is available or an
    /// error occurs.
    async fn accept(&self) -> Result<Box<dyn Connection>, TransportError>;

    /// Transport name, for logs and diagnostics.
    fn name(&self) -> &'static str;
}

/// An active connection over a transport.
#[async_trait]
pub trait Connection: Send + Sync {
    /// The connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Receive the next frame. Returns `None` when the connection closed
    /// cleanly.
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError>;

    /// Send a frame.
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Send pre-encoded frame bytes, avoiding re-encoding on fan-out.
    async fn send_raw(&mut self, data: Bytes) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Remote address, if the transport knows one.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    /// Whether the connection is still open.
    fn is_open(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_generation_is_unique() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("conn_"));
    }

    #[test]
    fn test_connection_id_from_string() {
        let id: ConnectionId = "client-7".into();
        assert_eq!(id.as_str(), "client-7");
        assert_eq!(id.to_string(), "client-7");
    }
}
