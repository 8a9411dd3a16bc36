//! Client error types.

use beacon_protocol::ProtocolError;
use thiserror::Error;

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The WebSocket connection could not be established.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The server closed the connection or the client was shut down.
    #[error("Connection closed")]
    Closed,

    /// The server answered an invocation with a fault.
    #[error("{0}")]
    Fault(String),

    /// Handshake did not complete as expected.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Wire encoding or decoding failed.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
