//! # beacon-transport
//!
//! Transport abstraction layer for the Beacon realtime messaging core.
//!
//! The hub adapter only ever sees the [`Transport`] and [`Connection`]
//! traits; the wire protocol underneath is pluggable. The crate ships a
//! WebSocket transport behind the `websocket` feature (on by default).
//!
//! ```rust,ignore
//! use beacon_transport::{Connection, Transport};
//!
//! async fn serve(transport: &dyn Transport) {
//!     while let Ok(mut conn) = transport.accept().await {
//!         while let Ok(Some(frame)) = conn.recv().await {
//!             // hand the frame to the hub adapter
//!         }
//!     }
//! }
//! ```

pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{Connection, ConnectionId, Transport, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketTransport};
