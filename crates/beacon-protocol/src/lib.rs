//! # beacon-protocol
//!
//! Wire protocol definitions for the Beacon realtime messaging core.
//!
//! This crate defines the frames exchanged between clients and the hub
//! adapter, together with a length-prefixed MessagePack codec.
//!
//! ## Frame Types
//!
//! - `Invoke` / `Reply` / `Fault` - Topic method invocation and its outcome
//! - `Send` - A named message pushed to a connection
//! - `Connect` / `Connected` - Connection handshake
//! - `Ping` / `Pong` - Keepalive
//!
//! ## Example
//!
//! ```rust
//! use beacon_protocol::{Frame, codec};
//! use serde_json::json;
//!
//! let frame = Frame::invoke(1, "chat", "Ping", vec![json!("hi"), json!(42)]);
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{Frame, FrameType};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;
