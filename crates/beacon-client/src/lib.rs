//! # beacon-client
//!
//! Rust client for the Beacon realtime messaging server.
//!
//! One [`Client`] owns one WebSocket connection, established lazily on
//! first use; [`TopicHandle`]s share it and expose RPC-style
//! [`invoke`](TopicHandle::invoke), fire-and-forget
//! [`send`](TopicHandle::send), and push subscriptions via
//! [`on`](TopicHandle::on). Concurrent invocations are correlated by id,
//! so a slow call never blocks the others.

pub mod client;
pub mod dispatch;
pub mod error;

pub use client::{Client, TopicHandle};
pub use error::ClientError;
